//! Per-CPU perf buffer readers
//!
//! One task per online CPU reads raw samples, decodes them and hands the
//! records to the shared [`RecordSender`].

use crate::channel::RecordSender;
use crate::records::{decode, RecordKind};
use anyhow::{anyhow, Context, Result};
use aya::maps::perf::{AsyncPerfEventArray, AsyncPerfEventArrayBuffer};
use aya::maps::MapData;
use aya::util::online_cpus;
use bytes::BytesMut;
use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Samples read per wakeup
const READ_BATCH: usize = 16;

/// Spawn one reader per online CPU. Readers stop when `token` is cancelled
/// or the receiving side of `sender` is gone.
pub fn spawn_readers(
    mut events: AsyncPerfEventArray<MapData>,
    kind: RecordKind,
    sender: RecordSender,
    token: CancellationToken,
    pages: Option<usize>,
) -> Result<Vec<JoinHandle<()>>> {
    let cpus = online_cpus()
        .map_err(|(path, e)| anyhow!("Failed to list online CPUs from {}: {}", path, e))?;

    let mut handles = Vec::with_capacity(cpus.len());
    for cpu in cpus {
        let buffer = events
            .open(cpu, pages)
            .with_context(|| format!("Failed to open perf buffer for CPU {}", cpu))?;
        handles.push(tokio::spawn(read_cpu(
            cpu,
            buffer,
            kind,
            sender.clone(),
            token.clone(),
        )));
    }

    info!(
        "Reading {} events from {} CPU(s)",
        kind.as_str(),
        handles.len()
    );
    Ok(handles)
}

async fn read_cpu(
    cpu: u32,
    mut buffer: AsyncPerfEventArrayBuffer<MapData>,
    kind: RecordKind,
    sender: RecordSender,
    token: CancellationToken,
) {
    // room for the alignment padding perf adds to raw samples
    let mut samples: Vec<BytesMut> = (0..READ_BATCH)
        .map(|_| BytesMut::with_capacity(kind.event_size() + 8))
        .collect();

    loop {
        let events = tokio::select! {
            _ = token.cancelled() => break,
            result = buffer.read_events(&mut samples) => match result {
                Ok(events) => events,
                Err(e) => {
                    warn!("Perf buffer read failed on CPU {}: {}", cpu, e);
                    break;
                }
            },
        };

        if events.lost > 0 {
            debug!("CPU {} lost {} {} sample(s)", cpu, events.lost, kind.as_str());
            sender.stats().add_lost(events.lost);
        }

        for sample in samples.iter().take(events.read) {
            match decode(kind, sample) {
                Some(record) => {
                    if !sender.send(record) && sender.is_closed() {
                        debug!("Record channel closed, stopping reader on CPU {}", cpu);
                        return;
                    }
                }
                None => {
                    sender.stats().add_malformed();
                    warn!(
                        "Malformed event: expected {} bytes, got {} bytes - skipping",
                        kind.event_size(),
                        sample.len()
                    );
                }
            }
        }
    }

    debug!("Reader on CPU {} stopped", cpu);
}

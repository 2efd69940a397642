//! Bounded, lossy hand-off between perf readers and the consumer
//!
//! Readers never wait on a slow consumer: when the queue is full the record
//! is dropped and counted.

use crate::records::Record;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Counters shared by every reader of one gadget
#[derive(Debug, Default)]
pub struct ChannelStats {
    received: AtomicU64,
    lost: AtomicU64,
    dropped: AtomicU64,
    malformed: AtomicU64,
}

impl ChannelStats {
    /// Records handed to the consumer
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Samples the kernel overwrote before they were read
    pub fn lost(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }

    /// Records dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Samples that failed to decode
    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    pub fn add_lost(&self, count: usize) {
        self.lost.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn add_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Producer half, cloned into every perf reader
#[derive(Clone)]
pub struct RecordSender {
    tx: mpsc::Sender<Record>,
    stats: Arc<ChannelStats>,
}

impl RecordSender {
    /// Queue a record without waiting. Returns `false` if it was dropped.
    pub fn send(&self, record: Record) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => {
                self.stats.received.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn stats(&self) -> &Arc<ChannelStats> {
        &self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a record channel holding at most `capacity` records
pub fn record_channel(capacity: usize) -> (RecordSender, mpsc::Receiver<Record>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let sender = RecordSender {
        tx,
        stats: Arc::new(ChannelStats::default()),
    };
    (sender, rx)
}

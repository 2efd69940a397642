use crate::cli::{Commands, TraceType};
use crate::config::{load_config, to_yaml};
use crate::{KgadgetError, Result};
use kgadget_agent::config::AgentConfig;
use kgadget_agent::mntns::MntnsResolver;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

pub async fn handle_command(command: Commands, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;

    match command {
        Commands::Trace { trace_type } => handle_trace(trace_type, config).await,
        Commands::Config => {
            print!("{}", to_yaml(&config)?);
            Ok(())
        }
    }
}

/// Mount namespaces to filter on: the explicit ids plus the namespaces of
/// the given pids, deduplicated and sorted.
pub fn resolve_filter(mntns: &[u64], pids: &[u32], resolver: &MntnsResolver) -> Result<Vec<u64>> {
    let mut ids = BTreeSet::new();

    for &id in mntns {
        if id == 0 {
            return Err(KgadgetError::InvalidArgument(
                "mount namespace 0 cannot be filtered on".to_string(),
            ));
        }
        ids.insert(id);
    }

    for &pid in pids {
        let id = resolver.resolve(pid)?;
        info!("pid {} is in mount namespace {}", pid, id);
        ids.insert(id);
    }

    Ok(ids.into_iter().collect())
}

#[cfg(not(target_os = "linux"))]
async fn handle_trace(_trace_type: TraceType, _config: AgentConfig) -> Result<()> {
    Err(KgadgetError::UnsupportedFeature(
        "tracing requires Linux to run eBPF programs".to_string(),
    ))
}

#[cfg(target_os = "linux")]
async fn handle_trace(trace_type: TraceType, mut config: AgentConfig) -> Result<()> {
    use kgadget_agent::containers::ContainerRegistry;
    use kgadget_agent::gadget::{AuditSeccompGadget, DnsGadget};

    match trace_type {
        TraceType::AuditSeccomp {
            mntns,
            pid,
            task_nsproxy_offset,
            output,
        } => {
            info!("Seccomp audit tracing requested");
            if let Some(offset) = task_nsproxy_offset {
                config.task_offsets.task_nsproxy = offset;
            }
            let filter = resolve_filter(&mntns, &pid, &MntnsResolver::new())?;
            if !filter.is_empty() {
                info!("Filtering on mount namespaces {:?}", filter);
            }

            let gadget = AuditSeccompGadget::new(config.clone(), ContainerRegistry::new())
                .with_filter(filter);
            runner::run_gadget(Box::new(gadget), &config, output).await
        }
        TraceType::Dns { output } => {
            info!("DNS tracing requested");
            let gadget = DnsGadget::new(config.clone());
            runner::run_gadget(Box::new(gadget), &config, output).await
        }
    }
}

#[cfg(target_os = "linux")]
mod runner {
    use crate::cli::OutputArgs;
    use crate::metrics::{MetricsCollector, PrometheusExporter};
    use crate::output::RecordWriter;
    use crate::{KgadgetError, Result};
    use kgadget_agent::channel::record_channel;
    use kgadget_agent::config::AgentConfig;
    use kgadget_agent::gadget::Gadget;
    use std::io;
    use tokio::signal;
    use tokio_util::sync::CancellationToken;
    use tracing::info;

    /// Run `gadget` and print its records until Ctrl+C or until it stops
    pub async fn run_gadget(
        gadget: Box<dyn Gadget>,
        config: &AgentConfig,
        output: OutputArgs,
    ) -> Result<()> {
        let kind = gadget.kind();
        let (sender, mut rx) = record_channel(config.channel_capacity);
        let stats = sender.stats().clone();
        let token = CancellationToken::new();
        let metrics = MetricsCollector::new()?;

        let mut task = tokio::spawn(gadget.run(sender, token.clone()));

        let mut writer = RecordWriter::new(io::stdout(), output.output);
        writer.write_header(kind)?;

        let mut failure: Option<KgadgetError> = None;
        let mut finished = None;

        loop {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
                joined = &mut task => {
                    finished = Some(joined);
                    break;
                }
                Some(record) = rx.recv() => {
                    metrics.observe(&record);
                    if let Err(e) = writer.write(&record) {
                        failure = Some(e);
                        break;
                    }
                }
            }
        }

        token.cancel();
        let joined = match finished {
            Some(joined) => joined,
            None => task.await,
        };

        // Records queued before the readers stopped
        while let Ok(record) = rx.try_recv() {
            if failure.is_some() {
                break;
            }
            metrics.observe(&record);
            if let Err(e) = writer.write(&record) {
                failure = Some(e);
            }
        }

        info!(
            "{}: {} record(s) received, {} lost, {} dropped, {} malformed",
            kind.as_str(),
            stats.received(),
            stats.lost(),
            stats.dropped(),
            stats.malformed()
        );

        if output.metrics {
            metrics.record_channel(kind, &stats);
            eprint!("{}", PrometheusExporter::new(&metrics).format_metrics()?);
        }

        if let Some(e) = failure {
            return Err(e);
        }

        match joined {
            Ok(result) => result.map_err(KgadgetError::from),
            Err(e) => Err(KgadgetError::AgentError(anyhow::anyhow!(
                "gadget task failed: {}",
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::MetadataExt;

    #[test]
    fn test_resolve_filter_merges_and_sorts() {
        let root = tempfile::tempdir().unwrap();
        let ns_dir = root.path().join("31").join("ns");
        fs::create_dir_all(&ns_dir).unwrap();
        fs::write(ns_dir.join("mnt"), b"").unwrap();
        let inode = fs::metadata(ns_dir.join("mnt")).unwrap().ino();

        let resolver = MntnsResolver::with_root(root.path().to_path_buf());
        let ids = resolve_filter(&[9, 3, 9], &[31], &resolver).unwrap();

        let mut expected = vec![3, 9, inode];
        expected.sort();
        expected.dedup();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_resolve_filter_rejects_zero_and_unknown_pid() {
        let root = tempfile::tempdir().unwrap();
        let resolver = MntnsResolver::with_root(root.path().to_path_buf());

        assert!(matches!(
            resolve_filter(&[0], &[], &resolver),
            Err(KgadgetError::InvalidArgument(_))
        ));
        assert!(matches!(
            resolve_filter(&[], &[5], &resolver),
            Err(KgadgetError::AgentError(_))
        ));
        assert!(resolve_filter(&[], &[], &resolver).unwrap().is_empty());
    }
}

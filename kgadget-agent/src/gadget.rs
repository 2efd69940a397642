//! Gadgets: a probe plus everything needed to feed its events to a consumer
//!
//! A gadget loads its probe, prepares the maps, attaches, and streams
//! records into a [`RecordSender`] until its token is cancelled.

use crate::channel::RecordSender;
use crate::config::AgentConfig;
use crate::containers::ContainerRegistry;
use crate::filter::NamespaceFilter;
use crate::mntns::MntnsResolver;
use crate::perf_reader::spawn_readers;
use crate::probe_loader::{Probe, ProbeManager};
use crate::records::RecordKind;
use anyhow::Result;
use async_trait::async_trait;
use aya_log::EbpfLogger;
use log::{info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Gadget: Send {
    fn kind(&self) -> RecordKind;

    /// Run until `token` is cancelled, then detach and clean up
    async fn run(self: Box<Self>, sender: RecordSender, token: CancellationToken) -> Result<()>;
}

/// Seccomp audit events enriched with container identity
pub struct AuditSeccompGadget {
    config: AgentConfig,
    registry: ContainerRegistry,
    filter: Vec<u64>,
}

impl AuditSeccompGadget {
    pub fn new(config: AgentConfig, registry: ContainerRegistry) -> Self {
        Self {
            config,
            registry,
            filter: Vec::new(),
        }
    }

    /// Only report tasks in these mount namespaces
    pub fn with_filter(mut self, mntns_ids: Vec<u64>) -> Self {
        self.filter = mntns_ids;
        self
    }
}

#[async_trait]
impl Gadget for AuditSeccompGadget {
    fn kind(&self) -> RecordKind {
        RecordKind::AuditSeccomp
    }

    async fn run(self: Box<Self>, sender: RecordSender, token: CancellationToken) -> Result<()> {
        let filtered = !self.filter.is_empty();
        let mut manager = ProbeManager::new(Probe::AuditSeccomp { filtered }, &self.config)?;

        if let Err(e) = EbpfLogger::init(manager.bpf_mut()) {
            warn!(
                "Failed to initialize EbpfLogger: {}. eBPF probe logs will not be visible.",
                e
            );
        }

        let mut containers = manager.containers_map()?;
        let traced = self
            .registry
            .while_registered(
                &mut containers,
                &self.config.containers,
                &MntnsResolver::new(),
                trace_audit(&mut manager, &self.filter, &self.config, sender, token),
            )
            .await;

        drop(containers);
        manager.unload();
        traced
    }
}

/// Fill the filter, attach, and stream until `token` is cancelled
async fn trace_audit(
    manager: &mut ProbeManager,
    mntns_ids: &[u64],
    config: &AgentConfig,
    sender: RecordSender,
    token: CancellationToken,
) -> Result<()> {
    let _filter = if mntns_ids.is_empty() {
        None
    } else {
        let mut filter = NamespaceFilter::new(manager.filter_map()?);
        filter.admit_all(mntns_ids)?;
        Some(filter)
    };

    manager.attach()?;
    let readers = spawn_readers(
        manager.events()?,
        RecordKind::AuditSeccomp,
        sender,
        token.clone(),
        config.perf_pages,
    )?;

    info!("Tracing seccomp audit events");
    token.cancelled().await;
    join_readers(readers).await;
    Ok(())
}

/// DNS queries seen on any interface of the host
pub struct DnsGadget {
    config: AgentConfig,
}

impl DnsGadget {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Gadget for DnsGadget {
    fn kind(&self) -> RecordKind {
        RecordKind::Dns
    }

    async fn run(self: Box<Self>, sender: RecordSender, token: CancellationToken) -> Result<()> {
        let mut manager = ProbeManager::new(Probe::Dns, &self.config)?;

        manager.attach()?;
        let readers = spawn_readers(
            manager.events()?,
            RecordKind::Dns,
            sender,
            token.clone(),
            self.config.perf_pages,
        )?;

        info!("Tracing DNS queries");
        token.cancelled().await;
        join_readers(readers).await;

        manager.unload();
        Ok(())
    }
}

async fn join_readers(readers: Vec<JoinHandle<()>>) {
    for reader in readers {
        if let Err(e) = reader.await {
            warn!("Perf reader task failed: {}", e);
        }
    }
}

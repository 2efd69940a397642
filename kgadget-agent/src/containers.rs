//! Container registry for enriching audit events in the kernel
//!
//! The audit probe looks up the mount namespace of the audited task in the
//! pinned `containers` map. The registry writes that map through a
//! [`ContainerStore`] and keeps a concurrent mirror so user space can list
//! and remove what it registered.

use crate::config::ContainerConfig;
use crate::mntns::MntnsResolver;
use anyhow::Result;
use dashmap::DashMap;
use kgadget_common::{until_nul, Container};
use log::{debug, info, warn};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

/// Identity of a container as shown to users
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerInfo {
    pub id: String,
    pub namespace: String,
    pub pod: String,
    pub name: String,
}

impl ContainerInfo {
    /// Kernel snapshot of this container, each field truncated to fit
    pub fn to_snapshot(&self) -> Container {
        Container::from_parts(&self.id, &self.namespace, &self.pod, &self.name)
    }

    /// Decode a kernel snapshot, `None` for the all-zero miss value
    pub fn from_snapshot(snapshot: &Container) -> Option<Self> {
        if snapshot.is_zeroed() {
            return None;
        }
        Some(Self {
            id: lossy(&snapshot.container_id),
            namespace: lossy(&snapshot.namespace),
            pod: lossy(&snapshot.pod),
            name: lossy(&snapshot.container),
        })
    }
}

impl From<&ContainerConfig> for ContainerInfo {
    fn from(entry: &ContainerConfig) -> Self {
        Self {
            id: entry.id.clone(),
            namespace: entry.namespace.clone(),
            pod: entry.pod.clone(),
            name: entry.name.clone(),
        }
    }
}

fn lossy(field: &[u8]) -> String {
    String::from_utf8_lossy(until_nul(field)).into_owned()
}

/// Backing storage read by the probe
pub trait ContainerStore {
    fn put(&mut self, mntns_id: u64, snapshot: &Container) -> Result<()>;
    fn delete(&mut self, mntns_id: u64) -> Result<()>;
}

#[cfg(target_os = "linux")]
impl ContainerStore for aya::maps::HashMap<aya::maps::MapData, u64, Container> {
    fn put(&mut self, mntns_id: u64, snapshot: &Container) -> Result<()> {
        self.insert(mntns_id, snapshot, 0).map_err(|e| {
            anyhow::anyhow!("Failed to insert container for mntns {}: {}", mntns_id, e)
        })
    }

    fn delete(&mut self, mntns_id: u64) -> Result<()> {
        self.remove(&mntns_id).map_err(|e| {
            anyhow::anyhow!("Failed to remove container for mntns {}: {}", mntns_id, e)
        })
    }
}

/// Thread-safe view of the containers registered in the kernel map
#[derive(Clone, Default)]
pub struct ContainerRegistry {
    inner: Arc<DashMap<u64, ContainerInfo>>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a container under its mount namespace.
    ///
    /// Returns `false` without touching the store for namespace 0 and for
    /// pause containers, which have no name.
    pub fn add<S: ContainerStore>(
        &self,
        store: &mut S,
        mntns_id: u64,
        info: ContainerInfo,
    ) -> Result<bool> {
        if mntns_id == 0 {
            debug!("Ignoring container {} without mount namespace", info.id);
            return Ok(false);
        }
        if info.name.is_empty() {
            debug!("Ignoring pause container {}", info.id);
            return Ok(false);
        }

        store.put(mntns_id, &info.to_snapshot())?;
        self.inner.insert(mntns_id, info);
        Ok(true)
    }

    pub fn remove<S: ContainerStore>(
        &self,
        store: &mut S,
        mntns_id: u64,
    ) -> Result<Option<ContainerInfo>> {
        if !self.inner.contains_key(&mntns_id) {
            return Ok(None);
        }
        store.delete(mntns_id)?;
        Ok(self.inner.remove(&mntns_id).map(|(_, v)| v))
    }

    /// Register every container of `entries`, skipping the ones that can't
    /// be located. Returns the number registered.
    pub fn register_all<S: ContainerStore>(
        &self,
        store: &mut S,
        entries: &[ContainerConfig],
        resolver: &MntnsResolver,
    ) -> Result<usize> {
        let mut registered = 0;

        for entry in entries {
            let mntns_id = match (entry.mntns, entry.pid) {
                (Some(mntns_id), _) => mntns_id,
                (None, Some(pid)) => match resolver.resolve(pid) {
                    Ok(mntns_id) => mntns_id,
                    Err(e) => {
                        warn!("Skipping container {}: {:#}", entry.id, e);
                        continue;
                    }
                },
                (None, None) => {
                    warn!("Skipping container {}: neither mntns nor pid given", entry.id);
                    continue;
                }
            };

            if self.add(store, mntns_id, ContainerInfo::from(entry))? {
                registered += 1;
            }
        }

        info!("Registered {} container(s)", registered);
        Ok(registered)
    }

    /// Remove every registered container from the store
    pub fn clear<S: ContainerStore>(&self, store: &mut S) -> Result<()> {
        let ids: Vec<u64> = self.inner.iter().map(|r| *r.key()).collect();
        for mntns_id in ids {
            self.remove(store, mntns_id)?;
        }
        Ok(())
    }

    /// Register `entries`, then run `body`.
    ///
    /// Every registered container is removed from `store` again once `body`
    /// finishes, and also when registration or `body` fails, so no entry
    /// outlives the run that wrote it.
    pub async fn while_registered<S, F, T>(
        &self,
        store: &mut S,
        entries: &[ContainerConfig],
        resolver: &MntnsResolver,
        body: F,
    ) -> Result<T>
    where
        S: ContainerStore,
        F: Future<Output = Result<T>>,
    {
        let result = match self.register_all(store, entries, resolver) {
            Ok(_) => body.await,
            Err(e) => Err(e),
        };

        if let Err(e) = self.clear(store) {
            warn!("Failed to clear containers map: {:#}", e);
        }
        result
    }

    pub fn get(&self, mntns_id: u64) -> Option<ContainerInfo> {
        self.inner.get(&mntns_id).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Get all entries (for listing)
    pub fn entries(&self) -> Vec<(u64, ContainerInfo)> {
        self.inner
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect()
    }
}

//! Mount namespace allow-list of the filtered audit probe
//!
//! Only present when the probe object with the filter compiled in is
//! loaded. A namespace is admitted by being a key of the `filter` map; the
//! value is ignored.

use anyhow::{bail, Result};
use log::info;
use std::collections::BTreeSet;

/// Map backing the allow-list
pub trait FilterStore {
    fn admit(&mut self, mntns_id: u64) -> Result<()>;
    fn revoke(&mut self, mntns_id: u64) -> Result<()>;
}

#[cfg(target_os = "linux")]
impl FilterStore for aya::maps::HashMap<aya::maps::MapData, u64, u32> {
    fn admit(&mut self, mntns_id: u64) -> Result<()> {
        self.insert(mntns_id, 1u32, 0).map_err(|e| {
            anyhow::anyhow!("Failed to add mntns {} to filter: {}", mntns_id, e)
        })
    }

    fn revoke(&mut self, mntns_id: u64) -> Result<()> {
        self.remove(&mntns_id).map_err(|e| {
            anyhow::anyhow!("Failed to remove mntns {} from filter: {}", mntns_id, e)
        })
    }
}

pub struct NamespaceFilter<S> {
    store: S,
    admitted: BTreeSet<u64>,
}

impl<S: FilterStore> NamespaceFilter<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            admitted: BTreeSet::new(),
        }
    }

    /// Admit events from `mntns_id`. Namespace 0 never reaches the filter
    /// and is rejected.
    pub fn admit(&mut self, mntns_id: u64) -> Result<()> {
        if mntns_id == 0 {
            bail!("Mount namespace 0 cannot be filtered on");
        }
        if !self.admitted.contains(&mntns_id) {
            self.store.admit(mntns_id)?;
            self.admitted.insert(mntns_id);
        }
        Ok(())
    }

    pub fn revoke(&mut self, mntns_id: u64) -> Result<()> {
        if self.admitted.contains(&mntns_id) {
            self.store.revoke(mntns_id)?;
            self.admitted.remove(&mntns_id);
        }
        Ok(())
    }

    pub fn admit_all(&mut self, ids: &[u64]) -> Result<()> {
        for &mntns_id in ids {
            self.admit(mntns_id)?;
        }
        info!("Filtering on {} mount namespace(s)", self.admitted.len());
        Ok(())
    }

    pub fn admitted(&self) -> impl Iterator<Item = u64> + '_ {
        self.admitted.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.admitted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Default)]
    struct MemoryFilter {
        keys: HashSet<u64>,
        writes: usize,
        reject: Option<u64>,
    }

    impl FilterStore for &mut MemoryFilter {
        fn admit(&mut self, mntns_id: u64) -> Result<()> {
            if self.reject == Some(mntns_id) {
                bail!("map full");
            }
            self.keys.insert(mntns_id);
            self.writes += 1;
            Ok(())
        }

        fn revoke(&mut self, mntns_id: u64) -> Result<()> {
            self.keys.remove(&mntns_id);
            self.writes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_admit_and_revoke() {
        let mut store = MemoryFilter::default();
        let mut filter = NamespaceFilter::new(&mut store);

        filter.admit_all(&[7, 8, 7]).unwrap();
        assert_eq!(filter.admitted().collect::<Vec<_>>(), vec![7, 8]);

        filter.revoke(7).unwrap();
        filter.revoke(9).unwrap();
        assert_eq!(filter.admitted().collect::<Vec<_>>(), vec![8]);
        drop(filter);

        assert_eq!(store.keys, [8].into_iter().collect());
        assert_eq!(store.writes, 3);
    }

    #[test]
    fn test_zero_namespace_rejected() {
        let mut store = MemoryFilter::default();
        let mut filter = NamespaceFilter::new(&mut store);

        assert!(filter.admit(0).is_err());
        assert!(filter.is_empty());
    }

    #[test]
    fn test_failed_admit_is_not_recorded() {
        let mut store = MemoryFilter {
            reject: Some(8),
            ..Default::default()
        };
        let mut filter = NamespaceFilter::new(&mut store);

        assert!(filter.admit_all(&[7, 8]).is_err());
        assert_eq!(filter.admitted().collect::<Vec<_>>(), vec![7]);
        drop(filter);

        assert_eq!(store.keys, [7].into_iter().collect());
    }
}

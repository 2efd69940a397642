//! Mount namespace resolution
//!
//! The id the audit probe reports is the inode number of the task's mount
//! namespace, the same number `/proc/<pid>/ns/mnt` carries.

use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

const PROC_ROOT: &str = "/proc";

/// Resolves pids to mount namespace ids through procfs
pub struct MntnsResolver {
    proc_root: PathBuf,
}

impl MntnsResolver {
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from(PROC_ROOT),
        }
    }

    /// Create a resolver reading from a custom procfs root (for testing)
    #[allow(dead_code)]
    pub fn with_root(proc_root: PathBuf) -> Self {
        Self { proc_root }
    }

    /// Mount namespace id of `pid`
    pub fn resolve(&self, pid: u32) -> Result<u64> {
        let path = self.proc_root.join(pid.to_string()).join("ns").join("mnt");
        let inode = inode_of(&path)
            .with_context(|| format!("Failed to resolve mount namespace of pid {}", pid))?;
        debug!("pid {} is in mount namespace {}", pid, inode);
        Ok(inode)
    }
}

impl Default for MntnsResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn inode_of(path: &Path) -> Result<u64> {
    let metadata =
        fs::metadata(path).with_context(|| format!("Failed to stat {}", path.display()))?;
    Ok(metadata.ino())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_reads_inode_of_ns_file() {
        let root = tempfile::tempdir().unwrap();
        let ns_dir = root.path().join("1234").join("ns");
        fs::create_dir_all(&ns_dir).unwrap();
        fs::write(ns_dir.join("mnt"), b"").unwrap();

        let expected = fs::metadata(ns_dir.join("mnt")).unwrap().ino();
        let resolver = MntnsResolver::with_root(root.path().to_path_buf());

        assert_eq!(resolver.resolve(1234).unwrap(), expected);
    }

    #[test]
    fn test_resolve_missing_pid_fails() {
        let root = tempfile::tempdir().unwrap();
        let resolver = MntnsResolver::with_root(root.path().to_path_buf());

        let err = resolver.resolve(99).unwrap_err();
        assert!(err.to_string().contains("pid 99"));
    }
}

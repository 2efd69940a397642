//! Agent configuration
//!
//! Deserialized from YAML by the CLI. Every field has a default, so an empty
//! document is a valid configuration.

use kgadget_common::TaskOffsets;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default bpffs directory holding the pinned containers map
pub const DEFAULT_PIN_PATH: &str = "/sys/fs/bpf/kgadget";

/// Default capacity of the record channel between perf readers and output
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub pin_path: PathBuf,
    pub task_offsets: TaskOffsetsConfig,
    pub channel_capacity: usize,
    /// Pages per CPU for each perf buffer, aya's default when unset
    pub perf_pages: Option<usize>,
    pub containers: Vec<ContainerConfig>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            pin_path: PathBuf::from(DEFAULT_PIN_PATH),
            task_offsets: TaskOffsetsConfig::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            perf_pages: None,
            containers: Vec::new(),
        }
    }
}

/// `task_struct` layout of the running kernel
///
/// `task_nsproxy` has no portable default: leave it at 0 and the audit
/// probe resolves no namespace at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskOffsetsConfig {
    pub task_nsproxy: u32,
    pub nsproxy_mnt_ns: u32,
    pub mnt_ns_inum: u32,
}

impl Default for TaskOffsetsConfig {
    fn default() -> Self {
        Self {
            task_nsproxy: 0,
            nsproxy_mnt_ns: 24,
            mnt_ns_inum: 16,
        }
    }
}

impl From<TaskOffsetsConfig> for TaskOffsets {
    fn from(config: TaskOffsetsConfig) -> Self {
        Self {
            task_nsproxy: config.task_nsproxy,
            nsproxy_mnt_ns: config.nsproxy_mnt_ns,
            mnt_ns_inum: config.mnt_ns_inum,
            _padding: 0,
        }
    }
}

/// A container to register in the containers map
///
/// Either `mntns` or `pid` locates the container; `mntns` wins when both
/// are present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerConfig {
    pub id: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub pod: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mntns: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

//! Node-side runtime of kgadget
//!
//! Responsibilities:
//! - Load the seccomp audit and DNS probes into the kernel
//! - Register containers in the pinned containers map
//! - Maintain the mount namespace filter
//! - Read per-CPU perf buffers and decode events into records
//!
//! Everything touching the kernel is Linux-only; configuration, records and
//! the record channel build everywhere.

pub mod channel;
pub mod config;
pub mod containers;
pub mod filter;
pub mod mntns;
pub mod records;

#[cfg(target_os = "linux")]
pub mod gadget;
#[cfg(target_os = "linux")]
pub mod perf_reader;
#[cfg(target_os = "linux")]
pub mod probe_loader;
#[cfg(target_os = "linux")]
pub mod raw_socket;

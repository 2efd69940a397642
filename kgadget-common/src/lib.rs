//! Shared types and probe logic between eBPF (kernel) and userspace
//!
//! Records defined here cross the kernel/userspace boundary through perf
//! event arrays and BPF maps, so they must be:
//! - `#[repr(C)]` for stable memory layout
//! - `no_std` compatible for eBPF
//! - identical on both sides of the event channel
//!
//! The capture logic of both probes ([`audit`], [`dns`]) is written against
//! small traits so the eBPF objects and the unit tests drive the same code.

#![cfg_attr(not(feature = "userspace"), no_std)]

pub mod audit;
pub mod dns;

/// Length of `task_struct.comm`, including the trailing NUL
pub const TASK_COMM_LEN: usize = 16;

/// Capacity of each string field of [`Container`], including the trailing NUL
pub const NAME_MAX_LENGTH: usize = 256;

/// Maximum number of name bytes captured from a DNS question
pub const MAX_DNS_NAME: usize = 255;

/// Best-effort output of finished records
///
/// Emission never reports failure: a full channel drops the record.
pub trait EventSink<T> {
    fn emit(&mut self, event: &T);
}

/// Map and program names shared by the probes and the loader
pub mod names {
    pub const CONTAINERS_MAP: &str = "containers";
    pub const FILTER_MAP: &str = "filter";
    pub const EVENTS_MAP: &str = "EVENTS";
    pub const TASK_OFFSETS_GLOBAL: &str = "TASK_OFFSETS";

    pub const AUDIT_PROGRAM: &str = "audit_seccomp";
    pub const AUDIT_KERNEL_FUNCTION: &str = "audit_seccomp";
    pub const DNS_PROGRAM: &str = "dns";
}

/// Maximum number of entries in the containers and filter maps
pub const MAX_CONTAINERS: u32 = 1024;

/// Container identity snapshot keyed by mount namespace id
///
/// Each field is a NUL-padded byte string. A missing container is
/// represented by the all-zero value, never by an absent field.
#[repr(C)]
#[derive(Clone, Copy)]
#[cfg_attr(feature = "userspace", derive(Debug, PartialEq, Eq))]
pub struct Container {
    pub container_id: [u8; NAME_MAX_LENGTH],
    pub namespace: [u8; NAME_MAX_LENGTH],
    pub pod: [u8; NAME_MAX_LENGTH],
    pub container: [u8; NAME_MAX_LENGTH],
}

impl Container {
    pub const fn zeroed() -> Self {
        Self {
            container_id: [0; NAME_MAX_LENGTH],
            namespace: [0; NAME_MAX_LENGTH],
            pod: [0; NAME_MAX_LENGTH],
            container: [0; NAME_MAX_LENGTH],
        }
    }

    /// Build a snapshot from its parts, truncating each to
    /// `NAME_MAX_LENGTH - 1` bytes so a NUL always terminates the field.
    pub fn from_parts(container_id: &str, namespace: &str, pod: &str, container: &str) -> Self {
        let mut value = Self::zeroed();
        copy_truncated(&mut value.container_id, container_id.as_bytes());
        copy_truncated(&mut value.namespace, namespace.as_bytes());
        copy_truncated(&mut value.pod, pod.as_bytes());
        copy_truncated(&mut value.container, container.as_bytes());
        value
    }

    pub fn is_zeroed(&self) -> bool {
        self.container_id[0] == 0
            && self.namespace[0] == 0
            && self.pod[0] == 0
            && self.container[0] == 0
    }
}

fn copy_truncated(dst: &mut [u8; NAME_MAX_LENGTH], src: &[u8]) {
    let len = src.len().min(NAME_MAX_LENGTH - 1);
    dst[..len].copy_from_slice(&src[..len]);
}

/// Bytes of `buf` up to (not including) the first NUL
pub fn until_nul(buf: &[u8]) -> &[u8] {
    match buf.iter().position(|&b| b == 0) {
        Some(end) => &buf[..end],
        None => buf,
    }
}

/// Seccomp audit event
///
/// Layout (1064 bytes, 8-byte aligned):
/// - pid: thread group id of the audited task
/// - code: seccomp disposition (`SECCOMP_RET_*`)
/// - mntns_id: mount namespace inode number, never 0
/// - syscall: syscall number as passed to `audit_seccomp`
/// - comm: task command name, truncated and NUL-padded
/// - container: snapshot from the containers map, all zero on a miss
#[repr(C)]
#[derive(Clone, Copy)]
#[cfg_attr(feature = "userspace", derive(Debug, PartialEq, Eq))]
pub struct AuditEvent {
    pub pid: u32,
    pub code: i32,
    pub mntns_id: u64,
    pub syscall: u64,
    pub comm: [u8; TASK_COMM_LEN],
    pub container: Container,
}

impl AuditEvent {
    pub const fn zeroed() -> Self {
        Self {
            pid: 0,
            code: 0,
            mntns_id: 0,
            syscall: 0,
            comm: [0; TASK_COMM_LEN],
            container: Container::zeroed(),
        }
    }
}

/// DNS query event
///
/// Layout (264 bytes, 4-byte aligned):
/// - pkt_type: `__sk_buff.pkt_type` (`PACKET_HOST`, `PACKET_OUTGOING`, ...)
/// - qtype: query type of the single question
/// - name_len: number of meaningful bytes in `name`
/// - name: label-encoded question name (`3 'w' 'w' 'w' 7 ...`), zero past `name_len`
#[repr(C)]
#[derive(Clone, Copy)]
#[cfg_attr(feature = "userspace", derive(Debug, PartialEq, Eq))]
pub struct DnsEvent {
    pub pkt_type: u32,
    pub qtype: u16,
    pub name_len: u16,
    pub name: [u8; MAX_DNS_NAME],
    pub _padding: u8,
}

impl DnsEvent {
    pub const fn zeroed() -> Self {
        Self {
            pkt_type: 0,
            qtype: 0,
            name_len: 0,
            name: [0; MAX_DNS_NAME],
            _padding: 0,
        }
    }

    /// The captured label-encoded name
    pub fn name(&self) -> &[u8] {
        let len = (self.name_len as usize).min(MAX_DNS_NAME);
        &self.name[..len]
    }
}

/// Offsets used to walk `task_struct -> nsproxy -> mnt_namespace -> ns.inum`
///
/// A zero `task_nsproxy` means "not configured": the probe then resolves
/// every task to namespace 0 and emits nothing.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskOffsets {
    pub task_nsproxy: u32,
    pub nsproxy_mnt_ns: u32,
    pub mnt_ns_inum: u32,
    pub _padding: u32,
}

impl TaskOffsets {
    pub const fn zeroed() -> Self {
        Self {
            task_nsproxy: 0,
            nsproxy_mnt_ns: 0,
            mnt_ns_inum: 0,
            _padding: 0,
        }
    }

    pub const fn is_configured(&self) -> bool {
        self.task_nsproxy != 0
    }
}

#[cfg(all(feature = "userspace", target_os = "linux"))]
mod pod {
    // SAFETY: all types are repr(C), Copy, and contain only integers and
    // byte arrays with explicit padding fields.
    unsafe impl aya::Pod for super::Container {}
    unsafe impl aya::Pod for super::AuditEvent {}
    unsafe impl aya::Pod for super::DnsEvent {}
    unsafe impl aya::Pod for super::TaskOffsets {}
}

#[cfg(feature = "userspace")]
const _: () = {
    assert!(
        core::mem::size_of::<Container>() == 4 * NAME_MAX_LENGTH,
        "Container must be exactly 1024 bytes"
    );
    assert!(
        core::mem::size_of::<AuditEvent>() == 1064,
        "AuditEvent must be exactly 1064 bytes"
    );
    assert!(
        core::mem::align_of::<AuditEvent>() == 8,
        "AuditEvent must be 8-byte aligned"
    );
    assert!(
        core::mem::size_of::<DnsEvent>() == 264,
        "DnsEvent must be exactly 264 bytes"
    );
    assert!(
        core::mem::size_of::<TaskOffsets>() == 16,
        "TaskOffsets must be exactly 16 bytes"
    );
};

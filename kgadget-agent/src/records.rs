//! Decoded events ready for output
//!
//! Perf samples arrive as raw bytes. [`decode`] checks their size and turns
//! them into owned, serializable records.

use crate::containers::ContainerInfo;
use kgadget_common::audit::seccomp_action_name;
use kgadget_common::dns::{decode_name, pkt_type_name, qtype_name};
use kgadget_common::{until_nul, AuditEvent, DnsEvent};
use serde::Serialize;
use std::mem;

/// Which probe produced a stream of events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    AuditSeccomp,
    Dns,
}

impl RecordKind {
    /// Size of one raw event of this kind
    pub const fn event_size(self) -> usize {
        match self {
            RecordKind::AuditSeccomp => mem::size_of::<AuditEvent>(),
            RecordKind::Dns => mem::size_of::<DnsEvent>(),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            RecordKind::AuditSeccomp => "audit_seccomp",
            RecordKind::Dns => "dns",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "gadget", rename_all = "snake_case")]
pub enum Record {
    AuditSeccomp(AuditRecord),
    Dns(DnsRecord),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::AuditSeccomp(_) => RecordKind::AuditSeccomp,
            Record::Dns(_) => RecordKind::Dns,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub pid: u32,
    pub mntns_id: u64,
    pub syscall: u64,
    pub code: i32,
    pub action: &'static str,
    pub comm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerInfo>,
}

impl From<&AuditEvent> for AuditRecord {
    fn from(event: &AuditEvent) -> Self {
        Self {
            pid: event.pid,
            mntns_id: event.mntns_id,
            syscall: event.syscall,
            code: event.code,
            action: seccomp_action_name(event.code),
            comm: String::from_utf8_lossy(until_nul(&event.comm)).into_owned(),
            container: ContainerInfo::from_snapshot(&event.container),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsRecord {
    pub name: String,
    pub qtype: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qtype_name: Option<&'static str>,
    pub pkt_type: &'static str,
}

impl From<&DnsEvent> for DnsRecord {
    fn from(event: &DnsEvent) -> Self {
        Self {
            name: decode_name(event.name()),
            qtype: event.qtype,
            qtype_name: qtype_name(event.qtype),
            pkt_type: pkt_type_name(event.pkt_type),
        }
    }
}

/// Decode one perf sample. `None` when the sample is too short.
pub fn decode(kind: RecordKind, bytes: &[u8]) -> Option<Record> {
    // perf pads raw samples to keep records 8-byte aligned
    if bytes.len() < kind.event_size() {
        return None;
    }

    // SAFETY: the length was checked above and both event types are
    // repr(C) plain data valid for any bit pattern.
    let record = match kind {
        RecordKind::AuditSeccomp => {
            let event: AuditEvent =
                unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const AuditEvent) };
            Record::AuditSeccomp(AuditRecord::from(&event))
        }
        RecordKind::Dns => {
            let event: DnsEvent =
                unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const DnsEvent) };
            Record::Dns(DnsRecord::from(&event))
        }
    };
    Some(record)
}

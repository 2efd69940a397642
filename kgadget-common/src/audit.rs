//! Seccomp audit capture
//!
//! Runs on entry of the kernel's `audit_seccomp(syscall, signr, code)`.
//! Each firing resolves the mount namespace of the current task, optionally
//! checks it against an allow-list, builds an [`AuditEvent`] in a per-CPU
//! scratch slot, enriches it with the container snapshot for that namespace,
//! and emits it.

use crate::{AuditEvent, Container, EventSink, TASK_COMM_LEN};

/// Arguments of `audit_seccomp` used by the probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditArgs {
    pub syscall: u64,
    pub code: i32,
}

/// State of the task that triggered the probe
pub trait CurrentTask {
    /// Mount namespace inode number, 0 when it cannot be resolved
    fn mntns_id(&self) -> u64;
    /// Thread group id, the process id users see
    fn pid(&self) -> u32;
    fn comm(&self) -> [u8; TASK_COMM_LEN];
}

/// Namespace to container snapshot lookup
pub trait ContainerLookup {
    fn lookup(&self, mntns_id: u64) -> Option<&Container>;
}

/// Allow-list of mount namespaces
pub trait Admission {
    fn is_admitted(&self, mntns_id: u64) -> bool;
}

/// Admission used when no filter is compiled in
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmitAll;

impl Admission for AdmitAll {
    #[inline(always)]
    fn is_admitted(&self, _mntns_id: u64) -> bool {
        true
    }
}

/// Single reusable event buffer owned by the current CPU
///
/// The returned buffer may hold bytes from a previous firing.
pub trait ScratchSlot {
    fn acquire(&mut self) -> Option<&mut AuditEvent>;
}

/// Why a firing produced no event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditSkip {
    NoNamespace,
    NotAdmitted,
    NoScratch,
}

/// The collaborators of one probe firing
pub struct AuditProbe<'a, T, A, C, S, E> {
    pub task: &'a T,
    pub admission: &'a A,
    pub containers: &'a C,
    pub scratch: &'a mut S,
    pub sink: &'a mut E,
}

impl<T, A, C, S, E> AuditProbe<'_, T, A, C, S, E>
where
    T: CurrentTask,
    A: Admission,
    C: ContainerLookup,
    S: ScratchSlot,
    E: EventSink<AuditEvent>,
{
    /// Build and emit one event for `args`.
    #[inline(always)]
    pub fn fire(self, args: AuditArgs) -> Result<(), AuditSkip> {
        let mntns_id = self.task.mntns_id();
        if mntns_id == 0 {
            return Err(AuditSkip::NoNamespace);
        }

        if !self.admission.is_admitted(mntns_id) {
            return Err(AuditSkip::NotAdmitted);
        }

        let event = self.scratch.acquire().ok_or(AuditSkip::NoScratch)?;

        event.pid = self.task.pid();
        event.mntns_id = mntns_id;
        event.syscall = args.syscall;
        event.code = args.code;
        event.comm = self.task.comm();

        match self.containers.lookup(mntns_id) {
            Some(container) => event.container = *container,
            None => event.container = Container::zeroed(),
        }

        self.sink.emit(event);
        Ok(())
    }
}

/// `SECCOMP_RET_ACTION_FULL` mask of the disposition code
pub const SECCOMP_RET_ACTION_FULL: u32 = 0xffff_0000;

/// Name of the seccomp action encoded in a disposition code
#[cfg(feature = "userspace")]
pub fn seccomp_action_name(code: i32) -> &'static str {
    match code as u32 & SECCOMP_RET_ACTION_FULL {
        0x8000_0000 => "kill_process",
        0x0000_0000 => "kill_thread",
        0x0003_0000 => "trap",
        0x0005_0000 => "errno",
        0x7fc0_0000 => "user_notif",
        0x7ff0_0000 => "trace",
        0x7ffc_0000 => "log",
        0x7fff_0000 => "allow",
        _ => "unknown",
    }
}

//! Current task state for kprobes
//!
//! `task_struct` layout differs between kernels, so the offsets of the
//! fields on the path to the mount namespace inode come from userspace
//! (the `TASK_OFFSETS` global of each audit object) rather than from
//! compiled-in headers.

use aya_ebpf::helpers::{
    bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_get_current_task, bpf_probe_read_kernel,
};
use kgadget_common::{audit::CurrentTask, TaskOffsets, TASK_COMM_LEN};

pub struct Task {
    offsets: TaskOffsets,
}

impl Task {
    pub fn new(offsets: TaskOffsets) -> Self {
        Self { offsets }
    }

    /// `task->nsproxy->mnt_ns->ns.inum`
    #[inline(always)]
    fn resolve_mntns(&self) -> Option<u64> {
        if !self.offsets.is_configured() {
            return None;
        }
        // SAFETY: always safe to call from a kprobe
        let task = unsafe { bpf_get_current_task() } as *const u8;
        let nsproxy = read_ptr(task, self.offsets.task_nsproxy)?;
        let mnt_ns = read_ptr(nsproxy, self.offsets.nsproxy_mnt_ns)?;
        let inum: u32 = read_field(mnt_ns, self.offsets.mnt_ns_inum)?;
        Some(inum as u64)
    }
}

impl CurrentTask for Task {
    #[inline(always)]
    fn mntns_id(&self) -> u64 {
        self.resolve_mntns().unwrap_or(0)
    }

    #[inline(always)]
    fn pid(&self) -> u32 {
        (bpf_get_current_pid_tgid() >> 32) as u32
    }

    #[inline(always)]
    fn comm(&self) -> [u8; TASK_COMM_LEN] {
        bpf_get_current_comm().unwrap_or([0u8; TASK_COMM_LEN])
    }
}

#[inline(always)]
fn read_field<T: Copy>(base: *const u8, offset: u32) -> Option<T> {
    if base.is_null() {
        return None;
    }
    // SAFETY: bpf_probe_read_kernel validates the address
    unsafe {
        let ptr = base.add(offset as usize) as *const T;
        bpf_probe_read_kernel(ptr).ok()
    }
}

#[inline(always)]
fn read_ptr(base: *const u8, offset: u32) -> Option<*const u8> {
    let addr: usize = read_field(base, offset)?;
    if addr == 0 {
        None
    } else {
        Some(addr as *const u8)
    }
}

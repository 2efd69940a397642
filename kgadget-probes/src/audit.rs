//! Map-backed collaborators of the seccomp audit probe

use aya_ebpf::maps::{HashMap, PerCpuArray};
use kgadget_common::{
    audit::{Admission, ContainerLookup, ScratchSlot},
    AuditEvent, Container,
};

/// Single-entry per-CPU array used to build an event too large for the stack
pub struct PerCpuSlot<'a> {
    map: &'a PerCpuArray<AuditEvent>,
}

impl<'a> PerCpuSlot<'a> {
    pub fn new(map: &'a PerCpuArray<AuditEvent>) -> Self {
        Self { map }
    }
}

impl ScratchSlot for PerCpuSlot<'_> {
    #[inline(always)]
    fn acquire(&mut self) -> Option<&mut AuditEvent> {
        let ptr = self.map.get_ptr_mut(0)?;
        // SAFETY: the entry belongs to this CPU and probes do not nest on it
        Some(unsafe { &mut *ptr })
    }
}

/// The pinned `containers` map, written only from userspace
pub struct ContainersMap<'a> {
    map: &'a HashMap<u64, Container>,
}

impl<'a> ContainersMap<'a> {
    pub fn new(map: &'a HashMap<u64, Container>) -> Self {
        Self { map }
    }
}

impl ContainerLookup for ContainersMap<'_> {
    #[inline(always)]
    fn lookup(&self, mntns_id: u64) -> Option<&Container> {
        // SAFETY: a concurrent userspace update may race with this read;
        // a stale or missing snapshot is acceptable
        unsafe { self.map.get(&mntns_id) }
    }
}

/// Presence set of admitted mount namespaces
pub struct FilterMap<'a> {
    map: &'a HashMap<u64, u32>,
}

impl<'a> FilterMap<'a> {
    pub fn new(map: &'a HashMap<u64, u32>) -> Self {
        Self { map }
    }
}

impl Admission for FilterMap<'_> {
    #[inline(always)]
    fn is_admitted(&self, mntns_id: u64) -> bool {
        // SAFETY: only presence is checked, the value is never read
        unsafe { self.map.get(&mntns_id) }.is_some()
    }
}

/// Define the seccomp audit kprobe of an object: its `TASK_OFFSETS` global,
/// the `containers`, `tmp_event` and `EVENTS` maps, and the program itself.
///
/// Both audit objects expand this, so they differ only in `admission`.
#[macro_export]
macro_rules! audit_seccomp_program {
    (admission: $admission:expr) => {
        /// Set by the loader before the object is loaded
        #[no_mangle]
        static TASK_OFFSETS: ::kgadget_common::TaskOffsets = ::kgadget_common::TaskOffsets::zeroed();

        #[::aya_ebpf::macros::map(name = "containers")]
        static CONTAINERS: ::aya_ebpf::maps::HashMap<u64, ::kgadget_common::Container> =
            ::aya_ebpf::maps::HashMap::pinned(::kgadget_common::MAX_CONTAINERS, 0);

        /// The stack is limited, so the event is built here
        #[::aya_ebpf::macros::map(name = "tmp_event")]
        static TMP_EVENT: ::aya_ebpf::maps::PerCpuArray<::kgadget_common::AuditEvent> =
            ::aya_ebpf::maps::PerCpuArray::with_max_entries(1, 0);

        #[::aya_ebpf::macros::map(name = "EVENTS")]
        static EVENTS: ::aya_ebpf::maps::PerfEventArray<::kgadget_common::AuditEvent> =
            ::aya_ebpf::maps::PerfEventArray::new(0);

        #[::aya_ebpf::macros::kprobe]
        pub fn audit_seccomp(ctx: ::aya_ebpf::programs::ProbeContext) -> u32 {
            match try_audit_seccomp(&ctx) {
                Ok(ret) => ret,
                Err(::kgadget_common::audit::AuditSkip::NoScratch) => {
                    ::aya_log_ebpf::warn!(&ctx, "tmp_event slot unavailable, event dropped");
                    0
                }
                Err(_) => 0,
            }
        }

        fn try_audit_seccomp(
            ctx: &::aya_ebpf::programs::ProbeContext,
        ) -> Result<u32, ::kgadget_common::audit::AuditSkip> {
            let args = ::kgadget_common::audit::AuditArgs {
                syscall: ctx.arg::<u64>(0).unwrap_or(0),
                code: ctx.arg::<i32>(2).unwrap_or(0),
            };
            // SAFETY: written once by the loader, read-only afterwards
            let task = $crate::task::Task::new(unsafe { core::ptr::read_volatile(&TASK_OFFSETS) });

            ::kgadget_common::audit::AuditProbe {
                task: &task,
                admission: &$admission,
                containers: &$crate::audit::ContainersMap::new(&CONTAINERS),
                scratch: &mut $crate::audit::PerCpuSlot::new(&TMP_EVENT),
                sink: &mut $crate::channel::PerfSink::new(ctx, &EVENTS),
            }
            .fire(args)?;

            Ok(0)
        }
    };
}

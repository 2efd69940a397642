//! eBPF probes for kgadget
//!
//! This crate contains eBPF programs that run in kernel space:
//! - `audit_seccomp`: kprobe on `audit_seccomp`, one event per seccomp audit
//! - `audit_seccomp_filter`: same probe restricted to the mount namespaces
//!   listed in the `filter` map
//! - `dns`: socket filter capturing simple DNS queries from raw frames
//!
//! The capture logic lives in `kgadget-common`; this crate only binds it to
//! aya-ebpf contexts and maps. Programs are in src/bin/.

#![cfg_attr(not(test), no_std)]

pub mod audit;
pub mod channel;
pub mod skb;
pub mod task;

#[cfg(all(not(test), target_arch = "bpf"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

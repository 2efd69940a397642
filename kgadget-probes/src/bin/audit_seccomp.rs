//! Seccomp audit probe, all mount namespaces
//!
//! Attaches as a kprobe on `audit_seccomp` and emits one `AuditEvent` per
//! audited syscall through the `EVENTS` perf array. Container identity comes
//! from the pinned `containers` map shared with userspace.
//!
//! Note: This binary must be built for the bpfel-unknown-none target.
//! kgadget-agent's build.rs handles the cross-compilation.

#![no_std]
#![no_main]

use kgadget_common::audit::AdmitAll;

kgadget_probes::audit_seccomp_program!(admission: AdmitAll);

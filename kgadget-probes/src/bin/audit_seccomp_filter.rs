//! Seccomp audit probe restricted to selected mount namespaces
//!
//! Same program as `audit_seccomp`, with the `filter` map compiled in:
//! firings from a mount namespace absent from `filter` return before any
//! event is built.

#![no_std]
#![no_main]

use aya_ebpf::{macros::map, maps::HashMap};
use kgadget_common::MAX_CONTAINERS;
use kgadget_probes::audit::FilterMap;

#[map(name = "filter")]
static FILTER: HashMap<u64, u32> = HashMap::with_max_entries(MAX_CONTAINERS, 0);

kgadget_probes::audit_seccomp_program!(admission: FilterMap::new(&FILTER));

//! Event channel output

use aya_ebpf::{maps::PerfEventArray, EbpfContext};
use kgadget_common::EventSink;

/// Writes records to the current CPU's perf ring.
///
/// A full ring drops the record; the probe is never told.
pub struct PerfSink<'a, C, T> {
    ctx: &'a C,
    map: &'a PerfEventArray<T>,
}

impl<'a, C: EbpfContext, T> PerfSink<'a, C, T> {
    pub fn new(ctx: &'a C, map: &'a PerfEventArray<T>) -> Self {
        Self { ctx, map }
    }
}

impl<C: EbpfContext, T> EventSink<T> for PerfSink<'_, C, T> {
    #[inline(always)]
    fn emit(&mut self, event: &T) {
        self.map.output(self.ctx, event, 0);
    }
}

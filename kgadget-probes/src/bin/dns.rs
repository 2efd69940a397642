//! DNS query probe
//!
//! Socket filter attached to a raw `AF_PACKET` socket. Every frame passes
//! through the validation chain in `kgadget_common::dns`; simple queries
//! are emitted as `DnsEvent` through the `EVENTS` perf array.
//!
//! The filter always returns 0, so no frame is queued on the socket itself.

#![no_std]
#![no_main]

use aya_ebpf::{
    macros::{map, socket_filter},
    maps::PerfEventArray,
    programs::SkBuffContext,
};
use kgadget_common::{
    dns::{capture_query, DnsSkip},
    DnsEvent, EventSink,
};
use kgadget_probes::{channel::PerfSink, skb::SkbFrame};

#[map(name = "EVENTS")]
static EVENTS: PerfEventArray<DnsEvent> = PerfEventArray::new(0);

#[socket_filter]
pub fn dns(ctx: SkBuffContext) -> i64 {
    match try_dns(&ctx) {
        Ok(ret) => ret,
        Err(_) => 0,
    }
}

fn try_dns(ctx: &SkBuffContext) -> Result<i64, DnsSkip> {
    let mut event = DnsEvent::zeroed();
    capture_query(&SkbFrame::new(ctx), &mut event)?;

    // Root queries carry an empty name and are emitted as well
    PerfSink::new(ctx, &EVENTS).emit(&event);

    Ok(0)
}

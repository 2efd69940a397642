//! Frame access for socket filter programs

use aya_ebpf::programs::SkBuffContext;
use kgadget_common::dns::Frame;

/// A frame seen by a socket filter, addressed from the link-layer header
pub struct SkbFrame<'a> {
    ctx: &'a SkBuffContext,
}

impl<'a> SkbFrame<'a> {
    pub fn new(ctx: &'a SkBuffContext) -> Self {
        Self { ctx }
    }
}

impl Frame for SkbFrame<'_> {
    #[inline(always)]
    fn load_u8(&self, offset: usize) -> Option<u8> {
        self.ctx.load::<u8>(offset).ok()
    }

    #[inline(always)]
    fn load_u16_be(&self, offset: usize) -> Option<u16> {
        self.ctx.load::<u16>(offset).ok().map(u16::from_be)
    }

    #[inline(always)]
    fn load_bytes(&self, offset: usize, dst: &mut [u8]) -> Option<()> {
        let copied = self.ctx.load_bytes(offset, dst).ok()?;
        (copied == dst.len()).then_some(())
    }

    #[inline(always)]
    fn pkt_type(&self) -> u32 {
        // SAFETY: the context pointer is valid for the whole program run
        unsafe { (*self.ctx.skb.skb).pkt_type }
    }
}

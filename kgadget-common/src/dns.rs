//! DNS query capture from raw link-layer frames
//!
//! The probe sees every frame on a raw `AF_PACKET` socket and keeps only
//! simple IPv4/UDP DNS queries: one question, no answers, no authority
//! records. Header offsets assume an Ethernet frame and an IPv4 header
//! without options.
//!
//! See https://datatracker.ietf.org/doc/html/rfc1035#section-4.1

use crate::{DnsEvent, MAX_DNS_NAME};

pub const ETH_HLEN: usize = 14;
pub const ETH_P_IP: u16 = 0x0800;
pub const IPPROTO_UDP: u8 = 17;

const ETH_PROTO_OFF: usize = 12;
const IPV4_HLEN: usize = 20;
const IPV4_PROTO_OFF: usize = ETH_HLEN + 9;
const UDP_HLEN: usize = 8;

/// Start of the DNS header inside the frame
pub const DNS_OFF: usize = ETH_HLEN + IPV4_HLEN + UDP_HLEN;
pub const DNS_HEADER_LEN: usize = 12;
/// Start of the first question name
pub const QNAME_OFF: usize = DNS_OFF + DNS_HEADER_LEN;

const DNS_FLAGS_OFF: usize = DNS_OFF + 2;
const DNS_QDCOUNT_OFF: usize = DNS_OFF + 4;
const DNS_ANCOUNT_OFF: usize = DNS_OFF + 6;
const DNS_NSCOUNT_OFF: usize = DNS_OFF + 8;

/// QR bit of the flags word: 0 = query, 1 = response
pub const DNS_FLAG_QR: u16 = 0x8000;

/// Read access to a captured frame
///
/// Multi-byte loads are big-endian on the wire and returned in host order.
/// A load that falls outside the frame returns `None`.
pub trait Frame {
    fn load_u8(&self, offset: usize) -> Option<u8>;
    fn load_u16_be(&self, offset: usize) -> Option<u16>;
    fn load_bytes(&self, offset: usize, dst: &mut [u8]) -> Option<()>;
    /// Link-layer classification of the frame (`PACKET_HOST`, ...)
    fn pkt_type(&self) -> u32;
}

/// Why a frame produced no event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsSkip {
    NotIpv4,
    NotUdp,
    Response,
    NotSimpleQuery,
    Truncated,
}

/// Run the validation chain on `frame` and fill `event`.
///
/// `event` must start zeroed: name bytes past the captured length are not
/// written. A zero-length name (the root domain, or a frame whose first
/// label length byte is 0) still produces an event.
#[inline(always)]
pub fn capture_query<F: Frame>(frame: &F, event: &mut DnsEvent) -> Result<(), DnsSkip> {
    if frame.load_u16_be(ETH_PROTO_OFF).ok_or(DnsSkip::Truncated)? != ETH_P_IP {
        return Err(DnsSkip::NotIpv4);
    }

    if frame.load_u8(IPV4_PROTO_OFF).ok_or(DnsSkip::Truncated)? != IPPROTO_UDP {
        return Err(DnsSkip::NotUdp);
    }

    let flags = frame.load_u16_be(DNS_FLAGS_OFF).ok_or(DnsSkip::Truncated)?;
    if flags & DNS_FLAG_QR != 0 {
        return Err(DnsSkip::Response);
    }

    if frame.load_u16_be(DNS_QDCOUNT_OFF).ok_or(DnsSkip::Truncated)? != 1
        || frame.load_u16_be(DNS_ANCOUNT_OFF).ok_or(DnsSkip::Truncated)? != 0
        || frame.load_u16_be(DNS_NSCOUNT_OFF).ok_or(DnsSkip::Truncated)? != 0
    {
        return Err(DnsSkip::NotSimpleQuery);
    }

    let len = bounded_name_len(frame, QNAME_OFF)?;
    if len > 0 {
        frame
            .load_bytes(QNAME_OFF, &mut event.name[..len])
            .ok_or(DnsSkip::Truncated)?;
    }
    event.name_len = len as u16;
    event.pkt_type = frame.pkt_type();

    // QTYPE follows the name and its zero-length terminator
    event.qtype = frame
        .load_u16_be(QNAME_OFF + len + 1)
        .ok_or(DnsSkip::Truncated)?;

    Ok(())
}

/// Length of the label-encoded name starting at `offset`, excluding the
/// terminating zero label, capped at [`MAX_DNS_NAME`].
///
/// Every iteration consumes one byte: either one unit of the current
/// label's remaining length, or a new length byte. The loop bound is a
/// constant and no offset is advanced by a value read from the frame, which
/// keeps the loop provably bounded. Only offsets below the cap are read.
#[inline(always)]
pub fn bounded_name_len<F: Frame>(frame: &F, offset: usize) -> Result<usize, DnsSkip> {
    let mut len = MAX_DNS_NAME;
    let mut skip: u8 = 0;

    for i in 0..MAX_DNS_NAME {
        if skip != 0 {
            skip -= 1;
            continue;
        }
        let label_len = frame.load_u8(offset + i).ok_or(DnsSkip::Truncated)?;
        if label_len == 0 {
            len = i;
            break;
        }
        skip = label_len;
    }

    Ok(len)
}

/// A frame held in memory
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    data: &'a [u8],
    pkt_type: u32,
}

impl<'a> RawFrame<'a> {
    pub fn new(data: &'a [u8], pkt_type: u32) -> Self {
        Self { data, pkt_type }
    }
}

impl Frame for RawFrame<'_> {
    fn load_u8(&self, offset: usize) -> Option<u8> {
        self.data.get(offset).copied()
    }

    fn load_u16_be(&self, offset: usize) -> Option<u16> {
        let bytes = self.data.get(offset..offset.checked_add(2)?)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn load_bytes(&self, offset: usize, dst: &mut [u8]) -> Option<()> {
        let src = self.data.get(offset..offset.checked_add(dst.len())?)?;
        dst.copy_from_slice(src);
        Some(())
    }

    fn pkt_type(&self) -> u32 {
        self.pkt_type
    }
}

/// Name length computed by jumping directly from one length byte to the
/// next. Produces the same result as [`bounded_name_len`] for any name.
#[cfg(feature = "userspace")]
pub fn direct_name_len(encoded: &[u8]) -> Option<usize> {
    let mut pos = 0;
    while pos < MAX_DNS_NAME {
        let label_len = *encoded.get(pos)? as usize;
        if label_len == 0 {
            return Some(pos);
        }
        pos += label_len + 1;
    }
    Some(MAX_DNS_NAME)
}

/// Render a label-encoded name in dotted form. The root name renders as `.`
#[cfg(feature = "userspace")]
pub fn decode_name(encoded: &[u8]) -> String {
    let mut labels: Vec<String> = Vec::new();
    let mut pos = 0;

    while let Some(&len) = encoded.get(pos) {
        // 0 terminates; 0xC0.. are compression pointers, not valid in a question
        if len == 0 || len >= 0x40 {
            break;
        }
        let start = pos + 1;
        let end = (start + len as usize).min(encoded.len());
        labels.push(String::from_utf8_lossy(&encoded[start..end]).into_owned());
        pos = start + len as usize;
    }

    if labels.is_empty() {
        ".".to_string()
    } else {
        labels.join(".")
    }
}

/// Mnemonic of a query type, if well known
#[cfg(feature = "userspace")]
pub fn qtype_name(qtype: u16) -> Option<&'static str> {
    let name = match qtype {
        1 => "A",
        2 => "NS",
        5 => "CNAME",
        6 => "SOA",
        12 => "PTR",
        15 => "MX",
        16 => "TXT",
        28 => "AAAA",
        33 => "SRV",
        35 => "NAPTR",
        41 => "OPT",
        43 => "DS",
        46 => "RRSIG",
        47 => "NSEC",
        48 => "DNSKEY",
        64 => "SVCB",
        65 => "HTTPS",
        252 => "AXFR",
        255 => "ANY",
        257 => "CAA",
        _ => return None,
    };
    Some(name)
}

/// Name of a `PACKET_*` link-layer classification
#[cfg(feature = "userspace")]
pub fn pkt_type_name(pkt_type: u32) -> &'static str {
    match pkt_type {
        0 => "HOST",
        1 => "BROADCAST",
        2 => "MULTICAST",
        3 => "OTHERHOST",
        4 => "OUTGOING",
        5 => "LOOPBACK",
        6 => "USER",
        7 => "KERNEL",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    const QUERY_FLAGS: u16 = 0x0100; // RD

    /// Ethernet + IPv4 + UDP + DNS header followed by `question`
    fn dns_frame(flags: u16, counts: [u16; 3], question: &[u8]) -> Vec<u8> {
        let mut frame = vec![0u8; DNS_OFF];
        frame[ETH_PROTO_OFF..ETH_PROTO_OFF + 2].copy_from_slice(&ETH_P_IP.to_be_bytes());
        frame[ETH_HLEN] = 0x45;
        frame[IPV4_PROTO_OFF] = IPPROTO_UDP;
        frame[ETH_HLEN + IPV4_HLEN + 2..ETH_HLEN + IPV4_HLEN + 4]
            .copy_from_slice(&53u16.to_be_bytes());

        frame.extend_from_slice(&0x1234u16.to_be_bytes());
        frame.extend_from_slice(&flags.to_be_bytes());
        for count in counts {
            frame.extend_from_slice(&count.to_be_bytes());
        }
        frame.extend_from_slice(&0u16.to_be_bytes()); // arcount
        frame.extend_from_slice(question);
        frame
    }

    fn query_frame(question: &[u8]) -> Vec<u8> {
        dns_frame(QUERY_FLAGS, [1, 0, 0], question)
    }

    fn capture(frame: &[u8]) -> Result<DnsEvent, DnsSkip> {
        let mut event = DnsEvent::zeroed();
        capture_query(&RawFrame::new(frame, 4), &mut event)?;
        Ok(event)
    }

    /// Frame wrapper recording the highest offset read
    struct Probed<'a> {
        inner: RawFrame<'a>,
        max_read: Cell<usize>,
    }

    impl Frame for Probed<'_> {
        fn load_u8(&self, offset: usize) -> Option<u8> {
            self.max_read.set(self.max_read.get().max(offset));
            self.inner.load_u8(offset)
        }
        fn load_u16_be(&self, offset: usize) -> Option<u16> {
            self.inner.load_u16_be(offset)
        }
        fn load_bytes(&self, offset: usize, dst: &mut [u8]) -> Option<()> {
            self.inner.load_bytes(offset, dst)
        }
        fn pkt_type(&self) -> u32 {
            self.inner.pkt_type()
        }
    }

    #[test]
    fn test_two_label_query() {
        let frame = query_frame(&[1, b'a', 1, b'b', 0, 0, 1, 0, 1]);
        let event = capture(&frame).expect("query should be captured");

        assert_eq!(event.name_len, 4);
        assert_eq!(event.name(), &[1, b'a', 1, b'b']);
        assert!(event.name[4..].iter().all(|&b| b == 0));
        assert_eq!(event.qtype, 1);
        assert_eq!(event.pkt_type, 4);
    }

    #[test]
    fn test_non_ipv4_frame_is_skipped() {
        let mut frame = query_frame(&[1, b'a', 0, 0, 1]);
        frame[ETH_PROTO_OFF..ETH_PROTO_OFF + 2].copy_from_slice(&0x86ddu16.to_be_bytes());
        assert_eq!(capture(&frame), Err(DnsSkip::NotIpv4));
    }

    #[test]
    fn test_non_udp_frame_is_skipped() {
        let mut frame = query_frame(&[1, b'a', 0, 0, 1]);
        frame[IPV4_PROTO_OFF] = 6;
        assert_eq!(capture(&frame), Err(DnsSkip::NotUdp));
    }

    #[test]
    fn test_response_is_skipped() {
        let frame = dns_frame(0x8180, [1, 0, 0], &[1, b'a', 0, 0, 1]);
        assert_eq!(capture(&frame), Err(DnsSkip::Response));
    }

    #[test]
    fn test_recursion_available_bit_does_not_mark_response() {
        let frame = dns_frame(0x0080, [1, 0, 0], &[1, b'a', 0, 0, 1]);
        assert!(capture(&frame).is_ok());
    }

    #[test]
    fn test_only_simple_queries_are_captured() {
        let question = [1, b'a', 0, 0, 1];
        for counts in [[0, 0, 0], [2, 0, 0], [1, 1, 0], [1, 0, 1]] {
            let frame = dns_frame(QUERY_FLAGS, counts, &question);
            assert_eq!(capture(&frame), Err(DnsSkip::NotSimpleQuery), "{counts:?}");
        }
    }

    #[test]
    fn test_zero_length_name_still_emits() {
        let frame = query_frame(&[0, 0, 2, 0, 1]);
        let event = capture(&frame).expect("root query should be captured");

        assert_eq!(event.name_len, 0);
        assert!(event.name.iter().all(|&b| b == 0));
        assert_eq!(event.qtype, 2);
    }

    #[test]
    fn test_overlong_name_is_capped() {
        // Labels of 63 bytes never terminate before the cap
        let mut question = Vec::new();
        for _ in 0..6 {
            question.push(63);
            question.extend_from_slice(&[b'x'; 63]);
        }
        question.extend_from_slice(&[0, 0, 1]);
        let frame = query_frame(&question);

        let probed = Probed {
            inner: RawFrame::new(&frame, 0),
            max_read: Cell::new(0),
        };
        assert_eq!(bounded_name_len(&probed, QNAME_OFF), Ok(MAX_DNS_NAME));
        assert!(probed.max_read.get() < QNAME_OFF + MAX_DNS_NAME);

        let event = capture(&frame).expect("capped name should be captured");
        assert_eq!(event.name_len as usize, MAX_DNS_NAME);
        assert_eq!(event.name[0], 63);
    }

    #[test]
    fn test_truncated_frame_is_skipped() {
        let frame = query_frame(&[3, b'w', b'w']);
        assert_eq!(capture(&frame), Err(DnsSkip::Truncated));

        let frame = query_frame(&[1, b'a', 0, 0]);
        assert_eq!(capture(&frame), Err(DnsSkip::Truncated));
    }

    #[test]
    fn test_bounded_and_direct_lengths_agree() {
        let names: [&[u8]; 5] = [
            &[0],
            &[1, b'a', 0],
            &[3, b'w', b'w', b'w', 7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0],
            &[2, b'k', b'8', 1, b's', 0, 9],
            &[63; 300],
        ];

        for name in names {
            let frame = RawFrame::new(name, 0);
            assert_eq!(
                bounded_name_len(&frame, 0).ok(),
                direct_name_len(name),
                "{name:?}"
            );
        }
    }

    #[test]
    fn test_decode_name() {
        assert_eq!(decode_name(&[1, b'a', 1, b'b']), "a.b");
        assert_eq!(
            decode_name(&[3, b'w', b'w', b'w', 7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm']),
            "www.example.com"
        );
        assert_eq!(decode_name(&[]), ".");
        assert_eq!(decode_name(&[5, b'a', b'b']), "ab");
        assert_eq!(decode_name(&[1, b'a', 0xc0, 0x0c]), "a");
    }

    #[test]
    fn test_names_of_codes() {
        assert_eq!(qtype_name(1), Some("A"));
        assert_eq!(qtype_name(28), Some("AAAA"));
        assert_eq!(qtype_name(9999), None);
        assert_eq!(pkt_type_name(0), "HOST");
        assert_eq!(pkt_type_name(4), "OUTGOING");
        assert_eq!(pkt_type_name(42), "UNKNOWN");
    }
}

//! ICMPv4 wire codec: build an Echo Request, parse the four reply kinds the
//! engine correlates against.
//!
//! The kernel delivers ICMP payload only (no IP header) on an
//! unprivileged ICMP datagram socket, so [`parse`] never sees an outer IPv4
//! header for the *received* datagram itself — only, for `TimeExceeded` /
//! `DestinationUnreachable`, an embedded copy of the original IPv4+ICMP
//! header that caused the error. Every field access here is bounds-checked;
//! nothing here may panic or read out of bounds on arbitrary input.

use crate::types::{Sequence, TraceId};

const ICMP_HEADER_LEN: usize = 8;

const TYPE_ECHO_REPLY: u8 = 0;
const TYPE_ECHO_REQUEST: u8 = 8;
const TYPE_DEST_UNREACHABLE: u8 = 3;
const TYPE_TIME_EXCEEDED: u8 = 11;

/// A deterministic, printable filler byte pattern used to pad the Echo
/// Request payload out to the configured packet size.
const PAYLOAD_FILLER: &[u8] = b"pathprobe-0123456789abcdefghijklmnopqrstuvwxyz";

/// A successfully parsed inbound ICMP message, with the fields needed to
/// correlate it to an outstanding probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpMessage {
    /// A direct reply from the destination host.
    EchoReply { id: TraceId, seq: Sequence },
    /// An intermediate router ran the packet's TTL to zero.
    TimeExceeded {
        original_id: Option<TraceId>,
        original_seq: Option<Sequence>,
    },
    /// The destination (or an intermediate router) could not deliver the
    /// packet.
    DestinationUnreachable {
        original_id: Option<TraceId>,
        original_seq: Option<Sequence>,
    },
}

/// Builds a complete ICMP Echo Request datagram (8 byte header + payload),
/// with a correctly computed Internet checksum.
#[must_use]
pub fn build_echo_request(id: TraceId, seq: Sequence, payload_size: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ICMP_HEADER_LEN + payload_size);
    buf.push(TYPE_ECHO_REQUEST);
    buf.push(0); // code
    buf.push(0); // checksum hi (patched below)
    buf.push(0); // checksum lo
    buf.extend_from_slice(&id.0.to_be_bytes());
    buf.extend_from_slice(&seq.0.to_be_bytes());
    for i in 0..payload_size {
        buf.push(PAYLOAD_FILLER[i % PAYLOAD_FILLER.len()]);
    }
    let checksum = super::checksum::internet_checksum(&buf, 2);
    let be = checksum.to_be_bytes();
    buf[2] = be[0];
    buf[3] = be[1];
    buf
}

/// Parses an inbound ICMP datagram, as delivered (payload only, no IP
/// header) by an unprivileged ICMP datagram socket.
///
/// Returns `None` for any message kind we do not recognize, or for any input
/// too short or malformed to contain the fields we need. A `None` result is
/// not an error: malformed or irrelevant datagrams are simply ignored.
#[must_use]
pub fn parse(buf: &[u8]) -> Option<IcmpMessage> {
    if buf.len() < ICMP_HEADER_LEN {
        return None;
    }
    let icmp_type = buf[0];
    match icmp_type {
        TYPE_ECHO_REPLY => {
            let id = TraceId(u16::from_be_bytes([buf[4], buf[5]]));
            let seq = Sequence(u16::from_be_bytes([buf[6], buf[7]]));
            Some(IcmpMessage::EchoReply { id, seq })
        }
        TYPE_TIME_EXCEEDED => {
            let (original_id, original_seq) = parse_embedded_probe(&buf[ICMP_HEADER_LEN..])?;
            Some(IcmpMessage::TimeExceeded {
                original_id,
                original_seq,
            })
        }
        TYPE_DEST_UNREACHABLE => {
            let (original_id, original_seq) = parse_embedded_probe(&buf[ICMP_HEADER_LEN..])?;
            Some(IcmpMessage::DestinationUnreachable {
                original_id,
                original_seq,
            })
        }
        _ => None,
    }
}

/// Recovers the identifier/sequence of the original probe embedded in the
/// body of a `TimeExceeded`/`DestinationUnreachable` message: a copy of the
/// original IPv4 header (whose length in 32-bit words is given by the low
/// nibble of the first byte, the IHL field) followed by the first 8 bytes of
/// the original ICMP message.
///
/// Returns `(None, None)` rather than failing outright when the embedded
/// ICMP header is present but truncated before the id/seq fields, since
/// `TimeExceeded`/`DestinationUnreachable` hops are still useful (they give
/// us the responder's address) even without id/seq confirmation — the
/// correlator then falls back to accepting the reply for whichever hop is
/// still outstanding.
fn parse_embedded_probe(body: &[u8]) -> Option<(Option<TraceId>, Option<Sequence>)> {
    if body.is_empty() {
        return None;
    }
    let ihl = usize::from(body[0] & 0x0F);
    let inner_ip_header_len = ihl.saturating_mul(4);
    if inner_ip_header_len < 20 {
        // a malformed or absent embedded IPv4 header: still acknowledge the
        // message kind, but without recoverable id/seq.
        return Some((None, None));
    }
    let inner_icmp = body.get(inner_ip_header_len..)?;
    if inner_icmp.len() < ICMP_HEADER_LEN {
        return Some((None, None));
    }
    let id = TraceId(u16::from_be_bytes([inner_icmp[4], inner_icmp[5]]));
    let seq = Sequence(u16::from_be_bytes([inner_icmp[6], inner_icmp[7]]));
    Some((Some(id), Some(seq)))
}

//! Small newtype wrappers used throughout the wire codec, socket session and
//! correlator (`TraceId`, `Sequence`, `PacketSize`, ...): thin
//! `derive_more`-backed wrappers rather than bare `u16`/`u8`, so that a TTL
//! can't be passed where a sequence is expected.

use derive_more::{Add, Display, From, Into};

/// The 16-bit ICMP echo identifier used to correlate replies to a session.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display, From, Into)]
pub struct TraceId(pub u16);

/// The 16-bit ICMP echo sequence number. Within one batched traceroute this
/// equals the TTL being probed; within a ping session it is the probe index.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Display, From, Into, Add)]
pub struct Sequence(pub u16);

/// A hop's time-to-live, in range `1..=255`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Display, From, Into)]
pub struct Ttl(pub u8);

/// The size, in bytes, of the ICMP payload (excludes the 8 byte header).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, From, Into)]
pub struct PacketSize(pub u16);

/// A flow variation index used by the multipath enumerator to derive a
/// distinct ICMP identifier from the base session identifier.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display, From, Into)]
pub struct FlowVariation(pub u16);

impl Ttl {
    #[must_use]
    pub fn as_usize(self) -> usize {
        usize::from(self.0)
    }
}

impl Sequence {
    #[must_use]
    pub fn as_ttl(self) -> Option<Ttl> {
        u8::try_from(self.0).ok().map(Ttl)
    }
}

//! The wire codec: ICMP Echo Request encoding and inbound message parsing.
//! Leaf module — no socket or async dependencies.

pub mod checksum;
pub mod icmp;

pub use icmp::{build_echo_request, parse, IcmpMessage};

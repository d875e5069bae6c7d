//! Parallel, unprivileged-ICMP network path diagnostics: traceroute, ping,
//! multipath/ECMP discovery and bufferbloat testing.
//!
//! Every diagnostic in this crate is built on one primitive: an
//! unprivileged ICMP datagram socket (`SOCK_DGRAM` + `IPPROTO_ICMP`), which
//! needs no `CAP_NET_RAW`/administrator privilege. See [`socket`] for the
//! acquisition path and [`wire`] for the packet codec.

pub mod asn;
pub mod bufferbloat;
pub mod classify;
pub mod collaborators;
pub mod config;
pub mod correlator;
pub mod engine;
pub mod error;
pub mod multipath;
pub mod ping;
pub mod rdns;
pub mod resolve;
pub mod socket;
pub mod stats;
pub mod trace;
pub mod types;
pub mod wire;

pub use engine::Engine;
pub use error::{Error, Result};

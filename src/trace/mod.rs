//! Traceroute: a batched, one-shot-burst engine and a
//! streaming variant, both built on the shared send phase in this module.

mod batched;
mod stream;

pub use batched::trace;
pub(crate) use batched::trace_with_session;
pub use stream::{trace_stream, HopEvent, StreamOptions};

use crate::correlator::ProbeCorrelator;
use crate::error::Result;
use crate::resolve::resolve;
use crate::socket::{BindOptions, SocketSession};
use crate::types::{Sequence, Ttl};
use arrayvec::ArrayVec;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// The maximum number of hops a single `TraceResult` can hold. `max_hops` is
/// itself a `u8`, so this is its full range.
pub const MAX_HOPS: usize = 255;

/// A single traceroute hop.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceHop {
    pub ttl: Ttl,
    pub ip: Option<IpAddr>,
    pub rtt: Option<Duration>,
    pub reached_destination: bool,
    pub hostname: Option<String>,
}

impl TraceHop {
    fn timeout(ttl: Ttl) -> Self {
        Self {
            ttl,
            ip: None,
            rtt: None,
            reached_destination: false,
            hostname: None,
        }
    }
}

/// The result of a batched traceroute.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceResult {
    pub destination: String,
    pub destination_ip: IpAddr,
    pub reached: bool,
    pub hops: ArrayVec<TraceHop, MAX_HOPS>,
    pub duration: Duration,
}

/// Acquires a socket session and sends one Echo Request per TTL in
/// `1..=max_hops`, recording each send under the correlator.
pub(crate) async fn send_phase(
    session: &SocketSession,
    correlator: &mut ProbeCorrelator,
    dest: IpAddr,
    max_hops: u8,
    payload_size: usize,
) -> Result<Vec<Instant>> {
    let IpAddr::V4(dest_v4) = dest else {
        return Err(crate::error::Error::ResolutionFailed {
            host: dest.to_string(),
            details: Some("only IPv4 destinations are supported".to_string()),
        });
    };
    let mut sent_at = Vec::with_capacity(max_hops as usize);
    for ttl in 1..=max_hops {
        let seq = Sequence(u16::from(ttl));
        let at = session
            .send_echo_request(dest_v4, Ttl(ttl), seq, payload_size)
            .await?;
        correlator.record_send(seq, at);
        sent_at.push(at);
    }
    Ok(sent_at)
}

pub(crate) async fn resolve_destination(host: &str) -> Result<(IpAddr, Option<String>)> {
    let resolved = resolve(host).await?;
    Ok((IpAddr::V4(resolved.ip()), resolved.canonical_name))
}

pub(crate) fn new_session(opts: &BindOptions) -> Result<SocketSession> {
    SocketSession::new(opts)
}

//! Batched traceroute: send one probe per TTL in a burst, then
//! run a single receive loop until a global deadline or early completion.

use super::{resolve_destination, send_phase, TraceHop, TraceResult, MAX_HOPS};
use crate::config::Config;
use crate::correlator::ProbeCorrelator;
use crate::error::Result;
use crate::socket::SocketSession;
use arrayvec::ArrayVec;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Runs a batched traceroute to `host`,
/// acquiring a socket session with a freshly-chosen random identifier.
pub async fn trace(host: &str, config: &Config, cancellation: CancellationToken) -> Result<TraceResult> {
    let session = super::new_session(&config.bind_options())?;
    trace_with_session(host, config, cancellation, session).await
}

/// Same algorithm as [`trace`], but against a caller-supplied session. Used
/// by the multipath enumerator, whose flow variations each need
/// a session built with a specific, deterministically-spaced identifier
/// rather than an independently random one.
pub(crate) async fn trace_with_session(
    host: &str,
    config: &Config,
    cancellation: CancellationToken,
    session: SocketSession,
) -> Result<TraceResult> {
    let start = Instant::now();
    let (dest_ip, _canonical) = resolve_destination(host).await?;

    let mut correlator = ProbeCorrelator::new(session.identifier());
    let max_hops = config.max_hops();
    let _sent_at = send_phase(&session, &mut correlator, dest_ip, max_hops, config.payload_size()).await?;

    let deadline = start + config.max_wait();
    let mut hops: Vec<Option<TraceHop>> = vec![None; max_hops as usize];
    let mut reached_at: Option<u8> = None;

    loop {
        if cancellation.is_cancelled() || Instant::now() >= deadline {
            break;
        }
        if let Some(r) = reached_at {
            if all_filled_before(&hops, r) {
                break;
            }
        }

        let received = tokio::select! {
            () = cancellation.cancelled() => break,
            res = session.recv_ready(deadline) => res?,
        };
        if received.is_empty() {
            continue;
        }

        let now = Instant::now();
        for (message, from) in received {
            let Some(correlated) = correlator.correlate(message, from, now) else {
                continue;
            };
            let Some(ttl) = correlated.seq.as_ttl() else {
                continue;
            };
            let idx = ttl.0 as usize - 1;
            if idx >= hops.len() || hops[idx].is_some() {
                continue;
            }
            hops[idx] = Some(TraceHop {
                ttl,
                ip: Some(correlated.ip),
                rtt: Some(correlated.rtt),
                reached_destination: correlated.reached_destination,
                hostname: None,
            });
            if correlated.reached_destination {
                reached_at = Some(reached_at.map_or(ttl.0, |r| r.min(ttl.0)));
            }
        }
    }

    let limit = reached_at.unwrap_or(max_hops);
    let mut result_hops: ArrayVec<TraceHop, MAX_HOPS> = ArrayVec::new();
    for ttl in 1..=limit {
        let idx = (ttl - 1) as usize;
        let hop = hops[idx]
            .clone()
            .unwrap_or_else(|| TraceHop::timeout(crate::types::Ttl(ttl)));
        result_hops.push(hop);
    }

    Ok(TraceResult {
        destination: host.to_string(),
        destination_ip: dest_ip,
        reached: reached_at.is_some(),
        hops: result_hops,
        duration: start.elapsed(),
    })
}

/// True iff every slot `1..r` is filled — the batched engine's
/// early-termination check.
fn all_filled_before(hops: &[Option<TraceHop>], r: u8) -> bool {
    (1..r).all(|ttl| hops[(ttl - 1) as usize].is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Ttl;

    fn filled(ttl: u8) -> Option<TraceHop> {
        Some(TraceHop {
            ttl: Ttl(ttl),
            ip: Some("1.1.1.1".parse().unwrap()),
            rtt: Some(std::time::Duration::from_millis(1)),
            reached_destination: false,
            hostname: None,
        })
    }

    #[test]
    fn all_filled_before_true_when_every_earlier_slot_is_filled() {
        let hops = vec![filled(1), filled(2), None, None];
        assert!(all_filled_before(&hops, 3));
    }

    #[test]
    fn all_filled_before_false_with_a_gap() {
        let hops = vec![filled(1), None, filled(3), None];
        assert!(!all_filled_before(&hops, 3));
    }

    #[test]
    fn all_filled_before_one_is_vacuously_true() {
        let hops: Vec<Option<TraceHop>> = vec![None, None];
        assert!(all_filled_before(&hops, 1));
    }
}

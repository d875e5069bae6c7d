//! Streaming traceroute: same send phase as the batched engine,
//! but hops are yielded as soon as they're known, with a per-TTL
//! retry-after timer and an end-of-stream timeout placeholder pass.

use super::{resolve_destination, TraceHop};
use crate::config::Config;
use crate::correlator::ProbeCorrelator;
use crate::error::Result;
use crate::types::{Sequence, Ttl};
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

/// An item yielded by [`trace_stream`]: sorted only by arrival order, never
/// by TTL.
pub type HopEvent = TraceHop;

#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    pub retry_after: Duration,
    pub emit_timeouts: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            retry_after: Duration::from_millis(500),
            emit_timeouts: true,
        }
    }
}

/// Starts a streaming traceroute to `host`. The send phase and socket
/// acquisition happen before this function returns (so resolution/socket
/// errors surface directly to the caller); the receive loop then runs on a
/// spawned task and yields hops through the returned stream.
pub async fn trace_stream(
    host: &str,
    config: &Config,
    options: StreamOptions,
    cancellation: CancellationToken,
) -> Result<impl Stream<Item = HopEvent>> {
    let start = Instant::now();
    let (dest_ip, _canonical) = resolve_destination(host).await?;
    let IpAddr::V4(dest_v4) = dest_ip else {
        return Err(crate::error::Error::ResolutionFailed {
            host: host.to_string(),
            details: Some("only IPv4 destinations are supported".to_string()),
        });
    };

    let session = super::new_session(&config.bind_options())?;
    let mut correlator = ProbeCorrelator::new(session.identifier());
    let max_hops = config.max_hops();
    let payload_size = config.payload_size();

    let mut last_sent_at = Vec::with_capacity(max_hops as usize);
    let mut retried = vec![false; max_hops as usize];
    for ttl in 1..=max_hops {
        let seq = Sequence(u16::from(ttl));
        let at = session.send_echo_request(dest_v4, Ttl(ttl), seq, payload_size).await?;
        correlator.record_send(seq, at);
        last_sent_at.push(at);
    }

    let deadline = start + config.max_wait();
    let (tx, rx) = mpsc::unbounded_channel::<HopEvent>();

    tokio::spawn(async move {
        let mut filled = vec![false; max_hops as usize];
        let mut highest_reached: Option<u8> = None;

        loop {
            if cancellation.is_cancelled() || Instant::now() >= deadline {
                break;
            }

            for ttl in 1..=max_hops {
                let idx = (ttl - 1) as usize;
                if filled[idx] || retried[idx] {
                    continue;
                }
                if Instant::now().saturating_duration_since(last_sent_at[idx]) >= options.retry_after {
                    let seq = Sequence(u16::from(ttl));
                    if let Ok(at) = session.send_echo_request(dest_v4, Ttl(ttl), seq, payload_size).await {
                        correlator.record_send(seq, at);
                        last_sent_at[idx] = at;
                        retried[idx] = true;
                    }
                }
            }

            let recv_deadline = next_recv_deadline(&filled, &retried, &last_sent_at, options.retry_after, deadline);

            let received = tokio::select! {
                () = cancellation.cancelled() => break,
                res = session.recv_ready(recv_deadline) => match res {
                    Ok(r) => r,
                    Err(_) => break,
                },
            };

            let now = Instant::now();
            for (message, from) in received {
                let Some(correlated) = correlator.correlate(message, from, now) else {
                    continue;
                };
                let Some(ttl) = correlated.seq.as_ttl() else {
                    continue;
                };
                let idx = ttl.0 as usize - 1;
                if idx >= filled.len() || filled[idx] {
                    continue;
                }
                filled[idx] = true;
                if correlated.reached_destination {
                    highest_reached = Some(highest_reached.map_or(ttl.0, |r| r.min(ttl.0)));
                }
                let hop = TraceHop {
                    ttl,
                    ip: Some(correlated.ip),
                    rtt: Some(correlated.rtt),
                    reached_destination: correlated.reached_destination,
                    hostname: None,
                };
                if tx.send(hop).is_err() {
                    return;
                }
            }
        }

        if options.emit_timeouts {
            let limit = highest_reached.unwrap_or(max_hops);
            for ttl in 1..=limit {
                let idx = (ttl - 1) as usize;
                if !filled[idx] {
                    let _ = tx.send(TraceHop::timeout(Ttl(ttl)));
                }
            }
        }
    });

    Ok(UnboundedReceiverStream::new(rx))
}

/// The deadline `recv_ready` should be given: the earliest of the stream's
/// overall `deadline` and the next moment a still-outstanding, not-yet-retried
/// hop becomes due for its one retry. Without this clamp, once every hop has
/// been sent at least once, `recv_ready` blocks all the way to `deadline` and
/// a dropped probe's resend never fires until some unrelated reply happens to
/// wake the loop.
fn next_recv_deadline(filled: &[bool], retried: &[bool], last_sent_at: &[Instant], retry_after: Duration, deadline: Instant) -> Instant {
    let next_retry_due = filled
        .iter()
        .zip(retried)
        .zip(last_sent_at)
        .filter(|((&is_filled, &is_retried), _)| !is_filled && !is_retried)
        .map(|(_, &sent_at)| sent_at + retry_after)
        .min();
    next_retry_due.map_or(deadline, |due| due.min(deadline))
}

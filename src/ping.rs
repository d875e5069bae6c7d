//! Ping session: concurrent sender/receiver sharing one socket,
//! with loss/min/avg/max/jitter statistics.
//!
//! **Known gap**: `PingResponse::ttl` is always `None`. Recovering the
//! inbound IP TTL requires reading the ancillary `IP_RECVTTL` control
//! message off a `recvmsg` call; [`SocketSession`] currently only exposes
//! plain `recv_from`. A future
//! revision of the socket layer that adds `recvmsg` support can populate
//! this field without changing the public shape of `PingResponse`.

use crate::correlator::ProbeCorrelator;
use crate::error::{Error, Result};
use crate::resolve::resolve;
use crate::socket::{BindOptions, SocketSession};
use crate::stats;
use crate::types::{Sequence, Ttl};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// The fixed outgoing TTL used for ping probes (not varied, unlike
/// traceroute).
const PING_TTL: Ttl = Ttl(64);

#[derive(Debug, Clone, Copy)]
pub struct PingConfig {
    pub count: u32,
    pub interval: Duration,
    pub timeout: Duration,
    pub payload_size: usize,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            count: 4,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(2),
            payload_size: 0,
        }
    }
}

/// One probe's outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct PingResponse {
    pub sequence: Sequence,
    pub rtt: Option<Duration>,
    pub ttl: Option<Ttl>,
    pub timestamp: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingStatistics {
    pub sent: u32,
    pub received: u32,
    pub loss: f64,
    pub min: Option<Duration>,
    pub avg: Option<Duration>,
    pub max: Option<Duration>,
    pub jitter: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PingResult {
    pub responses: Vec<PingResponse>,
    pub statistics: PingStatistics,
}

/// Runs a ping session against `host`. Safe to call concurrently with any
/// number of other pings, to the same or different targets: each call owns its own socket session.
pub async fn ping(host: &str, config: &PingConfig, bind: &BindOptions, cancellation: CancellationToken) -> Result<PingResult> {
    let resolved = resolve(host).await?;
    let dest_v4 = resolved.ip();
    let session = SocketSession::new(bind)?;
    let correlator = Mutex::new(ProbeCorrelator::new(session.identifier()));
    let recorded: Mutex<HashMap<Sequence, Duration>> = Mutex::new(HashMap::new());
    let last_sent = Mutex::new(Instant::now());
    let sender_done = AtomicBool::new(false);

    let sender = async {
        for seq in 1..=config.count {
            if cancellation.is_cancelled() {
                break;
            }
            let seqv = Sequence(u16::try_from(seq).unwrap_or(u16::MAX));
            let at = session
                .send_echo_request(dest_v4, PING_TTL, seqv, config.payload_size)
                .await?;
            correlator.lock().record_send(seqv, at);
            *last_sent.lock() = at;
            if seq < config.count {
                tokio::select! {
                    () = cancellation.cancelled() => break,
                    () = tokio::time::sleep(config.interval) => {},
                }
            }
        }
        sender_done.store(true, Ordering::Release);
        Ok::<(), Error>(())
    };

    let receiver = async {
        loop {
            if cancellation.is_cancelled() {
                break;
            }
            let session_deadline = *last_sent.lock() + config.timeout;
            if sender_done.load(Ordering::Acquire) && Instant::now() >= session_deadline {
                break;
            }
            let poll_deadline = session_deadline.min(Instant::now() + Duration::from_millis(200));
            let received = tokio::select! {
                () = cancellation.cancelled() => break,
                res = session.recv_ready(poll_deadline) => match res {
                    Ok(r) => r,
                    Err(_) => break,
                },
            };
            let now = Instant::now();
            for (message, from) in received {
                if let Some(correlated) = correlator.lock().correlate(message, from, now) {
                    if correlated.reached_destination {
                        recorded.lock().insert(correlated.seq, correlated.rtt);
                    }
                }
            }
        }
    };

    let (sender_result, ()) = tokio::join!(sender, receiver);
    sender_result?;

    let recorded = recorded.into_inner();
    let now = Instant::now();
    let mut responses = Vec::with_capacity(config.count as usize);
    for seq in 1..=config.count {
        let seqv = Sequence(u16::try_from(seq).unwrap_or(u16::MAX));
        responses.push(PingResponse {
            sequence: seqv,
            rtt: recorded.get(&seqv).copied(),
            ttl: None,
            timestamp: now,
        });
    }

    let statistics = compute_statistics(config.count, &responses);
    Ok(PingResult { responses, statistics })
}

fn compute_statistics(sent: u32, responses: &[PingResponse]) -> PingStatistics {
    let rtts: Vec<Duration> = responses.iter().filter_map(|r| r.rtt).collect();
    let received = u32::try_from(rtts.len()).unwrap_or(u32::MAX);
    let loss = if sent == 0 { 0.0 } else { 1.0 - f64::from(received) / f64::from(sent) };
    let min = rtts.iter().copied().min();
    let max = rtts.iter().copied().max();
    let avg = stats::mean(&rtts);
    let jitter = if rtts.len() >= 2 { Some(stats::population_stddev(&rtts)) } else { None };
    PingStatistics {
        sent,
        received,
        loss,
        min,
        avg,
        max,
        jitter,
    }
}

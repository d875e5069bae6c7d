//! The probe correlator: matches inbound ICMP messages to
//! outstanding probes by session identifier and sequence number.
//!
//! Used by both the traceroute engines (where `Sequence` equals the TTL
//! being probed) and the ping session (where `Sequence` is the probe
//! index) — the correlator itself is oblivious to that distinction.

use crate::types::{Sequence, TraceId};
use crate::wire::IcmpMessage;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// A successfully correlated reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correlated {
    pub seq: Sequence,
    pub ip: IpAddr,
    pub rtt: Duration,
    /// `true` for an `EchoReply` (the destination answered directly),
    /// `false` for a `TimeExceeded`/`DestinationUnreachable` (an
    /// intermediate hop).
    pub reached_destination: bool,
}

/// Tracks outstanding probes for one socket session and matches inbound
/// replies against them.
pub struct ProbeCorrelator {
    session_id: TraceId,
    outstanding: HashMap<Sequence, Instant>,
}

impl ProbeCorrelator {
    #[must_use]
    pub fn new(session_id: TraceId) -> Self {
        Self {
            session_id,
            outstanding: HashMap::new(),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> TraceId {
        self.session_id
    }

    /// Records that a probe with sequence `seq` was sent at `at`.
    pub fn record_send(&mut self, seq: Sequence, at: Instant) {
        self.outstanding.insert(seq, at);
    }

    /// Returns the set of sequences still awaiting a reply.
    #[must_use]
    pub fn outstanding_sequences(&self) -> Vec<Sequence> {
        self.outstanding.keys().copied().collect()
    }

    /// Attempts to correlate an inbound message to an outstanding probe. A
    /// matched sequence is removed so a later duplicate reply for the same
    /// sequence is ignored: the first responder wins.
    pub fn correlate(&mut self, message: IcmpMessage, from: IpAddr, now: Instant) -> Option<Correlated> {
        match message {
            IcmpMessage::EchoReply { id, seq } => {
                if id != self.session_id {
                    return None;
                }
                let sent_at = self.outstanding.remove(&seq)?;
                Some(Correlated {
                    seq,
                    ip: from,
                    rtt: now.saturating_duration_since(sent_at),
                    reached_destination: true,
                })
            }
            IcmpMessage::TimeExceeded {
                original_id,
                original_seq,
            }
            | IcmpMessage::DestinationUnreachable {
                original_id,
                original_seq,
            } => {
                if let Some(id) = original_id {
                    if id != self.session_id {
                        return None;
                    }
                }
                let seq = original_seq?;
                let sent_at = self.outstanding.remove(&seq)?;
                Some(Correlated {
                    seq,
                    ip: from,
                    rtt: now.saturating_duration_since(sent_at),
                    reached_destination: false,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_reply_with_matching_id_correlates() {
        let mut c = ProbeCorrelator::new(TraceId(42));
        let sent = Instant::now();
        c.record_send(Sequence(3), sent);
        let msg = IcmpMessage::EchoReply {
            id: TraceId(42),
            seq: Sequence(3),
        };
        let got = c
            .correlate(msg, "93.184.216.34".parse().unwrap(), sent + Duration::from_millis(10))
            .unwrap();
        assert_eq!(got.seq, Sequence(3));
        assert!(got.reached_destination);
        assert_eq!(got.rtt, Duration::from_millis(10));
    }

    #[test]
    fn echo_reply_with_foreign_id_is_ignored() {
        let mut c = ProbeCorrelator::new(TraceId(42));
        c.record_send(Sequence(3), Instant::now());
        let msg = IcmpMessage::EchoReply {
            id: TraceId(99),
            seq: Sequence(3),
        };
        assert!(c.correlate(msg, "1.1.1.1".parse().unwrap(), Instant::now()).is_none());
    }

    #[test]
    fn time_exceeded_with_absent_id_is_accepted() {
        let mut c = ProbeCorrelator::new(TraceId(42));
        c.record_send(Sequence(5), Instant::now());
        let msg = IcmpMessage::TimeExceeded {
            original_id: None,
            original_seq: Some(Sequence(5)),
        };
        let got = c.correlate(msg, "10.0.0.1".parse().unwrap(), Instant::now()).unwrap();
        assert!(!got.reached_destination);
    }

    #[test]
    fn second_reply_for_same_sequence_is_ignored_first_responder_wins() {
        let mut c = ProbeCorrelator::new(TraceId(1));
        c.record_send(Sequence(1), Instant::now());
        let msg = IcmpMessage::EchoReply {
            id: TraceId(1),
            seq: Sequence(1),
        };
        assert!(c.correlate(msg, "1.1.1.1".parse().unwrap(), Instant::now()).is_some());
        assert!(c.correlate(msg, "1.1.1.1".parse().unwrap(), Instant::now()).is_none());
    }

    #[test]
    fn reply_for_unknown_sequence_is_ignored() {
        let mut c = ProbeCorrelator::new(TraceId(1));
        let msg = IcmpMessage::EchoReply {
            id: TraceId(1),
            seq: Sequence(77),
        };
        assert!(c.correlate(msg, "1.1.1.1".parse().unwrap(), Instant::now()).is_none());
    }
}

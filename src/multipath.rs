//! Multipath enumerator: repeatedly traces with varied flow
//! identifiers, deduplicating paths by fingerprint and stopping early after
//! a run of consecutive duplicates.

use crate::classify::{classify, ClassifiedTrace};
use crate::config::{AsnStrategy, Config};
use crate::error::Result;
use crate::socket::SocketSession;
use crate::types::{FlowVariation, Ttl, TraceId};
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Spacing prime for deterministic flow-identifier generation.
const FLOW_SPACING_PRIME: u16 = 173;

/// How many flow variations to run concurrently per batch; batches
/// themselves run sequentially so early-stop can take effect between them.
const BATCH_SIZE: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct MultipathConfig {
    pub flow_variations: u16,
    pub max_paths: usize,
    pub early_stop_threshold: usize,
    pub timeout: Duration,
    pub max_hops: u8,
}

/// A per-probe-burst ICMP identifier derived from a base session identifier
/// and a variation index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowIdentifier {
    pub icmp_id: TraceId,
    pub variation: FlowVariation,
}

fn derive_identifier(base: TraceId, variation: u16) -> TraceId {
    TraceId(base.0.wrapping_add(variation.wrapping_mul(FLOW_SPACING_PRIME)))
}

/// One flow variation's classified trace plus its fingerprint.
#[derive(Debug, Clone)]
pub struct DiscoveredPath {
    pub flow_id: FlowIdentifier,
    pub trace: ClassifiedTrace,
    pub fingerprint: String,
    pub unique: bool,
}

/// The full result of a multipath discovery run.
#[derive(Debug, Clone)]
pub struct NetworkTopology {
    pub destination: String,
    pub paths: Vec<DiscoveredPath>,
    pub unique_path_count: usize,
    pub discovery_duration: Duration,
}

impl NetworkTopology {
    /// Union of responding hops across every path, deduplicated by IP and
    /// sorted by the lowest TTL any path observed it at.
    #[must_use]
    pub fn unique_hops(&self) -> Vec<(Ttl, IpAddr)> {
        let mut first_seen: HashMap<IpAddr, Ttl> = HashMap::new();
        for path in &self.paths {
            for hop in &path.trace.hops {
                if let Some(ip) = hop.ip {
                    first_seen
                        .entry(ip)
                        .and_modify(|ttl| {
                            if hop.ttl.0 < ttl.0 {
                                *ttl = hop.ttl;
                            }
                        })
                        .or_insert(hop.ttl);
                }
            }
        }
        let mut out: Vec<(Ttl, IpAddr)> = first_seen.into_iter().map(|(ip, ttl)| (ttl, ip)).collect();
        out.sort_by_key(|(ttl, _)| ttl.0);
        out
    }

    /// The longest prefix of `(ttl, ip)` identical across every path.
    #[must_use]
    pub fn common_prefix(&self) -> Vec<(Ttl, Option<IpAddr>)> {
        let Some(min_len) = self.paths.iter().map(|p| p.trace.hops.len()).min() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for idx in 0..min_len {
            let reference = self.paths[0].trace.hops[idx].ip;
            if self.paths.iter().all(|p| p.trace.hops[idx].ip == reference) {
                out.push((self.paths[0].trace.hops[idx].ttl, reference));
            } else {
                break;
            }
        }
        out
    }

    /// The lowest TTL at which any two paths disagree, including a
    /// timeout-vs-IP disagreement; `None` iff every path shares a
    /// fingerprint.
    #[must_use]
    pub fn divergence_point(&self) -> Option<Ttl> {
        if self.paths.len() < 2 {
            return None;
        }
        let min_len = self.paths.iter().map(|p| p.trace.hops.len()).min().unwrap_or(0);
        for idx in 0..min_len {
            let reference = self.paths[0].trace.hops[idx].ip;
            if !self.paths.iter().all(|p| p.trace.hops[idx].ip == reference) {
                return Some(self.paths[0].trace.hops[idx].ttl);
            }
        }
        let lengths_differ = self.paths.iter().map(|p| p.trace.hops.len()).unique().count() > 1;
        if lengths_differ {
            return u8::try_from(min_len + 1).ok().map(Ttl);
        }
        None
    }

    /// Paths with at least one hop at `ip`.
    #[must_use]
    pub fn paths_through_ip(&self, ip: IpAddr) -> Vec<&DiscoveredPath> {
        self.paths.iter().filter(|p| p.trace.hops.iter().any(|h| h.ip == Some(ip))).collect()
    }

    /// Paths with at least one hop classified under `asn`.
    #[must_use]
    pub fn paths_through_asn(&self, asn: u32) -> Vec<&DiscoveredPath> {
        self.paths.iter().filter(|p| p.trace.hops.iter().any(|h| h.asn == Some(asn))).collect()
    }
}

/// Runs the multipath enumeration against `host`.
pub async fn discover_paths(
    host: &str,
    trace_config: &Config,
    mp_config: &MultipathConfig,
    asn_strategy: AsnStrategy,
    cancellation: CancellationToken,
) -> Result<NetworkTopology> {
    let start = Instant::now();
    let base_id = TraceId(rand::random());

    let mut seen_fingerprints: HashSet<String> = HashSet::new();
    let mut consecutive_duplicates = 0usize;
    let mut paths = Vec::new();

    'batches: for batch_start in (0..mp_config.flow_variations).step_by(BATCH_SIZE) {
        if cancellation.is_cancelled() {
            break;
        }
        let batch_end = batch_start.saturating_add(BATCH_SIZE as u16).min(mp_config.flow_variations);
        let variations: Vec<u16> = (batch_start..batch_end).collect();

        let results = futures::future::join_all(variations.iter().map(|&variation| {
            let cancellation = cancellation.clone();
            let host = host.to_string();
            let trace_config = trace_config.clone();
            let mp_config = *mp_config;
            async move { run_one_variation(&host, &trace_config, &mp_config, base_id, variation, asn_strategy, cancellation).await }
        }))
        .await;

        for (variation, result) in variations.into_iter().zip(results) {
            let Ok(classified) = result else {
                continue;
            };
            let fp = fingerprint_key(&classified);
            let unique = seen_fingerprints.insert(fp.clone());
            if unique {
                consecutive_duplicates = 0;
            } else {
                consecutive_duplicates += 1;
            }
            paths.push(DiscoveredPath {
                flow_id: FlowIdentifier {
                    icmp_id: derive_identifier(base_id, variation),
                    variation: FlowVariation(variation),
                },
                trace: classified,
                fingerprint: fp,
                unique,
            });
            if consecutive_duplicates >= mp_config.early_stop_threshold || seen_fingerprints.len() >= mp_config.max_paths {
                break 'batches;
            }
        }
    }

    let unique_path_count = paths.iter().filter(|p| p.unique).count();
    Ok(NetworkTopology {
        destination: host.to_string(),
        paths,
        unique_path_count,
        discovery_duration: start.elapsed(),
    })
}

/// The hop-IP sequence joined by `,`, using `*` for a timed-out hop (spec
/// §4.8's path-equality definition).
fn fingerprint_key(trace: &ClassifiedTrace) -> String {
    trace
        .hops
        .iter()
        .map(|h| h.ip.map(|ip| ip.to_string()).unwrap_or_else(|| "*".to_string()))
        .join(",")
}

async fn run_one_variation(
    host: &str,
    trace_config: &Config,
    mp_config: &MultipathConfig,
    base_id: TraceId,
    variation: u16,
    asn_strategy: AsnStrategy,
    cancellation: CancellationToken,
) -> Result<ClassifiedTrace> {
    let identifier = derive_identifier(base_id, variation);
    let session = SocketSession::with_identifier(&trace_config.bind_options(), identifier)?;
    let child_config = trace_config
        .clone()
        .with_max_hops(mp_config.max_hops)
        .with_max_wait(mp_config.timeout);
    let trace_result = crate::trace::trace_with_session(host, &child_config, cancellation, session).await?;

    let ips: Vec<IpAddr> = trace_result
        .hops
        .iter()
        .filter_map(|h| h.ip)
        .chain(std::iter::once(trace_result.destination_ip))
        .collect();
    let asn_map = crate::asn::resolve(&ips, mp_config.timeout, asn_strategy).await.unwrap_or_default();

    Ok(classify(&trace_result, None, &asn_map, &HashMap::new(), None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Category;

    fn hop(ttl: u8, ip: Option<&str>) -> crate::classify::ClassifiedHop {
        crate::classify::ClassifiedHop {
            ttl: Ttl(ttl),
            ip: ip.map(|s| s.parse().unwrap()),
            rtt: ip.map(|_| Duration::from_millis(1)),
            reached_destination: false,
            hostname: None,
            asn: None,
            as_name: None,
            category: Category::Unknown,
        }
    }

    fn classified_trace(hops: Vec<crate::classify::ClassifiedHop>) -> ClassifiedTrace {
        ClassifiedTrace {
            destination: "d".to_string(),
            destination_ip: "9.9.9.9".parse().unwrap(),
            reached: false,
            hops: hops.into_iter().collect(),
            duration: Duration::from_millis(1),
            public_ip: None,
            client_asn: None,
            destination_asn: None,
        }
    }

    fn path(unique: bool, hops: Vec<crate::classify::ClassifiedHop>) -> DiscoveredPath {
        DiscoveredPath {
            flow_id: FlowIdentifier {
                icmp_id: TraceId(1),
                variation: FlowVariation(0),
            },
            trace: classified_trace(hops),
            fingerprint: String::new(),
            unique,
        }
    }

    #[test]
    fn identical_paths_collapse_to_one_unique_path_with_no_divergence() {
        let a = path(true, vec![hop(1, Some("1.1.1.1")), hop(2, Some("2.2.2.2"))]);
        let b = path(false, vec![hop(1, Some("1.1.1.1")), hop(2, Some("2.2.2.2"))]);
        let topology = NetworkTopology {
            destination: "d".to_string(),
            paths: vec![a, b],
            unique_path_count: 1,
            discovery_duration: Duration::from_millis(1),
        };
        assert_eq!(topology.unique_path_count, 1);
        assert!(topology.divergence_point().is_none());
    }

    #[test]
    fn paths_diverging_at_ttl_three_report_that_divergence_point() {
        let a = path(
            true,
            vec![hop(1, Some("1.1.1.1")), hop(2, Some("2.2.2.2")), hop(3, Some("3.3.3.3"))],
        );
        let b = path(
            true,
            vec![hop(1, Some("1.1.1.1")), hop(2, Some("2.2.2.2")), hop(3, Some("4.4.4.4"))],
        );
        let topology = NetworkTopology {
            destination: "d".to_string(),
            paths: vec![a, b],
            unique_path_count: 2,
            discovery_duration: Duration::from_millis(1),
        };
        assert_eq!(topology.divergence_point(), Some(Ttl(3)));
        assert_eq!(topology.common_prefix().len(), 2);
    }

    #[test]
    fn derive_identifier_spaces_variations_by_the_fixed_prime() {
        let base = TraceId(1000);
        assert_eq!(derive_identifier(base, 0), base);
        assert_eq!(derive_identifier(base, 1).0, 1000u16.wrapping_add(173));
        assert_eq!(derive_identifier(base, 2).0, 1000u16.wrapping_add(346));
    }

    #[test]
    fn fingerprint_uses_asterisk_for_timeouts() {
        let trace = classified_trace(vec![hop(1, Some("1.1.1.1")), hop(2, None)]);
        assert_eq!(fingerprint_key(&trace), "1.1.1.1,*");
    }
}

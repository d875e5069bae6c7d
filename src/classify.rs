//! Segment classifier: assigns each hop a network-operator
//! category, filling gaps between identically-categorized neighbors.

use crate::asn::{is_cgnat, ASNInfo};
use crate::trace::{TraceHop, TraceResult, MAX_HOPS};
use arrayvec::ArrayVec;
use itertools::Itertools;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// VPN interface name prefixes recognized by [`VpnContext::from_interface`].
pub const VPN_INTERFACE_PREFIXES: &[&str] = &["utun", "ipsec", "ppp", "tun", "tap", "wg"];

/// VPN hostname suffixes recognized by [`hostname_matches_vpn_suffix`]. A
/// leading `*.` is a cosmetic wildcard marker; matching is always performed
/// as a plain suffix check.
pub const VPN_HOSTNAME_SUFFIXES: &[&str] = &[
    ".ts.net",
    ".tailscale.com",
    ".wg.run",
    ".mullvad.net",
    ".nordvpn.com",
    ".expressvpn.com",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Category {
    Local,
    Isp,
    Transit,
    Destination,
    Vpn,
    Unknown,
}

/// The VPN context derived from a session's bound interface and/or
/// responder hostnames.
#[derive(Debug, Clone, Default)]
pub struct VpnContext {
    pub trace_interface: Option<String>,
    pub is_vpn_trace: bool,
}

impl VpnContext {
    /// Derives a context from a bound interface name, matching it against
    /// [`VPN_INTERFACE_PREFIXES`].
    #[must_use]
    pub fn from_interface(interface: Option<&str>) -> Self {
        let is_vpn_trace = interface.is_some_and(|name| VPN_INTERFACE_PREFIXES.iter().any(|p| name.starts_with(p)));
        Self {
            trace_interface: interface.map(str::to_string),
            is_vpn_trace,
        }
    }
}

#[must_use]
pub fn hostname_matches_vpn_suffix(hostname: Option<&str>) -> bool {
    hostname.is_some_and(|h| VPN_HOSTNAME_SUFFIXES.iter().any(|suffix| h.ends_with(suffix)))
}

/// `TraceHop` enriched with a best-effort ASN and a network-operator
/// category.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedHop {
    pub ttl: crate::types::Ttl,
    pub ip: Option<IpAddr>,
    pub rtt: Option<Duration>,
    pub reached_destination: bool,
    pub hostname: Option<String>,
    pub asn: Option<u32>,
    pub as_name: Option<String>,
    pub category: Category,
}

/// A classified trace.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedTrace {
    pub destination: String,
    pub destination_ip: IpAddr,
    pub reached: bool,
    pub hops: ArrayVec<ClassifiedHop, MAX_HOPS>,
    pub duration: Duration,
    pub public_ip: Option<Ipv4Addr>,
    pub client_asn: Option<u32>,
    pub destination_asn: Option<u32>,
}

/// Classifies every hop in `trace`.
#[must_use]
pub fn classify(
    trace: &TraceResult,
    public_ip: Option<Ipv4Addr>,
    asn_map: &HashMap<IpAddr, ASNInfo>,
    hostnames: &HashMap<IpAddr, String>,
    vpn: Option<&VpnContext>,
) -> ClassifiedTrace {
    let client_asn = public_ip.and_then(|ip| asn_map.get(&IpAddr::V4(ip))).map(|i| i.asn);
    let destination_asn = asn_map.get(&trace.destination_ip).map(|i| i.asn);

    let mut seen_public = false;
    let mut in_vpn_region = false;
    let mut hops: ArrayVec<ClassifiedHop, MAX_HOPS> = ArrayVec::new();

    for hop in &trace.hops {
        hops.push(classify_one_hop(
            hop,
            asn_map,
            hostnames,
            client_asn,
            destination_asn,
            &mut seen_public,
            &mut in_vpn_region,
            vpn,
        ));
    }

    fill_holes(&mut hops);

    ClassifiedTrace {
        destination: trace.destination.clone(),
        destination_ip: trace.destination_ip,
        reached: trace.reached,
        hops,
        duration: trace.duration,
        public_ip,
        client_asn,
        destination_asn,
    }
}

#[allow(clippy::too_many_arguments)]
fn classify_one_hop(
    hop: &TraceHop,
    asn_map: &HashMap<IpAddr, ASNInfo>,
    hostnames: &HashMap<IpAddr, String>,
    client_asn: Option<u32>,
    destination_asn: Option<u32>,
    seen_public: &mut bool,
    in_vpn_region: &mut bool,
    vpn: Option<&VpnContext>,
) -> ClassifiedHop {
    let Some(ip) = hop.ip else {
        return ClassifiedHop {
            ttl: hop.ttl,
            ip: None,
            rtt: hop.rtt,
            reached_destination: hop.reached_destination,
            hostname: None,
            asn: None,
            as_name: None,
            category: Category::Unknown,
        };
    };

    let info = asn_map.get(&ip);
    let hostname = hostnames.get(&ip).cloned().or_else(|| hop.hostname.clone());

    let (base_category, base_asn) = match ip {
        IpAddr::V4(v4) if is_cgnat(v4) => (Category::Isp, info.map(|i| i.asn)),
        IpAddr::V4(v4) if v4.is_private() => {
            let category = if *seen_public { Category::Isp } else { Category::Local };
            (category, info.map(|i| i.asn))
        }
        IpAddr::V4(_) => {
            *seen_public = true;
            match info {
                Some(i) if Some(i.asn) == client_asn => (Category::Isp, Some(i.asn)),
                Some(i) if Some(i.asn) == destination_asn => (Category::Destination, Some(i.asn)),
                Some(i) => (Category::Transit, Some(i.asn)),
                None => (Category::Transit, None),
            }
        }
        IpAddr::V6(_) => (Category::Unknown, None),
    };

    let (category, asn) = if vpn.is_some_and(|v| v.is_vpn_trace) {
        if hop.reached_destination {
            (Category::Destination, base_asn)
        } else if hostname_matches_vpn_suffix(hostname.as_deref()) {
            *in_vpn_region = true;
            (Category::Vpn, base_asn)
        } else if *in_vpn_region {
            (Category::Vpn, base_asn)
        } else {
            (base_category, base_asn)
        }
    } else {
        (base_category, base_asn)
    };

    ClassifiedHop {
        ttl: hop.ttl,
        ip: Some(ip),
        rtt: hop.rtt,
        reached_destination: hop.reached_destination,
        hostname,
        asn,
        as_name: info.map(|i| i.name.clone()),
        category,
    }
}

/// Fills maximal runs of `UNKNOWN` hops (missing `ip`) flanked by
/// identically-categorized neighbors with that category.
fn fill_holes(hops: &mut [ClassifiedHop]) {
    let n = hops.len();
    let runs: Vec<(usize, usize)> = hops
        .iter()
        .enumerate()
        .group_by(|(_, h)| h.ip.is_none())
        .into_iter()
        .filter(|(is_unknown, _)| *is_unknown)
        .map(|(_, group)| {
            let idxs: Vec<usize> = group.map(|(i, _)| i).collect();
            (idxs[0], idxs[idxs.len() - 1] + 1)
        })
        .collect();

    for (start, end) in runs {
        if start == 0 || end >= n {
            continue;
        }
        let prev = hops[start - 1].clone();
        let next = hops[end].clone();
        if prev.category != next.category {
            continue;
        }
        let same_asn = prev.asn.is_some() && prev.asn == next.asn;
        let asn = same_asn.then_some(prev.asn).flatten();
        let as_name = if same_asn { prev.as_name.clone() } else { None };
        for hop in &mut hops[start..end] {
            hop.category = prev.category;
            hop.asn = asn;
            hop.as_name = as_name.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Ttl;
    use test_case::test_case;

    fn hop(ttl: u8, ip: Option<&str>, reached: bool) -> TraceHop {
        TraceHop {
            ttl: Ttl(ttl),
            ip: ip.map(|s| s.parse().unwrap()),
            rtt: ip.map(|_| Duration::from_millis(1)),
            reached_destination: reached,
            hostname: None,
        }
    }

    fn asn(n: u32, name: &str) -> ASNInfo {
        ASNInfo {
            asn: n,
            name: name.to_string(),
            prefix: None,
            country: None,
            registry: None,
        }
    }

    #[test]
    fn synthetic_classification_scenario() {
        let hops: ArrayVec<TraceHop, MAX_HOPS> = [
            hop(1, Some("192.168.1.1"), false),
            hop(2, Some("100.64.0.5"), false),
            hop(3, Some("203.0.113.10"), false),
            hop(4, None, false),
            hop(5, Some("93.184.216.34"), true),
        ]
        .into_iter()
        .collect();
        let trace = TraceResult {
            destination: "example.com".to_string(),
            destination_ip: "93.184.216.34".parse().unwrap(),
            reached: true,
            hops,
            duration: Duration::from_millis(20),
        };
        let mut map = HashMap::new();
        map.insert("203.0.113.10".parse().unwrap(), asn(64500, "TransitNet"));
        map.insert("93.184.216.34".parse().unwrap(), asn(15133, "ExampleNet"));
        map.insert("198.51.100.50".parse().unwrap(), asn(64501, "ISPNet"));

        let classified = classify(&trace, Some("198.51.100.50".parse().unwrap()), &map, &HashMap::new(), None);

        let categories: Vec<Category> = classified.hops.iter().map(|h| h.category).collect();
        assert_eq!(
            categories,
            vec![
                Category::Local,
                Category::Isp,
                Category::Transit,
                Category::Transit,
                Category::Destination,
            ]
        );
        assert_eq!(classified.client_asn, Some(64501));
        assert_eq!(classified.destination_asn, Some(15133));
    }

    #[test_case(64500, 64500, Some(64500) ; "identical neighbor ASNs fill the hole with that ASN")]
    #[test_case(64500, 64501, None ; "mismatched neighbor ASNs drop the ASN but keep the category")]
    fn hole_fill_between_two_transit_neighbors(first_asn: u32, second_asn: u32, expected_filled_asn: Option<u32>) {
        let hops: ArrayVec<TraceHop, MAX_HOPS> = [
            hop(1, Some("203.0.113.1"), false),
            hop(2, None, false),
            hop(3, Some("203.0.113.2"), false),
        ]
        .into_iter()
        .collect();
        let trace = TraceResult {
            destination: "d".to_string(),
            destination_ip: "9.9.9.9".parse().unwrap(),
            reached: false,
            hops,
            duration: Duration::from_millis(1),
        };
        let mut map = HashMap::new();
        map.insert("203.0.113.1".parse().unwrap(), asn(first_asn, "FirstNet"));
        map.insert("203.0.113.2".parse().unwrap(), asn(second_asn, "SecondNet"));
        let classified = classify(&trace, None, &map, &HashMap::new(), None);
        assert_eq!(classified.hops[1].category, Category::Transit);
        assert_eq!(classified.hops[1].asn, expected_filled_asn);
    }

    #[test]
    fn vpn_classification_scenario() {
        let hops: ArrayVec<TraceHop, MAX_HOPS> = [
            hop(1, Some("10.35.0.1"), false),
            hop(2, Some("100.120.205.29"), false),
            hop(3, Some("192.168.1.1"), false),
            hop(4, Some("157.131.132.109"), false),
            hop(5, Some("1.1.1.1"), true),
        ]
        .into_iter()
        .collect();
        let mut trace = TraceResult {
            destination: "1.1.1.1".to_string(),
            destination_ip: "1.1.1.1".parse().unwrap(),
            reached: true,
            hops,
            duration: Duration::from_millis(50),
        };
        let mut hostnames = HashMap::new();
        hostnames.insert("100.120.205.29".parse().unwrap(), "peer.ts.net".to_string());
        hostnames.insert("192.168.1.1".parse().unwrap(), "unifi.localdomain".to_string());
        hostnames.insert("157.131.132.109".parse().unwrap(), "isp-edge.example.net".to_string());
        for h in &mut trace.hops {
            h.hostname = hostnames.get(&h.ip.unwrap()).cloned();
        }

        let vpn = VpnContext::from_interface(Some("utun15"));
        assert!(vpn.is_vpn_trace);
        let classified = classify(&trace, None, &HashMap::new(), &hostnames, Some(&vpn));

        let categories: Vec<Category> = classified.hops.iter().map(|h| h.category).collect();
        assert_eq!(
            categories,
            vec![
                Category::Local,
                Category::Vpn,
                Category::Vpn,
                Category::Vpn,
                Category::Destination,
            ]
        );
    }

    #[test]
    fn non_vpn_interface_name_does_not_trigger_vpn_context() {
        let vpn = VpnContext::from_interface(Some("eth0"));
        assert!(!vpn.is_vpn_trace);
    }

    #[test]
    fn vpn_hostname_suffix_matching_is_case_sensitive_plain_suffix() {
        assert!(hostname_matches_vpn_suffix(Some("host.tailscale.com")));
        assert!(hostname_matches_vpn_suffix(Some("peer.ts.net")));
        assert!(!hostname_matches_vpn_suffix(Some("example.com")));
        assert!(!hostname_matches_vpn_suffix(None));
    }
}

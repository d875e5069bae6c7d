//! Exercises the traceroute-result-to-classified-trace pipeline entirely
//! through the crate's public surface, without touching a socket: builds a
//! synthetic `TraceResult` the way a completed `trace()` call would, then
//! runs it through ASN lookup and classification exactly as `Engine::classify`
//! does internally.

use pathprobe::asn::ASNInfo;
use pathprobe::classify::{classify, Category, VpnContext};
use pathprobe::trace::{TraceHop, TraceResult};
use pathprobe::types::Ttl;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

fn hop(ttl: u8, ip: Option<&str>, reached: bool) -> TraceHop {
    TraceHop {
        ttl: Ttl(ttl),
        ip: ip.map(|s| s.parse().unwrap()),
        rtt: ip.map(|_| Duration::from_millis(1)),
        reached_destination: reached,
        hostname: None,
    }
}

fn asn_info(n: u32, name: &str) -> ASNInfo {
    ASNInfo {
        asn: n,
        name: name.to_string(),
        prefix: None,
        country: None,
        registry: None,
    }
}

#[test]
fn a_trace_result_classifies_through_the_public_api() {
    let hops: Vec<TraceHop> = vec![
        hop(1, Some("192.168.1.1"), false),
        hop(2, Some("100.64.0.5"), false),
        hop(3, Some("203.0.113.10"), false),
        hop(4, None, false),
        hop(5, Some("93.184.216.34"), true),
    ];
    let trace = TraceResult {
        destination: "example.com".to_string(),
        destination_ip: "93.184.216.34".parse().unwrap(),
        reached: true,
        hops: hops.into_iter().collect(),
        duration: Duration::from_millis(20),
    };

    let mut asn_map: HashMap<IpAddr, ASNInfo> = HashMap::new();
    asn_map.insert("203.0.113.10".parse().unwrap(), asn_info(64500, "TransitNet"));
    asn_map.insert("93.184.216.34".parse().unwrap(), asn_info(15133, "ExampleNet"));
    asn_map.insert("198.51.100.50".parse().unwrap(), asn_info(64501, "ISPNet"));

    let classified = classify(&trace, Some("198.51.100.50".parse().unwrap()), &asn_map, &HashMap::new(), None);

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
    assert!(classified.reached);
    assert_eq!(classified.client_asn, Some(64501));
    assert_eq!(classified.destination_asn, Some(15133));
}

#[test]
fn a_vpn_interface_forces_vpn_categorization_between_local_and_destination() {
    let hops: Vec<TraceHop> = vec![
        hop(1, Some("10.35.0.1"), false),
        hop(2, Some("100.120.205.29"), false),
        hop(3, Some("1.1.1.1"), true),
    ];
    let mut trace = TraceResult {
        destination: "1.1.1.1".to_string(),
        destination_ip: "1.1.1.1".parse().unwrap(),
        reached: true,
        hops: hops.into_iter().collect(),
        duration: Duration::from_millis(30),
    };
    for h in &mut trace.hops {
        if h.ip == Some("100.120.205.29".parse().unwrap()) {
            h.hostname = Some("peer.ts.net".to_string());
        }
    }

    let vpn = VpnContext::from_interface(Some("utun15"));
    let classified = classify(&trace, None, &HashMap::new(), &HashMap::new(), Some(&vpn));

    let categories: Vec<Category> = classified.hops.iter().map(|h| h.category).collect();
    assert_eq!(categories, vec![Category::Local, Category::Vpn, Category::Destination]);
}

//! ASN resolver and cache: batch IP-to-ASN resolution over two
//! interchangeable back-ends (DNS-TXT WHOIS and an embedded prefix
//! database), memoized process-wide.

mod cache;
mod dns;
mod embedded;

pub use cache::AsnCache;

use crate::config::AsnStrategy;
use crate::error::Result;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Autonomous system information for one IP. `asn = 0`
/// is reserved for synthetic entries (private/CGNAT addresses that the
/// classifier needs an ASN-shaped placeholder for but that no registry
/// assigns).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ASNInfo {
    pub asn: u32,
    pub name: String,
    pub prefix: Option<String>,
    pub country: Option<String>,
    pub registry: Option<String>,
}

/// Resolves ASN information for `ips` using `strategy`, after filtering to
/// public IPv4 addresses.
pub async fn resolve(
    ips: &[IpAddr],
    timeout: Duration,
    strategy: AsnStrategy,
) -> Result<HashMap<IpAddr, ASNInfo>> {
    let public: Vec<Ipv4Addr> = ips
        .iter()
        .copied()
        .filter_map(|ip| match ip {
            IpAddr::V4(v4) if is_public_ipv4(v4) => Some(v4),
            _ => None,
        })
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    if public.is_empty() {
        return Ok(HashMap::new());
    }

    let map = match strategy {
        AsnStrategy::Dns => dns::resolve_many(&public, timeout).await?,
        AsnStrategy::Embedded => embedded::resolve_many(&public)?,
        AsnStrategy::Hybrid => {
            let mut found = embedded::resolve_many(&public)?;
            let missing: Vec<Ipv4Addr> = public.iter().copied().filter(|ip| !found.contains_key(ip)).collect();
            if !missing.is_empty() {
                let from_dns = dns::resolve_many(&missing, timeout).await?;
                found.extend(from_dns);
            }
            found
        }
    };

    Ok(map.into_iter().map(|(ip, info)| (IpAddr::V4(ip), info)).collect())
}

/// Whether `ip` is a publicly-routable IPv4 address, excluding private
/// (10/8, 172.16/12, 192.168/16, 169.254/16), CGNAT (100.64/10), loopback,
/// and multicast ranges.
#[must_use]
pub fn is_public_ipv4(ip: Ipv4Addr) -> bool {
    !(ip.is_private() || ip.is_loopback() || ip.is_multicast() || ip.is_link_local() || is_cgnat(ip))
}

/// `100.64.0.0/10`: carrier-grade NAT shared address space.
#[must_use]
pub fn is_cgnat(ip: Ipv4Addr) -> bool {
    let o = ip.octets();
    o[0] == 100 && (64..=127).contains(&o[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cgnat_range_is_detected() {
        assert!(is_cgnat(Ipv4Addr::new(100, 64, 0, 5)));
        assert!(is_cgnat(Ipv4Addr::new(100, 127, 255, 255)));
        assert!(!is_cgnat(Ipv4Addr::new(100, 63, 0, 1)));
        assert!(!is_cgnat(Ipv4Addr::new(100, 128, 0, 1)));
    }

    #[test]
    fn public_ipv4_excludes_private_and_cgnat_and_loopback() {
        assert!(!is_public_ipv4(Ipv4Addr::new(192, 168, 1, 1)));
        assert!(!is_public_ipv4(Ipv4Addr::new(100, 64, 0, 5)));
        assert!(!is_public_ipv4(Ipv4Addr::new(127, 0, 0, 1)));
        assert!(!is_public_ipv4(Ipv4Addr::new(169, 254, 1, 1)));
        assert!(!is_public_ipv4(Ipv4Addr::new(224, 0, 0, 1)));
        assert!(is_public_ipv4(Ipv4Addr::new(93, 184, 216, 34)));
    }
}

//! WHOIS-over-DNS TXT back-end: per-IP reversed-octet query
//! against `origin.asn.cymru.com`, then one deduplicated AS-name query per
//! distinct ASN observed.

use super::ASNInfo;
use crate::error::{Error, Result};
use futures::future::join_all;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

const ORIGIN_ZONE: &str = "origin.asn.cymru.com";
const ASN_ZONE: &str = "asn.cymru.com";

pub(super) async fn resolve_many(ips: &[Ipv4Addr], timeout: Duration) -> Result<HashMap<Ipv4Addr, ASNInfo>> {
    if ips.is_empty() {
        return Ok(HashMap::new());
    }

    let mut opts = ResolverOpts::default();
    opts.timeout = timeout;
    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), opts).map_err(|source| {
        Error::ASNResolverFailed {
            details: Some(format!("failed to construct resolver: {source}")),
        }
    })?;

    let origin_lookups = join_all(ips.iter().map(|ip| lookup_origin(&resolver, *ip))).await;

    let mut by_ip: HashMap<Ipv4Addr, (u32, Option<String>, Option<String>, Option<String>)> = HashMap::new();
    for (ip, origin) in ips.iter().zip(origin_lookups) {
        if let Some(parsed) = origin {
            by_ip.insert(*ip, parsed);
        }
    }

    let distinct_asns: Vec<u32> = by_ip
        .values()
        .map(|(asn, ..)| *asn)
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    let name_lookups = join_all(distinct_asns.iter().map(|asn| lookup_as_name(&resolver, *asn))).await;
    let names: HashMap<u32, String> = distinct_asns.into_iter().zip(name_lookups).filter_map(|(asn, name)| name.map(|n| (asn, n))).collect();

    Ok(by_ip
        .into_iter()
        .map(|(ip, (asn, prefix, country, registry))| {
            let name = names.get(&asn).cloned().unwrap_or_else(|| format!("AS{asn}"));
            (
                ip,
                ASNInfo {
                    asn,
                    name,
                    prefix,
                    country,
                    registry,
                },
            )
        })
        .collect())
}

async fn lookup_origin(
    resolver: &TokioAsyncResolver,
    ip: Ipv4Addr,
) -> Option<(u32, Option<String>, Option<String>, Option<String>)> {
    let octets = ip.octets();
    let name = format!("{}.{}.{}.{}.{ORIGIN_ZONE}", octets[3], octets[2], octets[1], octets[0]);
    let lookup = resolver.txt_lookup(name).await.ok()?;
    let record = lookup.iter().next()?;
    parse_origin_txt(&record.to_string())
}

async fn lookup_as_name(resolver: &TokioAsyncResolver, asn: u32) -> Option<String> {
    let name = format!("AS{asn}.{ASN_ZONE}");
    let lookup = resolver.txt_lookup(name).await.ok()?;
    let record = lookup.iter().next()?;
    parse_as_name_txt(&record.to_string())
}

/// Parses `"ASN | prefix | country | registry | allocated"`, tolerating
/// surrounding whitespace around each `|`-separated field.
fn parse_origin_txt(txt: &str) -> Option<(u32, Option<String>, Option<String>, Option<String>)> {
    let fields: Vec<&str> = txt.split('|').map(str::trim).collect();
    let asn = fields.first()?.split(' ').next()?.parse().ok()?;
    let prefix = fields.get(1).filter(|s| !s.is_empty()).map(|s| s.to_string());
    let country = fields.get(2).filter(|s| !s.is_empty()).map(|s| s.to_string());
    let registry = fields.get(3).filter(|s| !s.is_empty()).map(|s| s.to_string());
    Some((asn, prefix, country, registry))
}

/// Parses `"ASN | CC | Registry | Allocated | AS Name"`, taking the final
/// field as the human-readable AS name.
fn parse_as_name_txt(txt: &str) -> Option<String> {
    let fields: Vec<&str> = txt.split('|').map(str::trim).collect();
    fields.last().filter(|s| !s.is_empty()).map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_origin_record() {
        let got = parse_origin_txt("15133 | 93.184.216.0/24 | US | arin | 2008-06-02").unwrap();
        assert_eq!(got.0, 15133);
        assert_eq!(got.1.as_deref(), Some("93.184.216.0/24"));
        assert_eq!(got.2.as_deref(), Some("US"));
        assert_eq!(got.3.as_deref(), Some("arin"));
    }

    #[test]
    fn parses_an_as_name_record() {
        let got = parse_as_name_txt("15133 | US | arin | 2008-06-02 | EDGECAST, US").unwrap();
        assert_eq!(got, "EDGECAST, US");
    }

    #[test]
    fn malformed_origin_record_fails_gracefully() {
        assert!(parse_origin_txt("not a cymru record").is_none());
    }
}

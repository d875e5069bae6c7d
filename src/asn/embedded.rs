//! Embedded prefix-database back-end: an offline, file-backed
//! IPv4-to-ASN table loaded once and memory-mapped, using `maxminddb`
//! rather than hand-rolling a prefix trie.

use super::ASNInfo;
use crate::error::Result;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::OnceLock;

static DATABASE: OnceLock<Option<maxminddb::Reader<Vec<u8>>>> = OnceLock::new();

/// The path of the embedded GeoLite2-ASN-style database. Overridable for
/// environments that ship their own copy; absence is not an error, it just
/// means the embedded back-end resolves nothing.
fn database_path() -> PathBuf {
    std::env::var_os("PATHPROBE_ASN_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("GeoLite2-ASN.mmdb"))
}

fn database() -> &'static Option<maxminddb::Reader<Vec<u8>>> {
    DATABASE.get_or_init(|| maxminddb::Reader::open_readfile(database_path()).ok())
}

#[derive(serde::Deserialize)]
struct AsnRecord<'a> {
    autonomous_system_number: Option<u32>,
    #[serde(borrow)]
    autonomous_system_organization: Option<&'a str>,
}

pub(super) fn resolve_many(ips: &[Ipv4Addr]) -> Result<HashMap<Ipv4Addr, ASNInfo>> {
    let Some(reader) = database() else {
        return Ok(HashMap::new());
    };

    let mut out = HashMap::new();
    for ip in ips {
        let lookup: std::result::Result<AsnRecord, _> = reader.lookup(IpAddr::V4(*ip));
        if let Ok(record) = lookup {
            if let Some(asn) = record.autonomous_system_number {
                out.insert(
                    *ip,
                    ASNInfo {
                        asn,
                        name: record
                            .autonomous_system_organization
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("AS{asn}")),
                        prefix: None,
                        country: None,
                        registry: None,
                    },
                );
            }
        }
    }
    Ok(out)
}

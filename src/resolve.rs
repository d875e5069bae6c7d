//! Address resolution: numeric-first IPv4 parse, falling back to
//! name resolution restricted to IPv4.
//!
//! `std::net::ToSocketAddrs` blocks the calling thread, so name resolution
//! is pushed onto `tokio::task::spawn_blocking` here rather than run inline,
//! to avoid stalling the async reactor the rest of the crate relies on.

use crate::error::{Error, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// The outcome of resolving a user-supplied host string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub socket_addr: SocketAddr,
    /// The input string, when it was not itself a numeric address --
    /// `None` when the caller already passed a dotted-quad.
    pub canonical_name: Option<String>,
}

impl ResolvedAddress {
    #[must_use]
    pub fn ip(&self) -> Ipv4Addr {
        match self.socket_addr.ip() {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => unreachable!("resolution is restricted to IPv4"),
        }
    }
}

/// Resolves `host` to an IPv4 address. Numeric input is parsed directly and
/// never touches DNS; anything else is resolved by name, restricted to
/// IPv4, taking the first address returned.
pub async fn resolve(host: &str) -> Result<ResolvedAddress> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ResolvedAddress {
            socket_addr: SocketAddr::new(IpAddr::V4(ip), 0),
            canonical_name: None,
        });
    }

    let owned = host.to_string();
    let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_host(&owned))
        .await
        .map_err(|source| Error::ResolutionFailed {
            host: host.to_string(),
            details: Some(format!("name resolution task panicked: {source}")),
        })?
        .map_err(|source| Error::ResolutionFailed {
            host: host.to_string(),
            details: Some(source.to_string()),
        })?;

    let ipv4 = lookup
        .into_iter()
        .find_map(|addr| match addr {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| Error::ResolutionFailed {
            host: host.to_string(),
            details: Some("host resolved but no IPv4 address was returned".to_string()),
        })?;

    Ok(ResolvedAddress {
        socket_addr: SocketAddr::new(IpAddr::V4(ipv4), 0),
        canonical_name: Some(host.to_string()),
    })
}

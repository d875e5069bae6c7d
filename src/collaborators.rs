//! Narrow external-collaborator traits: reverse-DNS resolution,
//! STUN public-IP discovery, and bulk load generation for bufferbloat are
//! all explicitly out of scope for this crate's core. Callers inject an
//! implementation; the `Null*` types below are the defaults used when a
//! capability isn't wired up, and the substrate the integration tests run
//! against.

use crate::socket::BindOptions;
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Resolves an IP to a hostname. Consumed by the segment classifier
/// and the rDNS cache.
#[async_trait]
pub trait ReverseResolver: Send + Sync {
    async fn reverse_lookup(&self, ip: IpAddr) -> Option<String>;
}

/// Discovers this host's public IPv4 address via STUN. Consumed by the
/// segment classifier when no explicit `public_ip` override is configured.
#[async_trait]
pub trait PublicIpDiscovery: Send + Sync {
    async fn discover_public_ip(&self, opts: BindOptions, timeout: Duration) -> Option<Ipv4Addr>;
}

/// Which direction a bufferbloat load phase should saturate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadDirection {
    Upload,
    Download,
    Bidirectional,
}

/// Generates bulk HTTP upload/download traffic during a bufferbloat load
/// phase. The orchestrator only calls this; it never owns or
/// manages the underlying transfer itself.
#[async_trait]
pub trait LoadGenerator: Send + Sync {
    async fn generate_load(&self, direction: LoadDirection, streams: u8, duration: Duration);
}

/// Always returns `None`: embedding without reverse-DNS capability.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReverseResolver;

#[async_trait]
impl ReverseResolver for NullReverseResolver {
    async fn reverse_lookup(&self, _ip: IpAddr) -> Option<String> {
        None
    }
}

/// Always returns `None`: embedding without STUN capability.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPublicIpDiscovery;

#[async_trait]
impl PublicIpDiscovery for NullPublicIpDiscovery {
    async fn discover_public_ip(&self, _opts: BindOptions, _timeout: Duration) -> Option<Ipv4Addr> {
        None
    }
}

/// Does nothing for the configured duration: embedding without a bulk
/// transfer capability. Bufferbloat results from this generator measure
/// only the idle-network baseline twice.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLoadGenerator;

#[async_trait]
impl LoadGenerator for NullLoadGenerator {
    async fn generate_load(&self, _direction: LoadDirection, _streams: u8, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_reverse_resolver_always_misses() {
        let resolver = NullReverseResolver;
        assert!(resolver.reverse_lookup("1.1.1.1".parse().unwrap()).await.is_none());
    }

    #[tokio::test]
    async fn null_public_ip_discovery_always_misses() {
        let discovery = NullPublicIpDiscovery;
        assert!(discovery
            .discover_public_ip(BindOptions::default(), Duration::from_millis(1))
            .await
            .is_none());
    }
}

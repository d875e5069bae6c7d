//! Engine configuration: a single immutable `Config`, validated at
//! construction rather than left to panic deep inside a diagnostic call.
//!
//! Since this crate has no CLI preflight of its own, per-field validation
//! (`validate_ttl`, `validate_packet_size`, ...) runs inside [`Config::new`]
//! and returns [`Error::InvalidConfiguration`] instead of exiting the
//! process.

use crate::error::{Error, Result};
use crate::socket::MAX_PACKET_SIZE;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Which back-end the ASN resolver should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsnStrategy {
    Dns,
    Embedded,
    Hybrid,
}

#[derive(Debug, Clone)]
pub struct Config {
    max_hops: u8,
    max_wait: Duration,
    payload_size: usize,
    public_ip: Option<Ipv4Addr>,
    interface: Option<String>,
    source_ipv4: Option<Ipv4Addr>,
    rdns_enabled: bool,
    rdns_ttl: Duration,
    rdns_cache_size: usize,
    asn_strategy: AsnStrategy,
}

impl Config {
    /// Builds a validated configuration. Fails with
    /// [`Error::InvalidConfiguration`] when `max_hops` is zero or `payload_size`
    /// does not fit in one ICMP datagram.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        max_hops: u8,
        max_wait: Duration,
        payload_size: usize,
        public_ip: Option<Ipv4Addr>,
        interface: Option<String>,
        source_ipv4: Option<Ipv4Addr>,
        rdns_enabled: bool,
        rdns_ttl: Duration,
        rdns_cache_size: usize,
        asn_strategy: AsnStrategy,
    ) -> Result<Self> {
        if max_hops == 0 {
            return Err(Error::InvalidConfiguration {
                reason: "max_hops must be at least 1".to_string(),
            });
        }
        if payload_size > MAX_PACKET_SIZE - 8 {
            return Err(Error::InvalidConfiguration {
                reason: format!(
                    "payload_size {payload_size} does not fit in one ICMP datagram (max {})",
                    MAX_PACKET_SIZE - 8
                ),
            });
        }
        Ok(Self {
            max_hops,
            max_wait,
            payload_size,
            public_ip,
            interface,
            source_ipv4,
            rdns_enabled,
            rdns_ttl,
            rdns_cache_size,
            asn_strategy,
        })
    }

    /// A configuration with sane defaults, overridable with the `with_*`
    /// builders below.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            max_hops: 30,
            max_wait: Duration::from_secs(3),
            payload_size: 0,
            public_ip: None,
            interface: None,
            source_ipv4: None,
            rdns_enabled: true,
            rdns_ttl: Duration::from_secs(300),
            rdns_cache_size: 1024,
            asn_strategy: AsnStrategy::Hybrid,
        }
    }

    #[must_use]
    pub fn with_max_hops(mut self, max_hops: u8) -> Self {
        self.max_hops = max_hops;
        self
    }

    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    #[must_use]
    pub fn with_payload_size(mut self, payload_size: usize) -> Self {
        self.payload_size = payload_size;
        self
    }

    #[must_use]
    pub fn with_interface(mut self, interface: Option<String>) -> Self {
        self.interface = interface;
        self
    }

    #[must_use]
    pub fn with_source_ipv4(mut self, source_ipv4: Option<Ipv4Addr>) -> Self {
        self.source_ipv4 = source_ipv4;
        self
    }

    #[must_use]
    pub fn with_rdns_enabled(mut self, enabled: bool) -> Self {
        self.rdns_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_asn_strategy(mut self, strategy: AsnStrategy) -> Self {
        self.asn_strategy = strategy;
        self
    }

    /// Re-validates after builder mutation. Called by the engine before a
    /// `Config` is accepted.
    pub fn validate(&self) -> Result<()> {
        if self.max_hops == 0 {
            return Err(Error::InvalidConfiguration {
                reason: "max_hops must be at least 1".to_string(),
            });
        }
        if self.payload_size > MAX_PACKET_SIZE - 8 {
            return Err(Error::InvalidConfiguration {
                reason: format!(
                    "payload_size {} does not fit in one ICMP datagram (max {})",
                    self.payload_size,
                    MAX_PACKET_SIZE - 8
                ),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn max_hops(&self) -> u8 {
        self.max_hops
    }

    #[must_use]
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    #[must_use]
    pub fn public_ip(&self) -> Option<Ipv4Addr> {
        self.public_ip
    }

    #[must_use]
    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    #[must_use]
    pub fn source_ipv4(&self) -> Option<Ipv4Addr> {
        self.source_ipv4
    }

    #[must_use]
    pub fn rdns_enabled(&self) -> bool {
        self.rdns_enabled
    }

    #[must_use]
    pub fn rdns_ttl(&self) -> Duration {
        self.rdns_ttl
    }

    #[must_use]
    pub fn rdns_cache_size(&self) -> usize {
        self.rdns_cache_size
    }

    #[must_use]
    pub fn asn_strategy(&self) -> AsnStrategy {
        self.asn_strategy
    }

    #[must_use]
    pub fn bind_options(&self) -> crate::socket::BindOptions {
        crate::socket::BindOptions {
            interface: self.interface.clone(),
            source_ipv4: self.source_ipv4,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_max_hops_is_rejected() {
        let err = Config::defaults().with_max_hops(0).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration { .. }));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let err = Config::defaults().with_payload_size(4096).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration { .. }));
    }

    #[test]
    fn defaults_validate_cleanly() {
        assert!(Config::defaults().validate().is_ok());
    }
}

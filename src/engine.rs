//! The top-level engine: ties a validated [`Config`] together with
//! the process-wide ASN and rDNS caches and the injected collaborators, and
//! exposes every diagnostic operation as a method so a caller only has to
//! construct one object.

use crate::asn::{self, AsnCache};
use crate::bufferbloat::{self, BufferbloatConfig, BufferbloatResult};
use crate::classify::{self, ClassifiedTrace, VpnContext};
use crate::collaborators::{LoadGenerator, NullLoadGenerator, NullPublicIpDiscovery, NullReverseResolver, PublicIpDiscovery, ReverseResolver};
use crate::config::Config;
use crate::error::Result;
use crate::multipath::{self, MultipathConfig, NetworkTopology};
use crate::ping::{self, PingConfig, PingResult};
use crate::rdns::{self, RdnsCache};
use crate::trace::{self, HopEvent, StreamOptions, TraceResult};
use parking_lot::Mutex;
use tokio_stream::Stream;
use std::collections::HashMap;
use std::net::IpAddr;
use tokio_util::sync::CancellationToken;

/// A validated configuration plus its caches and collaborators. Cheap to clone-share across tasks via `Arc` if a
/// caller needs that; internally everything it owns is already `Sync`.
pub struct Engine {
    config: Config,
    asn_cache: AsnCache,
    rdns_cache: RdnsCache,
    reverse_resolver: Box<dyn ReverseResolver>,
    public_ip_discovery: Box<dyn PublicIpDiscovery>,
    load_generator: Box<dyn LoadGenerator>,
    root_cancellation: Mutex<CancellationToken>,
}

impl Engine {
    /// Builds an engine with the given collaborators, validating `config`
    /// first.
    pub fn new(
        config: Config,
        reverse_resolver: Box<dyn ReverseResolver>,
        public_ip_discovery: Box<dyn PublicIpDiscovery>,
        load_generator: Box<dyn LoadGenerator>,
    ) -> Result<Self> {
        config.validate()?;
        let rdns_cache = RdnsCache::new(config.rdns_cache_size(), config.rdns_ttl());
        Ok(Self {
            config,
            asn_cache: AsnCache::new(),
            rdns_cache,
            reverse_resolver,
            public_ip_discovery,
            load_generator,
            root_cancellation: Mutex::new(CancellationToken::new()),
        })
    }

    /// Builds an engine with no wired-up rDNS, STUN, or load-generation
    /// capability.
    pub fn with_defaults(config: Config) -> Result<Self> {
        Self::new(
            config,
            Box::new(NullReverseResolver),
            Box::new(NullPublicIpDiscovery),
            Box::new(NullLoadGenerator),
        )
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn child_cancellation(&self) -> CancellationToken {
        self.root_cancellation.lock().child_token()
    }

    /// Cancels every in-flight operation spawned from this engine and
    /// invalidates the ASN and rDNS caches.
    /// Operations started after this call are unaffected: the root token is
    /// replaced, not just cancelled.
    pub fn network_changed(&self) {
        let mut root = self.root_cancellation.lock();
        root.cancel();
        *root = CancellationToken::new();
        self.asn_cache.clear();
        self.rdns_cache.clear();
    }

    /// Batched traceroute.
    pub async fn trace(&self, host: &str) -> Result<TraceResult> {
        trace::trace(host, &self.config, self.child_cancellation()).await
    }

    /// Streaming traceroute.
    pub async fn trace_stream(&self, host: &str, options: StreamOptions) -> Result<impl Stream<Item = HopEvent>> {
        trace::trace_stream(host, &self.config, options, self.child_cancellation()).await
    }

    /// Ping session.
    pub async fn ping(&self, host: &str, config: &PingConfig) -> Result<PingResult> {
        ping::ping(host, config, &self.config.bind_options(), self.child_cancellation()).await
    }

    /// Runs a batched traceroute and classifies every hop, resolving ASN and reverse-DNS information through this
    /// engine's caches and discovering the public IP via the injected
    /// collaborator unless [`Config::public_ip`] already names one.
    pub async fn classify(&self, host: &str) -> Result<ClassifiedTrace> {
        let trace_result = self.trace(host).await?;

        let mut ips: Vec<IpAddr> = trace_result.hops.iter().filter_map(|h| h.ip).collect();
        ips.push(trace_result.destination_ip);

        let public_ip = match self.config.public_ip() {
            Some(ip) => Some(ip),
            None => {
                let discovered = self
                    .public_ip_discovery
                    .discover_public_ip(self.config.bind_options(), self.config.max_wait())
                    .await;
                if discovered.is_none() {
                    tracing::warn!("STUN public IP discovery unavailable, classifying without a client ASN (auxiliary-information downgrade)");
                }
                discovered
            }
        };
        if let Some(ip) = public_ip {
            ips.push(std::net::IpAddr::V4(ip));
        }

        let asn_map = self.resolve_asn_cached(&ips).await;

        let hostnames = if self.config.rdns_enabled() {
            rdns::resolve_hostnames(&ips, &self.rdns_cache, self.reverse_resolver.as_ref()).await
        } else {
            HashMap::new()
        };

        let vpn = VpnContext::from_interface(self.config.interface());

        Ok(classify::classify(&trace_result, public_ip, &asn_map, &hostnames, Some(&vpn)))
    }

    /// Multipath discovery.
    pub async fn discover_paths(&self, host: &str, mp_config: &MultipathConfig) -> Result<NetworkTopology> {
        multipath::discover_paths(host, &self.config, mp_config, self.config.asn_strategy(), self.child_cancellation()).await
    }

    /// Bufferbloat test.
    pub async fn test_bufferbloat(&self, host: &str, config: &BufferbloatConfig) -> Result<BufferbloatResult> {
        bufferbloat::test_bufferbloat(
            host,
            config,
            &self.config.bind_options(),
            self.load_generator.as_ref(),
            self.child_cancellation(),
        )
        .await
    }

    async fn resolve_asn_cached(&self, ips: &[IpAddr]) -> HashMap<IpAddr, crate::asn::ASNInfo> {
        let (cached, missing) = self.asn_cache.partition(ips);
        let mut out: HashMap<IpAddr, crate::asn::ASNInfo> = cached.into_iter().filter_map(|(ip, info)| info.map(|i| (ip, i))).collect();

        if missing.is_empty() {
            return out;
        }
        let resolved = asn::resolve(&missing, self.config.max_wait(), self.config.asn_strategy())
            .await
            .unwrap_or_else(|error| {
                tracing::warn!(%error, "ASN resolution failed, proceeding without it (auxiliary-information downgrade)");
                HashMap::new()
            });
        for ip in missing {
            let info = resolved.get(&ip).cloned();
            self.asn_cache.insert(ip, info.clone());
            if let Some(info) = info {
                out.insert(ip, info);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_defaults_validates_the_config() {
        let bad = Config::defaults().with_max_hops(0);
        assert!(Engine::with_defaults(bad).is_err());
    }

    #[test]
    fn with_defaults_accepts_a_clean_config() {
        assert!(Engine::with_defaults(Config::defaults()).is_ok());
    }

    #[tokio::test]
    async fn network_changed_clears_both_caches() {
        let engine = Engine::with_defaults(Config::defaults()).unwrap();
        let ip: IpAddr = "93.184.216.34".parse().unwrap();
        engine.asn_cache.insert(ip, None);
        engine.rdns_cache.insert(ip, None);
        engine.network_changed();
        assert!(engine.asn_cache.get(ip).is_none());
        assert!(engine.rdns_cache.get(ip).is_none());
    }

    #[tokio::test]
    async fn network_changed_cancels_previously_issued_child_tokens_but_not_new_ones() {
        let engine = Engine::with_defaults(Config::defaults()).unwrap();
        let before = engine.child_cancellation();
        engine.network_changed();
        assert!(before.is_cancelled());
        let after = engine.child_cancellation();
        assert!(!after.is_cancelled());
    }
}

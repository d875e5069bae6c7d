//! Reverse-DNS cache: a TTL-bounded, LRU-evicted map
//! from IP to hostname, built on the `lru` crate's bounded eviction map.

use lru::LruCache;
use parking_lot::Mutex;
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

struct Entry {
    hostname: Option<String>,
    expires_at: Instant,
}

pub struct RdnsCache {
    inner: Mutex<LruCache<IpAddr, Entry>>,
    ttl: Duration,
}

impl RdnsCache {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Returns a live cached hostname (or cached miss), evicting it first if
    /// it has expired.
    #[must_use]
    pub fn get(&self, ip: IpAddr) -> Option<Option<String>> {
        let mut guard = self.inner.lock();
        match guard.peek(&ip) {
            Some(entry) if entry.expires_at > Instant::now() => guard.get(&ip).map(|e| e.hostname.clone()),
            Some(_) => {
                guard.pop(&ip);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, ip: IpAddr, hostname: Option<String>) {
        self.inner.lock().put(
            ip,
            Entry {
                hostname,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

/// Looks up hostnames for `ips` in parallel through `resolver`, consulting
/// `cache` first and writing any misses back. Failures from the resolver
/// are cached as a negative entry so a consistently unresolvable IP is not
/// retried on every call.
pub async fn resolve_hostnames(
    ips: &[IpAddr],
    cache: &RdnsCache,
    resolver: &dyn crate::collaborators::ReverseResolver,
) -> std::collections::HashMap<IpAddr, String> {
    use futures::future::join_all;

    let mut out = std::collections::HashMap::new();
    let mut to_resolve = Vec::new();
    for ip in ips {
        match cache.get(*ip) {
            Some(Some(hostname)) => {
                out.insert(*ip, hostname);
            }
            Some(None) => {}
            None => to_resolve.push(*ip),
        }
    }

    let resolved = join_all(to_resolve.iter().map(|ip| async move { (*ip, resolver.reverse_lookup(*ip).await) })).await;
    for (ip, hostname) in resolved {
        if hostname.is_none() {
            tracing::debug!(%ip, "reverse DNS lookup returned no hostname");
        }
        cache.insert(ip, hostname.clone());
        if let Some(hostname) = hostname {
            out.insert(ip, hostname);
        }
    }
    out
}

//! Process-wide ASN cache: a thread-safe map from IP to
//! `Option<ASNInfo>`, where `None` caches a definitive miss. No TTL — ASN
//! assignments change rarely enough that this crate treats them as static
//! for the lifetime of an engine instance.

use super::ASNInfo;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;

#[derive(Default)]
pub struct AsnCache {
    inner: RwLock<HashMap<IpAddr, Option<ASNInfo>>>,
}

impl AsnCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a cached entry, if any. A cached miss is `Some(None)`; an
    /// absent entry (never looked up) is `None`.
    #[must_use]
    pub fn get(&self, ip: IpAddr) -> Option<Option<ASNInfo>> {
        self.inner.read().get(&ip).cloned()
    }

    pub fn insert(&self, ip: IpAddr, info: Option<ASNInfo>) {
        self.inner.write().insert(ip, info);
    }

    /// Splits `ips` into those already cached (with their cached value) and
    /// those that still need a lookup.
    #[must_use]
    pub fn partition(&self, ips: &[IpAddr]) -> (HashMap<IpAddr, Option<ASNInfo>>, Vec<IpAddr>) {
        let guard = self.inner.read();
        let mut cached = HashMap::new();
        let mut missing = Vec::new();
        for ip in ips {
            match guard.get(ip) {
                Some(entry) => {
                    cached.insert(*ip, entry.clone());
                }
                None => missing.push(*ip),
            }
        }
        (cached, missing)
    }

    /// Invalidates the whole cache.
    pub fn clear(&self) {
        self.inner.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_is_cached_as_some_none() {
        let cache = AsnCache::new();
        let ip: IpAddr = "93.184.216.34".parse().unwrap();
        assert!(cache.get(ip).is_none());
        cache.insert(ip, None);
        assert_eq!(cache.get(ip), Some(None));
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = AsnCache::new();
        let ip: IpAddr = "1.1.1.1".parse().unwrap();
        cache.insert(ip, None);
        cache.clear();
        assert!(cache.get(ip).is_none());
    }

    #[test]
    fn partition_splits_cached_from_missing() {
        let cache = AsnCache::new();
        let cached_ip: IpAddr = "1.1.1.1".parse().unwrap();
        let missing_ip: IpAddr = "2.2.2.2".parse().unwrap();
        cache.insert(cached_ip, None);
        let (cached, missing) = cache.partition(&[cached_ip, missing_ip]);
        assert!(cached.contains_key(&cached_ip));
        assert_eq!(missing, vec![missing_ip]);
    }
}

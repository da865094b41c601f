//! Per-host DNS cache plugged into reqwest's resolver hook.
//!
//! Entries live for five minutes. The table holds at most 64 hosts; when
//! full, the entry closest to expiry is evicted.

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

const DNS_TTL: Duration = Duration::from_secs(300);
const MAX_ENTRIES: usize = 64;

#[derive(Clone)]
struct CacheEntry {
    addrs: Vec<SocketAddr>,
    expires_at: Instant,
}

/// Caching resolver shared by every connection of the HTTP client.
#[derive(Default)]
pub struct CachingResolver {
    cache: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl CachingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup_cached(&self, host: &str) -> Option<Vec<SocketAddr>> {
        let cache = self.cache.lock().unwrap();
        cache
            .get(host)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.addrs.clone())
    }

    fn store(&self, host: String, addrs: Vec<SocketAddr>) {
        let mut cache = self.cache.lock().unwrap();
        if cache.len() >= MAX_ENTRIES && !cache.contains_key(&host) {
            // Evict the entry expiring soonest
            if let Some(oldest) = cache
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone())
            {
                cache.remove(&oldest);
            }
        }
        cache.insert(
            host,
            CacheEntry {
                addrs,
                expires_at: Instant::now() + DNS_TTL,
            },
        );
    }
}

impl Resolve for CachingResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let host = name.as_str().to_string();

        if let Some(addrs) = self.lookup_cached(&host) {
            debug!("DNS cache hit for {}", host);
            let iter: Addrs = Box::new(addrs.into_iter());
            return Box::pin(async move { Ok(iter) });
        }

        let cache = self.cache.clone();
        Box::pin(async move {
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
                .await
                .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })?
                .collect();
            debug!("Resolved {} to {} addresses", host, addrs.len());

            let resolver = CachingResolver { cache };
            resolver.store(host, addrs.clone());

            let iter: Addrs = Box::new(addrs.into_iter());
            Ok(iter)
        })
    }
}

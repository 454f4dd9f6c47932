//! Pool metadata cache with coalesced, non-blocking resolution.

use crate::chain::inflight::{Coalescer, SharedTask};
use crate::chain::source::PoolMetaSource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMeta {
    pub pool_hash: String,
    pub name: Option<String>,
    pub ticker: Option<String>,
    pub homepage: Option<String>,
}

impl PoolMeta {
    /// Stand-in for a pool that publishes no metadata.
    pub fn placeholder(pool_hash: &str) -> Self {
        Self {
            pool_hash: pool_hash.to_string(),
            name: None,
            ticker: None,
            homepage: None,
        }
    }

    pub fn label(&self) -> String {
        match (&self.ticker, &self.name) {
            (Some(t), Some(n)) => format!("[{t}] {n}"),
            (Some(t), None) => format!("[{t}]"),
            (None, Some(n)) => n.clone(),
            (None, None) => short_hash(&self.pool_hash),
        }
    }
}

pub fn short_hash(hash: &str) -> String {
    if hash.len() <= 16 || !hash.is_ascii() {
        return hash.to_string();
    }
    format!("{}...{}", &hash[..8], &hash[hash.len() - 6..])
}

type PoolKey = (u32, String);

struct ResolverInner {
    source: Arc<dyn PoolMetaSource>,
    cache: Mutex<HashMap<PoolKey, PoolMeta>>,
    in_flight: Coalescer<PoolKey, Option<PoolMeta>>,
}

impl ResolverInner {
    fn cached(&self, key: &PoolKey) -> Option<PoolMeta> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn store(&self, key: PoolKey, meta: PoolMeta) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, meta);
    }
}

/// Resolves `(network_id, pool_hash)` to metadata. Lookups never block: a
/// miss schedules one fetch per key and returns `None` until it lands.
#[derive(Clone)]
pub struct PoolMetaResolver {
    inner: Arc<ResolverInner>,
}

impl PoolMetaResolver {
    pub fn new(source: Arc<dyn PoolMetaSource>) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                source,
                cache: Mutex::new(HashMap::new()),
                in_flight: Coalescer::new(),
            }),
        }
    }

    pub fn seed(&self, network_id: u32, meta: PoolMeta) {
        self.inner.store((network_id, meta.pool_hash.clone()), meta);
    }

    /// Join or start the fetch for `key`. With no tokio runtime to spawn on,
    /// a fetch the caller will not await itself is unregistered again so a
    /// later lookup can start it.
    fn request(&self, key: PoolKey, caller_polls: bool) -> SharedTask<Option<PoolMeta>> {
        let weak: Weak<ResolverInner> = Arc::downgrade(&self.inner);
        let source = self.inner.source.clone();
        let task_key = key.clone();
        let (task, started) = self.inner.in_flight.join_or_start(key.clone(), move || {
            let key = task_key;
            let fetch = source.fetch_pool_meta(key.0, &key.1);
            async move {
                let meta = match fetch.await {
                    Ok(Some(meta)) => Some(meta),
                    Ok(None) => Some(PoolMeta::placeholder(&key.1)),
                    Err(e) => {
                        warn!(pool = %key.1, error = %e, "pool metadata fetch failed");
                        None
                    }
                };
                if let Some(inner) = weak.upgrade() {
                    if let Some(m) = &meta {
                        inner.store(key.clone(), m.clone());
                    }
                    inner.in_flight.finish(&key);
                }
                meta
            }
        });
        if started {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    debug!(pool = %key.1, "pool metadata fetch started");
                    handle.spawn(task.clone());
                }
                Err(_) if !caller_polls => {
                    debug!(pool = %key.1, "no runtime, pool metadata fetch deferred");
                    self.inner.in_flight.finish(&key);
                }
                Err(_) => {}
            }
        }
        task
    }

    /// Cached metadata, or `None` while a fetch is scheduled or in flight.
    pub fn get_local_pool_info(&self, network_id: u32, pool_hash: &str) -> Option<PoolMeta> {
        let key = (network_id, pool_hash.to_string());
        if let Some(meta) = self.inner.cached(&key) {
            return Some(meta);
        }
        let _ = self.request(key, false);
        None
    }

    /// Wait for metadata, joining any in-flight request for the same key.
    pub async fn resolve(&self, network_id: u32, pool_hash: &str) -> Option<PoolMeta> {
        let key = (network_id, pool_hash.to_string());
        if let Some(meta) = self.inner.cached(&key) {
            return Some(meta);
        }
        self.request(key, true).await
    }

    /// Display label; a shortened hash while metadata is unknown.
    pub fn label_for(&self, network_id: u32, pool_hash: &str) -> String {
        self.get_local_pool_info(network_id, pool_hash)
            .map(|m| m.label())
            .unwrap_or_else(|| short_hash(pool_hash))
    }

    pub fn is_in_flight(&self, network_id: u32, pool_hash: &str) -> bool {
        self.inner
            .in_flight
            .is_in_flight(&(network_id, pool_hash.to_string()))
    }

    /// Snapshot of every cached entry for one network.
    pub fn cached_for_network(&self, network_id: u32) -> Vec<PoolMeta> {
        let cache = self.inner.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<PoolMeta> = cache
            .iter()
            .filter(|((n, _), _)| *n == network_id)
            .map(|(_, m)| m.clone())
            .collect();
        out.sort_by(|a, b| a.pool_hash.cmp(&b.pool_hash));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::source::SourceError;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl PoolMetaSource for CountingSource {
        fn fetch_pool_meta(
            &self,
            _network_id: u32,
            pool_hash: &str,
        ) -> BoxFuture<'static, Result<Option<PoolMeta>, SourceError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let hash = pool_hash.to_string();
            let fail = self.fail;
            async move {
                tokio::task::yield_now().await;
                if fail {
                    return Err(SourceError::Unavailable("down".into()));
                }
                if hash == "nometa" {
                    return Ok(None);
                }
                Ok(Some(PoolMeta {
                    pool_hash: hash,
                    name: Some("Pool One".into()),
                    ticker: Some("ONE".into()),
                    homepage: None,
                }))
            }
            .boxed()
        }
    }

    fn resolver(fail: bool) -> (PoolMetaResolver, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            calls: calls.clone(),
            fail,
        };
        (PoolMetaResolver::new(Arc::new(source)), calls)
    }

    #[tokio::test]
    async fn miss_returns_none_and_coalesces() {
        let (r, calls) = resolver(false);
        assert_eq!(r.get_local_pool_info(1, "p1"), None);
        assert_eq!(r.get_local_pool_info(1, "p1"), None);
        assert!(r.is_in_flight(1, "p1"));
        let meta = r.resolve(1, "p1").await.unwrap();
        assert_eq!(meta.label(), "[ONE] Pool One");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(r.get_local_pool_info(1, "p1"), Some(meta));
        assert!(!r.is_in_flight(1, "p1"));
    }

    #[tokio::test]
    async fn keys_include_network() {
        let (r, calls) = resolver(false);
        r.resolve(1, "p1").await;
        r.resolve(0, "p1").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(r.cached_for_network(0).len(), 1);
    }

    #[tokio::test]
    async fn missing_metadata_caches_placeholder() {
        let (r, calls) = resolver(false);
        let meta = r.resolve(1, "nometa").await.unwrap();
        assert_eq!(meta, PoolMeta::placeholder("nometa"));
        r.resolve(1, "nometa").await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let (r, calls) = resolver(true);
        assert_eq!(r.resolve(1, "p1").await, None);
        assert_eq!(r.resolve(1, "p1").await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn miss_without_runtime_is_retried_inside_one() {
        let (r, calls) = resolver(false);
        assert_eq!(r.get_local_pool_info(1, "p1"), None);
        assert!(!r.is_in_flight(1, "p1"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(async {
            assert_eq!(r.get_local_pool_info(1, "p1"), None);
            for _ in 0..50 {
                if r.get_local_pool_info(1, "p1").is_some() {
                    break;
                }
                tokio::task::yield_now().await;
            }
        });
        assert_eq!(
            r.get_local_pool_info(1, "p1").map(|m| m.label()),
            Some("[ONE] Pool One".to_string())
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn label_without_runtime_is_placeholder() {
        let (r, _) = resolver(false);
        let hash = "0123456789abcdef0123456789abcdef0123456789abcdef01234567";
        assert_eq!(r.label_for(1, hash), "01234567...234567");
        r.seed(
            1,
            PoolMeta {
                pool_hash: hash.into(),
                name: None,
                ticker: Some("SEED".into()),
                homepage: None,
            },
        );
        assert_eq!(r.label_for(1, hash), "[SEED]");
    }
}

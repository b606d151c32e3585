//! TTL cache with in-flight coalescing
//!
//! Concurrent requests for the same key share one computation. The
//! computation runs as its own task, so it completes and populates the
//! cache even when every caller that asked for it has gone away.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::cache::CacheKey;
use crate::error::ResolveError;

/// How a value was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Coalesced,
}

impl CacheStatus {
    /// Header representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::Coalesced => "COALESCED",
        }
    }
}

/// Counter snapshot for introspection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub inflight: usize,
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
}

type Pending<V> = Shared<BoxFuture<'static, Result<V, ResolveError>>>;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

struct Inner<V> {
    entries: HashMap<CacheKey, Entry<V>>,
    inflight: HashMap<CacheKey, Pending<V>>,
}

/// Keyed result cache shared by every request
pub struct ResultCache<V> {
    name: &'static str,
    inner: Arc<Mutex<Inner<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
}

fn lock<V>(inner: &Mutex<Inner<V>>) -> MutexGuard<'_, Inner<V>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<V> ResultCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                inflight: HashMap::new(),
            })),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Return the cached value for `key`, or compute it once
    ///
    /// `ttl` decides how long a successful value stays; a zero TTL skips
    /// storing it. Failures are never cached.
    pub async fn get_or_resolve<F, Fut, T>(
        &self,
        key: CacheKey,
        ttl: T,
        resolve: F,
    ) -> Result<(V, CacheStatus), ResolveError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ResolveError>> + Send + 'static,
        T: FnOnce(&V) -> Duration + Send + 'static,
    {
        let (pending, status) = {
            let mut inner = lock(&self.inner);

            match inner.entries.get(&key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    trace!("{} cache hit for {}", self.name, key);
                    return Ok((entry.value.clone(), CacheStatus::Hit));
                }
                Some(_) => {
                    inner.entries.remove(&key);
                }
                None => {}
            }

            if let Some(pending) = inner.inflight.get(&key) {
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!("{} cache joining in-flight resolution for {}", self.name, key);
                (pending.clone(), CacheStatus::Coalesced)
            } else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("{} cache miss for {}", self.name, key);
                let pending = self.spawn_resolution(key.clone(), ttl, resolve());
                inner.inflight.insert(key, pending.clone());
                (pending, CacheStatus::Miss)
            }
        };

        pending.await.map(|value| (value, status))
    }

    // Called with the lock held, so the task cannot finish before its
    // in-flight entry exists.
    fn spawn_resolution<Fut, T>(&self, key: CacheKey, ttl: T, resolution: Fut) -> Pending<V>
    where
        Fut: Future<Output = Result<V, ResolveError>> + Send + 'static,
        T: FnOnce(&V) -> Duration + Send + 'static,
    {
        let inner = self.inner.clone();
        let name = self.name;

        let task = tokio::spawn(async move {
            let guard = InflightGuard {
                inner: inner.clone(),
                key: Some(key.clone()),
            };
            let result = resolution.await;

            let mut state = lock(&inner);
            guard.disarm();
            if let Ok(value) = &result {
                let ttl = ttl(value);
                if !ttl.is_zero() {
                    trace!("{} cache storing {} for {:?}", name, key, ttl);
                    state.entries.insert(
                        key.clone(),
                        Entry {
                            value: value.clone(),
                            expires_at: Instant::now() + ttl,
                        },
                    );
                }
            }
            state.inflight.remove(&key);
            result
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(ResolveError::Terminated),
                Err(e) => Err(ResolveError::spawn_failure(format!(
                    "resolution task failed: {e}"
                ))),
            }
        }
        .boxed()
        .shared()
    }

    /// True when `key` has a fresh value or a resolution already running
    pub fn is_warm(&self, key: &CacheKey) -> bool {
        let inner = lock(&self.inner);
        let fresh = inner
            .entries
            .get(key)
            .is_some_and(|entry| entry.expires_at > Instant::now());
        fresh || inner.inflight.contains_key(key)
    }

    /// Drop expired entries, returning how many were removed
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut inner = lock(&self.inner);
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!("{} cache swept {} expired entries", self.name, removed);
        }
        removed
    }

    /// Drop every stored entry; in-flight work is left to finish
    pub fn clear(&self) -> usize {
        let mut inner = lock(&self.inner);
        let removed = inner.entries.len();
        inner.entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = lock(&self.inner);
        CacheStats {
            entries: inner.entries.len(),
            inflight: inner.inflight.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

/// Removes the in-flight entry if the task dies before completing normally
struct InflightGuard<V> {
    inner: Arc<Mutex<Inner<V>>>,
    key: Option<CacheKey>,
}

impl<V> InflightGuard<V> {
    fn disarm(mut self) {
        self.key = None;
    }
}

impl<V> Drop for InflightGuard<V> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            lock(&self.inner).inflight.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClientProfile, ResolveOptions, VideoId};
    use std::sync::atomic::AtomicUsize;

    fn key(id: &str) -> CacheKey {
        let options = ResolveOptions::new(ClientProfile::parse_list("tv").unwrap());
        CacheKey::formats(&VideoId::parse(id).unwrap(), &options)
    }

    fn counted(
        counter: &Arc<AtomicUsize>,
        delay_ms: u64,
        result: Result<u32, ResolveError>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<u32, ResolveError>> + use<> {
        let counter = counter.clone();
        move || {
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                result
            }
            .boxed()
        }
    }

    fn minute(_: &u32) -> Duration {
        Duration::from_secs(60)
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = ResultCache::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        let (value, status) = cache
            .get_or_resolve(key("aaaaaaaaaaa"), minute, counted(&calls, 1, Ok(7)))
            .await
            .unwrap();
        assert_eq!((value, status), (7, CacheStatus::Miss));

        let (value, status) = cache
            .get_or_resolve(key("aaaaaaaaaaa"), minute, counted(&calls, 1, Ok(8)))
            .await
            .unwrap();
        assert_eq!((value, status), (7, CacheStatus::Hit));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_coalesce() {
        let cache = Arc::new(ResultCache::new("test"));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let resolve = counted(&calls, 50, Ok(42));
            handles.push(tokio::spawn(async move {
                cache.get_or_resolve(key("bbbbbbbbbbb"), minute, resolve).await
            }));
        }

        let mut statuses = Vec::new();
        for handle in handles {
            let (value, status) = handle.await.unwrap().unwrap();
            assert_eq!(value, 42);
            statuses.push(status);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            statuses.iter().filter(|s| **s == CacheStatus::Miss).count(),
            1
        );
        assert_eq!(
            statuses
                .iter()
                .filter(|s| **s == CacheStatus::Coalesced)
                .count(),
            7
        );
        assert_eq!(cache.stats().inflight, 0);
    }

    #[tokio::test]
    async fn test_failures_are_shared_but_not_cached() {
        let cache = Arc::new(ResultCache::new("test"));
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache.get_or_resolve(
            key("ccccccccccc"),
            minute,
            counted(&calls, 30, Err(ResolveError::timeout(45))),
        );
        let second = cache.get_or_resolve(
            key("ccccccccccc"),
            minute,
            counted(&calls, 30, Ok(1)),
        );
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first, Err(ResolveError::timeout(45)));
        assert_eq!(second, Err(ResolveError::timeout(45)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());

        let (value, status) = cache
            .get_or_resolve(key("ccccccccccc"), minute, counted(&calls, 1, Ok(5)))
            .await
            .unwrap();
        assert_eq!((value, status), (5, CacheStatus::Miss));
    }

    #[tokio::test]
    async fn test_abandoned_request_still_populates() {
        let cache = Arc::new(ResultCache::new("test"));
        let calls = Arc::new(AtomicUsize::new(0));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            cache.get_or_resolve(key("ddddddddddd"), minute, counted(&calls, 60, Ok(9))),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(150)).await;
        let (value, status) = cache
            .get_or_resolve(key("ddddddddddd"), minute, counted(&calls, 1, Ok(0)))
            .await
            .unwrap();
        assert_eq!((value, status), (9, CacheStatus::Hit));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expiry_sweep_and_clear() {
        let cache = ResultCache::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_resolve(
                key("eeeeeeeeeee"),
                |_: &u32| Duration::from_millis(20),
                counted(&calls, 1, Ok(1)),
            )
            .await
            .unwrap();
        cache
            .get_or_resolve(key("fffffffffff"), minute, counted(&calls, 1, Ok(2)))
            .await
            .unwrap();
        assert_eq!(cache.len(), 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);

        let (_, status) = cache
            .get_or_resolve(key("eeeeeeeeeee"), minute, counted(&calls, 1, Ok(3)))
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Miss);

        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_zero_ttl_is_not_stored() {
        let cache = ResultCache::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_resolve(
                key("ggggggggggg"),
                |_: &u32| Duration::ZERO,
                counted(&calls, 1, Ok(1)),
            )
            .await
            .unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_warm_covers_stored_and_inflight() {
        let cache = Arc::new(ResultCache::new("test"));
        let calls = Arc::new(AtomicUsize::new(0));
        assert!(!cache.is_warm(&key("hhhhhhhhhhh")));

        let running = tokio::spawn({
            let cache = cache.clone();
            let resolve = counted(&calls, 80, Ok(1));
            async move { cache.get_or_resolve(key("hhhhhhhhhhh"), minute, resolve).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.is_warm(&key("hhhhhhhhhhh")));

        running.await.unwrap().unwrap();
        assert!(cache.is_warm(&key("hhhhhhhhhhh")));
        assert!(!cache.is_warm(&key("iiiiiiiiiii")));

        cache.clear();
        assert!(!cache.is_warm(&key("hhhhhhhhhhh")));
    }
}

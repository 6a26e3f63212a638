use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Small keyed cache with a fixed time-to-live.
///
/// Owned by whoever builds it and passed around by clone; there is no global
/// instance. Refreshes hold the lock, so concurrent misses on a cold key run
/// the loader once.
#[derive(Clone)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Arc<Mutex<HashMap<K, (Instant, V)>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, v)| v.clone())
    }

    pub async fn insert(&self, key: K, value: V) {
        self.entries
            .lock()
            .await
            .insert(key, (Instant::now(), value));
    }

    pub async fn invalidate(&self, key: &K) {
        self.entries.lock().await.remove(key);
    }

    /// Return the cached value, or run `load` and cache its result.
    ///
    /// Errors are passed through and never cached.
    pub async fn get_or_refresh<F, Fut, E>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let mut entries = self.entries.lock().await;
        if let Some((at, v)) = entries.get(&key) {
            if at.elapsed() < self.ttl {
                return Ok(v.clone());
            }
        }

        let fresh = load().await?;
        entries.insert(key, (Instant::now(), fresh.clone()));
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn serves_cached_value_within_ttl() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let loads = AtomicUsize::new(0);
        let loads = &loads;

        for _ in 0..3 {
            let v: Result<i64, ()> = cache
                .get_or_refresh("depth", || async move {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await;
            assert_eq!(v, Ok(7));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reloads_after_expiry() {
        let cache = TtlCache::new(Duration::from_millis(20));
        cache.insert("depth", 1).await;
        assert_eq!(cache.get(&"depth").await, Some(1));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get(&"depth").await, None);

        let v: Result<i32, ()> = cache.get_or_refresh("depth", || async { Ok(2) }).await;
        assert_eq!(v, Ok(2));
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache: TtlCache<&str, i32> = TtlCache::new(Duration::from_secs(60));
        let err: Result<i32, &str> = cache.get_or_refresh("k", || async { Err("db down") }).await;
        assert_eq!(err, Err("db down"));
        assert_eq!(cache.get(&"k").await, None);

        cache.insert("k", 3).await;
        cache.invalidate(&"k").await;
        assert_eq!(cache.get(&"k").await, None);
    }
}

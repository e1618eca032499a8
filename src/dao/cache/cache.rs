use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// TTL-bounded in-memory cache shared across clones
#[derive(Clone)]
pub struct CacheService<K, V> {
    cache: Arc<Cache<K, V>>,
}

impl<K, V> CacheService<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(max_capacity)
            .build();
        CacheService {
            cache: Arc::new(cache),
        }
    }

    /// Cached value, `None` on miss
    pub async fn get(&self, key: &K) -> Option<V> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: K, value: V) {
        self.cache.insert(key, value).await;
    }

    pub async fn invalidate(&self, key: &K) {
        self.cache.invalidate(key).await;
    }
}

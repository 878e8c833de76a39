//! Topic Cache
//!
//! Per-bot snapshot of the topic registry. A flow change invalidates the
//! snapshot; the next event re-reads the registry. Each bot carries a
//! generation counter so a fetch racing an invalidation never installs the
//! topics it read before the change.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

use bot_nlu_core::{Result, Topic, TopicRegistry};

/// Topics of one bot as read from the registry
#[derive(Debug, Clone)]
pub struct TopicSnapshot {
    pub bot_id: String,
    pub generation: u64,
    /// Registration order
    pub topics: Vec<Topic>,
    pub fetched_at: DateTime<Utc>,
}

/// Read-through cache over the topic registry
pub struct TopicCache {
    registry: Arc<dyn TopicRegistry>,
    entries: DashMap<String, Arc<TopicSnapshot>>,
    generations: DashMap<String, u64>,
}

impl TopicCache {
    pub fn new(registry: Arc<dyn TopicRegistry>) -> Self {
        Self {
            registry,
            entries: DashMap::new(),
            generations: DashMap::new(),
        }
    }

    /// Cached topics of a bot, fetched from the registry on a miss
    pub async fn topics(&self, bot_id: &str) -> Result<Arc<TopicSnapshot>> {
        let cached = self.entries.get(bot_id).map(|entry| Arc::clone(entry.value()));
        if let Some(snapshot) = cached {
            return Ok(snapshot);
        }

        let generation = self.generation(bot_id);
        let topics = self.registry.list_topics(bot_id).await?;
        let snapshot = Arc::new(TopicSnapshot {
            bot_id: bot_id.to_string(),
            generation,
            topics,
            fetched_at: Utc::now(),
        });

        // Hold the generation entry while inserting so an invalidation
        // cannot slip in between the check and the insert
        let current = self.generations.entry(bot_id.to_string()).or_insert(0);
        if *current == generation {
            self.entries.insert(bot_id.to_string(), Arc::clone(&snapshot));
            tracing::debug!(bot_id, generation, topics = snapshot.topics.len(), "Cached topics");
        } else {
            tracing::debug!(bot_id, generation, current = *current, "Discarding stale topics");
        }
        drop(current);

        Ok(snapshot)
    }

    /// Drop the cached topics of a bot. Returns whether anything was cached;
    /// repeating it without an intervening fetch changes nothing.
    pub fn invalidate(&self, bot_id: &str) -> bool {
        let mut generation = self.generations.entry(bot_id.to_string()).or_insert(0);
        *generation += 1;
        let removed = self.entries.remove(bot_id).is_some();
        let generation = *generation;

        if removed {
            tracing::info!(bot_id, generation, "Topic cache invalidated");
        }
        removed
    }

    /// Forget everything about a bot
    pub fn forget(&self, bot_id: &str) {
        self.entries.remove(bot_id);
        self.generations.remove(bot_id);
    }

    pub fn generation(&self, bot_id: &str) -> u64 {
        self.generations.get(bot_id).map(|g| *g).unwrap_or(0)
    }

    pub fn is_cached(&self, bot_id: &str) -> bool {
        self.entries.contains_key(bot_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRegistry {
        calls: AtomicUsize,
        topics: Mutex<Vec<Topic>>,
    }

    #[async_trait]
    impl TopicRegistry for CountingRegistry {
        async fn list_topics(&self, _bot_id: &str) -> Result<Vec<Topic>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.topics.lock().clone())
        }
    }

    fn setup() -> (Arc<CountingRegistry>, TopicCache) {
        let registry = Arc::new(CountingRegistry::default());
        registry.topics.lock().push(Topic::new("billing"));
        let cache = TopicCache::new(registry.clone());
        (registry, cache)
    }

    #[tokio::test]
    async fn test_read_through() {
        let (registry, cache) = setup();

        let first = cache.topics("bot").await.unwrap();
        let second = cache.topics("bot").await.unwrap();

        assert_eq!(registry.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_invalidate_refetches() {
        let (registry, cache) = setup();
        cache.topics("bot").await.unwrap();

        registry.topics.lock().push(Topic::new("shipping"));
        assert!(cache.invalidate("bot"));

        let snapshot = cache.topics("bot").await.unwrap();
        assert_eq!(snapshot.topics.len(), 2);
        assert_eq!(registry.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_double_invalidate_is_noop() {
        let (registry, cache) = setup();
        cache.topics("bot").await.unwrap();

        assert!(cache.invalidate("bot"));
        assert!(!cache.invalidate("bot"));
        assert!(!cache.is_cached("bot"));

        cache.topics("bot").await.unwrap();
        assert_eq!(registry.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stale_fetch_not_cached() {
        /// Registry that invalidates the cache while a fetch is in flight
        struct RacingRegistry {
            cache: Mutex<Option<Arc<TopicCache>>>,
        }

        #[async_trait]
        impl TopicRegistry for RacingRegistry {
            async fn list_topics(&self, bot_id: &str) -> Result<Vec<Topic>> {
                let cache = self.cache.lock().clone();
                if let Some(cache) = cache {
                    cache.invalidate(bot_id);
                }
                Ok(vec![Topic::new("old")])
            }
        }

        let registry = Arc::new(RacingRegistry {
            cache: Mutex::new(None),
        });
        let cache = Arc::new(TopicCache::new(registry.clone()));
        *registry.cache.lock() = Some(cache.clone());

        let snapshot = cache.topics("bot").await.unwrap();
        assert_eq!(snapshot.topics[0].name, "old");
        assert!(!cache.is_cached("bot"));
        assert_eq!(cache.generation("bot"), 1);

        // Break the reference cycle
        registry.cache.lock().take();
    }

    #[tokio::test]
    async fn test_forget() {
        let (_, cache) = setup();
        cache.topics("bot").await.unwrap();
        cache.invalidate("bot");
        cache.forget("bot");
        assert_eq!(cache.generation("bot"), 0);
    }
}

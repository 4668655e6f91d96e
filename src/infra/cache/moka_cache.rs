//! In-process detection cache backed by moka.
//! Every entry carries its own TTL; capacity is bounded with LRU-style eviction.

use crate::core::moderation::{CacheError, CacheKey, CachedValue, DetectionCache};
use moka::sync::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
struct Entry {
    value: CachedValue,
    ttl: Duration,
}

/// Expire each entry after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

pub struct MokaDetectionCache {
    entries: Cache<String, Entry>,
}

impl MokaDetectionCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(PerEntryTtl)
                .build(),
        }
    }
}

impl DetectionCache for MokaDetectionCache {
    fn get(&self, key: &CacheKey) -> Result<Option<CachedValue>, CacheError> {
        Ok(self.entries.get(&key.to_string()).map(|e| e.value))
    }

    fn put(&self, key: &CacheKey, value: CachedValue, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), Entry { value, ttl });
        Ok(())
    }

    fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.entries.invalidate(&key.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::content::Subject;

    fn key(id: u64) -> CacheKey {
        CacheKey::spam_score("test", 1, Subject::Post(id))
    }

    #[test]
    fn test_insert_get_invalidate() {
        let cache = MokaDetectionCache::new(100);
        assert_eq!(cache.get(&key(1)).unwrap(), None);

        cache
            .put(&key(1), CachedValue::Score(0.25), Duration::from_secs(60))
            .unwrap();
        assert_eq!(cache.get(&key(1)).unwrap(), Some(CachedValue::Score(0.25)));
        assert_eq!(cache.get(&key(2)).unwrap(), None);

        cache.invalidate(&key(1)).unwrap();
        assert_eq!(cache.get(&key(1)).unwrap(), None);
    }

    #[test]
    fn test_entries_expire_on_their_own_ttl() {
        let cache = MokaDetectionCache::new(100);
        cache
            .put(&key(1), CachedValue::Flag(true), Duration::from_millis(50))
            .unwrap();
        cache
            .put(&key(2), CachedValue::Flag(false), Duration::from_secs(60))
            .unwrap();

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(cache.get(&key(1)).unwrap(), None);
        assert_eq!(cache.get(&key(2)).unwrap(), Some(CachedValue::Flag(false)));
    }

    #[test]
    fn test_versioned_keys_do_not_collide() {
        let cache = MokaDetectionCache::new(100);
        let v1 = CacheKey::spam_score("test", 1, Subject::Post(1));
        let v2 = CacheKey::spam_score("test", 2, Subject::Post(1));
        cache
            .put(&v1, CachedValue::Score(0.9), Duration::from_secs(60))
            .unwrap();
        assert_eq!(cache.get(&v2).unwrap(), None);
    }
}

//! In-process [`ExportCache`] backed by `DashMap`.
//!
//! Entries are keyed by `(language code, fingerprint)`. A secondary index
//! maps each language code to the fingerprints currently cached for it, so
//! invalidating a language touches only that language's entries.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use polyglot_core::{ClockSource, Fingerprint, Millis, SystemClock};

use super::{CacheError, CacheStats};
use crate::traits::ExportCache;

type EntryKey = (String, Fingerprint);

struct Entry {
    payload: Bytes,
    expires_at: Millis,
}

enum Lookup {
    Hit(Bytes),
    Expired,
    Absent,
}

/// TTL cache of export payloads held in process memory.
pub struct InMemoryExportCache {
    entries: DashMap<EntryKey, Entry>,
    index: DashMap<String, HashSet<Fingerprint>>,
    clock: Arc<dyn ClockSource>,
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    invalidations: AtomicU64,
    expired: AtomicU64,
}

impl InMemoryExportCache {
    /// Creates an empty cache that expires entries by wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty cache that reads time from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn ClockSource>) -> Self {
        Self {
            entries: DashMap::new(),
            index: DashMap::new(),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stores: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("polyglot_export_cache_misses_total").increment(1);
    }

    fn unindex(&self, language: &str, fingerprint: Fingerprint) {
        let now_empty = match self.index.get_mut(language) {
            Some(mut set) => {
                set.remove(&fingerprint);
                set.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.index.remove_if(language, |_, set| set.is_empty());
        }
    }

    /// Removes `key` if it is still expired at `now`. Returns whether it was removed.
    fn remove_expired(&self, key: &EntryKey, now: Millis) -> bool {
        if self
            .entries
            .remove_if(key, |_, entry| entry.expires_at <= now)
            .is_some()
        {
            self.unindex(&key.0, key.1);
            self.expired.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }
}

impl Default for InMemoryExportCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExportCache for InMemoryExportCache {
    async fn get(
        &self,
        language: &str,
        fingerprint: Fingerprint,
    ) -> Result<Option<Bytes>, CacheError> {
        let key = (language.to_string(), fingerprint);
        let now = self.clock.now();

        let lookup = match self.entries.get(&key) {
            Some(entry) if entry.expires_at > now => Lookup::Hit(entry.payload.clone()),
            Some(_) => Lookup::Expired,
            None => Lookup::Absent,
        };

        match lookup {
            Lookup::Hit(payload) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("polyglot_export_cache_hits_total").increment(1);
                Ok(Some(payload))
            }
            Lookup::Expired => {
                self.remove_expired(&key, now);
                self.miss();
                Ok(None)
            }
            Lookup::Absent => {
                self.miss();
                Ok(None)
            }
        }
    }

    async fn put(
        &self,
        language: &str,
        fingerprint: Fingerprint,
        payload: Bytes,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let ttl_ms = Millis::try_from(ttl.as_millis()).unwrap_or(Millis::MAX);
        let entry = Entry {
            payload,
            expires_at: self.clock.now().saturating_add(ttl_ms),
        };

        // Entry first, index second: an entry may briefly be unindexed, never
        // the other way round.
        self.entries
            .insert((language.to_string(), fingerprint), entry);
        self.index
            .entry(language.to_string())
            .or_default()
            .insert(fingerprint);

        self.stores.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("polyglot_export_cache_stores_total").increment(1);
        Ok(())
    }

    async fn invalidate_all(&self, language: &str) -> Result<usize, CacheError> {
        let Some((_, fingerprints)) = self.index.remove(language) else {
            return Ok(0);
        };

        let mut removed = 0;
        for fingerprint in fingerprints {
            if self
                .entries
                .remove(&(language.to_string(), fingerprint))
                .is_some()
            {
                removed += 1;
            }
        }

        self.invalidations
            .fetch_add(removed as u64, Ordering::Relaxed);
        metrics::counter!("polyglot_export_cache_invalidations_total").increment(removed as u64);
        Ok(removed)
    }

    async fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = self.clock.now();
        let candidates: Vec<EntryKey> = self
            .entries
            .iter()
            .filter(|entry| entry.value().expires_at <= now)
            .map(|entry| entry.key().clone())
            .collect();

        Ok(candidates
            .iter()
            .filter(|key| self.remove_expired(key, now))
            .count())
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use polyglot_core::ManualClock;

    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    fn fp(stamp: Millis) -> Fingerprint {
        Fingerprint::from_latest_mutation(Some(stamp))
    }

    fn cache() -> (InMemoryExportCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let cache = InMemoryExportCache::with_clock(Arc::clone(&clock) as Arc<dyn ClockSource>);
        (cache, clock)
    }

    #[tokio::test]
    async fn get_returns_exact_fingerprint_only() {
        let (cache, _) = cache();
        cache
            .put("en", fp(10), Bytes::from_static(b"v10"), TTL)
            .await
            .unwrap();

        assert_eq!(
            cache.get("en", fp(10)).await.unwrap(),
            Some(Bytes::from_static(b"v10"))
        );
        assert_eq!(cache.get("en", fp(11)).await.unwrap(), None);
        assert_eq!(cache.get("fr", fp(10)).await.unwrap(), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.stores, 1);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let (cache, clock) = cache();
        cache
            .put("en", fp(10), Bytes::from_static(b"x"), TTL)
            .await
            .unwrap();

        clock.advance(59_999);
        assert!(cache.get("en", fp(10)).await.unwrap().is_some());

        clock.advance(1);
        assert!(cache.get("en", fp(10)).await.unwrap().is_none());
        // Lazily removed on the read, together with its index slot.
        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.stats().expired, 1);
        assert_eq!(cache.invalidate_all("en").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn invalidate_all_drops_every_fingerprint_of_one_language() {
        let (cache, _) = cache();
        for stamp in [1, 2, 3] {
            cache
                .put("en", fp(stamp), Bytes::from_static(b"en"), TTL)
                .await
                .unwrap();
        }
        cache
            .put("fr", fp(1), Bytes::from_static(b"fr"), TTL)
            .await
            .unwrap();

        assert_eq!(cache.invalidate_all("en").await.unwrap(), 3);
        for stamp in [1, 2, 3] {
            assert!(cache.get("en", fp(stamp)).await.unwrap().is_none());
        }
        assert!(cache.get("fr", fp(1)).await.unwrap().is_some());
        assert_eq!(cache.invalidate_all("en").await.unwrap(), 0);
        assert_eq!(cache.stats().invalidations, 3);
    }

    #[tokio::test]
    async fn purge_removes_only_expired_entries() {
        let (cache, clock) = cache();
        cache
            .put("en", fp(1), Bytes::from_static(b"short"), Duration::from_secs(1))
            .await
            .unwrap();
        cache
            .put("en", fp(2), Bytes::from_static(b"long"), TTL)
            .await
            .unwrap();
        cache
            .put("de", fp(1), Bytes::from_static(b"short"), Duration::from_secs(1))
            .await
            .unwrap();

        clock.advance(5_000);
        assert_eq!(cache.purge_expired().await.unwrap(), 2);
        assert_eq!(cache.stats().entries, 1);
        assert!(cache.get("en", fp(2)).await.unwrap().is_some());
        assert!(cache.index.get("de").is_none());
        assert_eq!(cache.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn same_key_put_is_last_writer_wins() {
        let (cache, clock) = cache();
        cache
            .put("en", fp(7), Bytes::from_static(b"a"), Duration::from_secs(1))
            .await
            .unwrap();
        cache
            .put("en", fp(7), Bytes::from_static(b"a"), TTL)
            .await
            .unwrap();

        // The second put refreshed the TTL.
        clock.advance(30_000);
        assert!(cache.get("en", fp(7)).await.unwrap().is_some());
        assert_eq!(cache.stats().entries, 1);
    }

    #[tokio::test]
    async fn concurrent_puts_and_invalidations_do_not_deadlock() {
        let cache = Arc::new(InMemoryExportCache::new());
        let mut tasks = Vec::new();
        for i in 0..8u64 {
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move {
                for j in 0..100u64 {
                    let language = if (i + j) % 2 == 0 { "en" } else { "fr" };
                    cache
                        .put(language, fp(j + 1), Bytes::from_static(b"p"), TTL)
                        .await
                        .unwrap();
                    if j % 10 == 0 {
                        cache.invalidate_all(language).await.unwrap();
                    }
                    let _ = cache.get(language, fp(j + 1)).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        cache.invalidate_all("en").await.unwrap();
        cache.invalidate_all("fr").await.unwrap();
        assert_eq!(cache.stats().entries, 0);
    }
}

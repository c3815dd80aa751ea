use std::{collections::HashMap, future::Future, sync::Arc, time::{Duration, Instant}};

use tokio::sync::Mutex;

use crate::{error::SvResult, tools::log::{log_info, LogServiceType}};

use super::PersonEmbedding;

/// Default snapshot lifetime: 5 minutes.
pub const CACHE_TTL: Duration = Duration::from_secs(300);

struct CacheEntry {
    data: Vec<PersonEmbedding>,
    fetched: Instant,
}

/// Per-user slot. All reads, populate-on-miss and invalidations for one user
/// go through the slot's mutex, so a snapshot can never be observed
/// half-replaced and an invalidate cannot race a concurrent populate.
/// Identity resolution holds the same lock across its no-match → create step.
#[derive(Default)]
pub struct UserCacheSlot {
    entry: Option<CacheEntry>,
}

impl UserCacheSlot {
    pub fn clear(&mut self) {
        self.entry = None;
    }
}

/// In-memory, TTL-bounded cache of each user's known `{person, embedding}`
/// pairs. Not authoritative: always reproducible from the store through the
/// injected loader, which is the only read path into stored embeddings.
pub struct EmbeddingCache {
    ttl: Duration,
    slots: Mutex<HashMap<String, Arc<Mutex<UserCacheSlot>>>>,
}

impl EmbeddingCache {
    pub fn new(ttl: Duration) -> Self {
        EmbeddingCache {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// The slot for a user, created empty on first access. The outer map lock
    /// is only held while cloning the Arc, never across a load.
    pub async fn user_slot(&self, user_id: &str) -> Arc<Mutex<UserCacheSlot>> {
        let mut slots = self.slots.lock().await;
        slots
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(UserCacheSlot::default())))
            .clone()
    }

    /// Return the slot's snapshot, loading it through `load` when absent or
    /// older than the TTL (lazy expiry). Empty snapshots are cached like any
    /// other so a user with zero known faces does not hit the store on every
    /// match.
    pub async fn snapshot_or_load<F, Fut>(&self, user_id: &str, slot: &mut UserCacheSlot, load: F) -> SvResult<Vec<PersonEmbedding>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SvResult<Vec<PersonEmbedding>>>,
    {
        if let Some(entry) = &slot.entry {
            if entry.fetched.elapsed() < self.ttl {
                return Ok(entry.data.clone());
            }
        }
        let data = load().await?;
        log_info(LogServiceType::Recognition, format!("Loaded {} embeddings for user {} into cache", data.len(), user_id));
        slot.entry = Some(CacheEntry {
            data: data.clone(),
            fetched: Instant::now(),
        });
        Ok(data)
    }

    /// Cached snapshot for `user_id`, loading on miss. Takes the user's slot
    /// lock for the duration of the load.
    pub async fn get<F, Fut>(&self, user_id: &str, load: F) -> SvResult<Vec<PersonEmbedding>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SvResult<Vec<PersonEmbedding>>>,
    {
        let slot = self.user_slot(user_id).await;
        let mut guard = slot.lock().await;
        self.snapshot_or_load(user_id, &mut guard, load).await
    }

    /// Unconditionally drop the cached snapshot for `user_id`. Required after
    /// any mutation of that user's people or faces (rename, delete, merge,
    /// new face persisted); skipping it serves stale matches for up to a TTL.
    pub async fn invalidate(&self, user_id: &str) {
        let slot = self.user_slot(user_id).await;
        let mut guard = slot.lock().await;
        guard.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::domain::people::Person;

    use super::*;

    fn entries(n: usize) -> Vec<PersonEmbedding> {
        (0..n)
            .map(|i| PersonEmbedding {
                person: Person {
                    id: format!("p{}", i),
                    user: "u1".to_string(),
                    name: format!("Person {}", i),
                    auto_created: false,
                    added: None,
                    modified: None,
                },
                embedding: vec![i as f32; 4],
            })
            .collect()
    }

    #[tokio::test]
    async fn second_get_within_ttl_does_not_reload() {
        let cache = EmbeddingCache::new(Duration::from_secs(300));
        let loads = AtomicUsize::new(0);

        for _ in 0..2 {
            let result = cache
                .get("u1", || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(entries(3))
                })
                .await
                .unwrap();
            assert_eq!(result.len(), 3);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_exactly_one_reload() {
        let cache = EmbeddingCache::new(Duration::from_secs(300));
        let loads = AtomicUsize::new(0);
        let load = || async {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(entries(1))
        };

        cache.get("u1", load).await.unwrap();
        cache.invalidate("u1").await;
        cache.get("u1", load).await.unwrap();
        cache.get("u1", load).await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_snapshot_is_cached_normally() {
        let cache = EmbeddingCache::new(Duration::from_secs(300));
        let loads = AtomicUsize::new(0);
        let load = || async {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(entries(0))
        };

        assert!(cache.get("u1", load).await.unwrap().is_empty());
        assert!(cache.get("u1", load).await.unwrap().is_empty());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_snapshot_is_treated_as_absent() {
        let cache = EmbeddingCache::new(Duration::from_millis(40));
        let loads = AtomicUsize::new(0);
        let load = || async {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(entries(2))
        };

        cache.get("u1", load).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        cache.get("u1", load).await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn users_are_cached_independently() {
        let cache = EmbeddingCache::new(Duration::from_secs(300));
        let loads = AtomicUsize::new(0);
        let load = || async {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(entries(1))
        };

        cache.get("u1", load).await.unwrap();
        cache.get("u2", load).await.unwrap();
        cache.invalidate("u1").await;
        cache.get("u2", load).await.unwrap();
        cache.get("u1", load).await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn invalidate_waits_for_held_slot() {
        let cache = Arc::new(EmbeddingCache::new(Duration::from_secs(300)));
        cache.get("u1", || async { Ok(entries(1)) }).await.unwrap();

        let slot = cache.user_slot("u1").await;
        let guard = slot.lock().await;

        let cloned = cache.clone();
        let invalidation = tokio::spawn(async move { cloned.invalidate("u1").await });
        // the slot is held: the invalidate cannot complete yet
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!invalidation.is_finished());

        drop(guard);
        invalidation.await.unwrap();
    }
}

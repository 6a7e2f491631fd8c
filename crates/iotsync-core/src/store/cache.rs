// ── Freshness-windowed collection cache ──
//
// Concurrent storage (`DashMap`) of whole collections, one per owner key.
// Readers get an `Arc` snapshot; every mutation builds a new vector, so a
// snapshot handed out earlier never changes underneath its holder.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::model::{Device, Notification, OwnerKey};

/// Records that can be patched individually inside a cached collection.
pub trait Identified {
    fn id(&self) -> &str;
}

impl Identified for Device {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for Notification {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug)]
struct CacheEntry<T> {
    data: Arc<Vec<T>>,
    /// Set on `set` only; single-item mutations never extend freshness.
    timestamp: Instant,
}

/// Collections cached per [`OwnerKey`] for a fixed freshness window.
///
/// A stale entry is a miss: `get` evicts it, and every mutation against it
/// is rejected (returns `false`) instead of reviving stale data.
pub struct CacheStore<T> {
    entries: DashMap<OwnerKey, CacheEntry<T>>,
    ttl: Duration,
}

impl<T: Identified + Clone + Send + Sync + 'static> CacheStore<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// `true` while `timestamp` is inside the freshness window.
    pub fn is_fresh(&self, timestamp: Instant) -> bool {
        timestamp.elapsed() < self.ttl
    }

    /// Fresh snapshot for `key`. `None` means "must refetch", never "empty".
    pub fn get(&self, key: &OwnerKey) -> Option<Arc<Vec<T>>> {
        let stale = match self.entries.get(key) {
            None => return None,
            Some(entry) if self.is_fresh(entry.timestamp) => return Some(Arc::clone(&entry.data)),
            Some(_) => true,
        };
        if stale {
            tracing::debug!(owner = %key, "evicting stale cache entry");
            self.entries.remove(key);
        }
        None
    }

    /// Replace the collection for `key` and restart its freshness window.
    pub fn set(&self, key: OwnerKey, data: Vec<T>) {
        self.entries.insert(
            key,
            CacheEntry {
                data: Arc::new(data),
                timestamp: Instant::now(),
            },
        );
    }

    /// Replace the record with the same id. `false` if the entry is
    /// missing or stale, or holds no such record.
    pub fn update_one(&self, key: &OwnerKey, item: T) -> bool {
        self.mutate(key, |items| {
            match items.iter_mut().find(|existing| existing.id() == item.id()) {
                Some(slot) => {
                    *slot = item;
                    true
                }
                None => false,
            }
        })
    }

    /// Insert at the front, replacing any record with the same id.
    pub fn add_one(&self, key: &OwnerKey, item: T) -> bool {
        self.mutate(key, |items| {
            items.retain(|existing| existing.id() != item.id());
            items.insert(0, item);
            true
        })
    }

    /// Drop the record with `id`.
    pub fn remove_one(&self, key: &OwnerKey, id: &str) -> bool {
        self.mutate(key, |items| {
            let before = items.len();
            items.retain(|existing| existing.id() != id);
            items.len() != before
        })
    }

    pub fn clear(&self, key: &OwnerKey) {
        self.entries.remove(key);
    }

    pub fn clear_all(&self) {
        self.entries.clear();
    }

    /// Number of owner keys currently held (fresh or not).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read-modify-write against a fresh entry; evicts stale ones.
    fn mutate(&self, key: &OwnerKey, apply: impl FnOnce(&mut Vec<T>) -> bool) -> bool {
        let stale = match self.entries.get_mut(key) {
            None => return false,
            Some(mut entry) if self.is_fresh(entry.timestamp) => {
                let mut items = entry.data.as_ref().clone();
                let changed = apply(&mut items);
                if changed {
                    entry.data = Arc::new(items);
                }
                return changed;
            }
            Some(_) => true,
        };
        if stale {
            tracing::debug!(owner = %key, "rejecting mutation of stale cache entry");
            self.entries.remove(key);
        }
        false
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: String,
        value: u32,
    }

    impl Identified for Item {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn item(id: &str, value: u32) -> Item {
        Item {
            id: id.into(),
            value,
        }
    }

    fn key() -> OwnerKey {
        OwnerKey::new("org-1", "user-1")
    }

    const TTL: Duration = Duration::from_secs(300);

    #[tokio::test(start_paused = true)]
    async fn set_then_get_within_window() {
        let cache = CacheStore::new(TTL);
        cache.set(key(), vec![item("a", 1), item("b", 2)]);

        tokio::time::advance(Duration::from_secs(299)).await;
        let snap = cache.get(&key()).unwrap();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[1], item("b", 2));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entry_is_evicted_not_ignored() {
        let cache = CacheStore::new(TTL);
        cache.set(key(), vec![item("a", 1)]);

        tokio::time::advance(TTL).await;
        assert!(cache.get(&key()).is_none());
        assert!(cache.is_empty(), "stale entry should be removed on read");
        assert!(cache.get(&key()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn mutations_against_stale_entry_are_rejected() {
        let cache = CacheStore::new(TTL);
        cache.set(key(), vec![item("a", 1)]);
        tokio::time::advance(TTL + Duration::from_secs(1)).await;

        assert!(!cache.add_one(&key(), item("b", 2)));
        assert!(cache.get(&key()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn mutations_against_missing_entry_are_noops() {
        let cache: CacheStore<Item> = CacheStore::new(TTL);
        assert!(!cache.add_one(&key(), item("a", 1)));
        assert!(!cache.update_one(&key(), item("a", 1)));
        assert!(!cache.remove_one(&key(), "a"));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn single_item_mutations() {
        let cache = CacheStore::new(TTL);
        cache.set(key(), vec![item("a", 1), item("b", 2)]);

        assert!(cache.update_one(&key(), item("b", 20)));
        assert!(!cache.update_one(&key(), item("zz", 0)));
        assert!(cache.add_one(&key(), item("c", 3)));
        assert!(cache.remove_one(&key(), "a"));
        assert!(!cache.remove_one(&key(), "a"));

        let snap = cache.get(&key()).unwrap();
        assert_eq!(*snap, vec![item("c", 3), item("b", 20)]);
    }

    #[tokio::test(start_paused = true)]
    async fn add_one_replaces_duplicate_id() {
        let cache = CacheStore::new(TTL);
        cache.set(key(), vec![item("a", 1), item("b", 2)]);
        assert!(cache.add_one(&key(), item("b", 5)));
        assert_eq!(*cache.get(&key()).unwrap(), vec![item("b", 5), item("a", 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn mutation_does_not_extend_freshness() {
        let cache = CacheStore::new(TTL);
        cache.set(key(), vec![item("a", 1)]);

        tokio::time::advance(Duration::from_secs(200)).await;
        assert!(cache.add_one(&key(), item("b", 2)));

        tokio::time::advance(Duration::from_secs(100)).await;
        assert!(cache.get(&key()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn snapshots_are_immutable() {
        let cache = CacheStore::new(TTL);
        cache.set(key(), vec![item("a", 1)]);
        let before = cache.get(&key()).unwrap();

        cache.add_one(&key(), item("b", 2));
        assert_eq!(before.len(), 1);
        assert_eq!(cache.get(&key()).unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn owners_do_not_collide() {
        let cache = CacheStore::new(TTL);
        cache.set(OwnerKey::new("org-1", "alice"), vec![item("a", 1)]);
        cache.set(OwnerKey::new("org-1", "bob"), vec![]);
        cache.clear(&OwnerKey::new("org-1", "bob"));
        assert_eq!(cache.len(), 1);
        cache.clear_all();
        assert!(cache.is_empty());
    }
}

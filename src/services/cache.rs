//! Local object cache: which objects are on disk, how many consumers pin
//! them, and which ones were ingested too recently to be deleted.
//!
//! The cache is shared by the sync tasks, the asset-serving layer and the
//! upload path. Every operation takes a single internal lock around pure
//! in-memory work, so callers never coordinate locking themselves.

use crate::models::{CachedObject, ObjectId};
use chrono::{DateTime, Duration, Utc};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::debug;

/// The narrow interface sync tasks use to consult and update the cache.
pub trait ObjectCache: Send + Sync {
    /// True if the object was ingested within the new-object window.
    fn is_new(&self, id: &ObjectId) -> bool;

    /// Current entry, if the object is present.
    fn get(&self, id: &ObjectId) -> Option<CachedObject>;

    /// Mark an object as present after it was committed to disk.
    fn add(&self, id: &ObjectId);

    /// Drop the entry after the file was removed from disk.
    fn remove(&self, id: &ObjectId);
}

/// In-memory [`ObjectCache`] with pin counts and new-object markers.
pub struct LocalObjectCache {
    new_object_ttl: Duration,
    inner: Mutex<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    objects: HashMap<ObjectId, CachedObject>,
    new_objects: HashMap<ObjectId, DateTime<Utc>>,
}

impl LocalObjectCache {
    /// Objects marked new stay protected from deletion for `new_object_ttl`.
    pub fn new(new_object_ttl: std::time::Duration) -> Self {
        Self {
            new_object_ttl: Duration::from_std(new_object_ttl).unwrap_or(Duration::MAX),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a freshly uploaded object whose ledger entry may lag behind.
    pub fn mark_new(&self, id: &ObjectId) {
        self.lock().new_objects.insert(id.clone(), Utc::now());
    }

    /// Register a consumer of the object. Returns the new pin count, or
    /// `None` when the object is not present.
    pub fn pin(&self, id: &ObjectId) -> Option<u64> {
        let mut inner = self.lock();
        let entry = inner.objects.get_mut(id)?;
        entry.pinned_count += 1;
        Some(entry.pinned_count)
    }

    /// Release a consumer registered with [`pin`](Self::pin).
    pub fn unpin(&self, id: &ObjectId) -> Option<u64> {
        let mut inner = self.lock();
        let entry = inner.objects.get_mut(id)?;
        entry.pinned_count = entry.pinned_count.saturating_sub(1);
        Some(entry.pinned_count)
    }

    /// Sorted snapshot of every present object id.
    pub fn object_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.lock().objects.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectCache for LocalObjectCache {
    fn is_new(&self, id: &ObjectId) -> bool {
        let now = Utc::now();
        let ttl = self.new_object_ttl;
        let mut inner = self.lock();
        inner
            .new_objects
            .retain(|_, marked_at| now.signed_duration_since(*marked_at) < ttl);
        inner.new_objects.contains_key(id)
    }

    fn get(&self, id: &ObjectId) -> Option<CachedObject> {
        self.lock().objects.get(id).cloned()
    }

    fn add(&self, id: &ObjectId) {
        let mut inner = self.lock();
        if inner.objects.contains_key(id) {
            return;
        }
        inner.objects.insert(id.clone(), CachedObject::new());
        debug!(object_id = %id, "object added to local cache");
    }

    fn remove(&self, id: &ObjectId) {
        if self.lock().objects.remove(id).is_some() {
            debug!(object_id = %id, "object removed from local cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn id(raw: &str) -> ObjectId {
        ObjectId::parse(raw).unwrap()
    }

    #[test]
    fn add_get_remove() {
        let cache = LocalObjectCache::new(StdDuration::from_secs(60));
        assert!(cache.get(&id("1")).is_none());

        cache.add(&id("1"));
        cache.add(&id("2"));
        assert_eq!(cache.get(&id("1")).unwrap().pinned_count, 0);
        assert_eq!(cache.object_ids(), vec![id("1"), id("2")]);

        cache.remove(&id("1"));
        assert!(cache.get(&id("1")).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn re_adding_keeps_pins() {
        let cache = LocalObjectCache::new(StdDuration::from_secs(60));
        cache.add(&id("1"));
        assert_eq!(cache.pin(&id("1")), Some(1));
        cache.add(&id("1"));
        assert!(cache.get(&id("1")).unwrap().is_pinned());
    }

    #[test]
    fn pin_and_unpin_saturate() {
        let cache = LocalObjectCache::new(StdDuration::from_secs(60));
        assert_eq!(cache.pin(&id("missing")), None);

        cache.add(&id("1"));
        assert_eq!(cache.pin(&id("1")), Some(1));
        assert_eq!(cache.pin(&id("1")), Some(2));
        assert_eq!(cache.unpin(&id("1")), Some(1));
        assert_eq!(cache.unpin(&id("1")), Some(0));
        assert_eq!(cache.unpin(&id("1")), Some(0));
        assert!(!cache.get(&id("1")).unwrap().is_pinned());
    }

    #[test]
    fn new_marker_expires() {
        let cache = LocalObjectCache::new(StdDuration::from_secs(3600));
        cache.mark_new(&id("fresh"));
        assert!(cache.is_new(&id("fresh")));
        assert!(!cache.is_new(&id("other")));

        let expired = LocalObjectCache::new(StdDuration::ZERO);
        expired.mark_new(&id("fresh"));
        assert!(!expired.is_new(&id("fresh")));
    }
}

//! Reconstructed frame cache keyed by source, version and frame time.
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use constants::playback::DEFAULT_CACHE_CAPACITY;
use log::debug;

use crate::error::{PointCloudError, Result};
use crate::point_cloud::PointCloud;

/// Shared store of built point clouds. Implementations synchronise internally
/// so one cache can serve several players and preload workers.
pub trait FrameCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Arc<PointCloud>>;

    fn insert(&self, key: String, cloud: Arc<PointCloud>);

    fn remove(&self, key: &str);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache key `"{source}:{version}:{time}"` where version is creation time (ms)
/// multiplied by the recording duration (ms).
pub fn cache_key(source: &str, created_ms: i64, duration_secs: f64, frame_time: f64) -> String {
    let version = created_ms.wrapping_mul((duration_secs * 1000.0) as i64);
    format!("{}:{}:{}", source, version, frame_time)
}

#[derive(Debug, Default)]
struct LruState {
    entries: HashMap<String, (Arc<PointCloud>, u64)>,
    /// Recency tick to key, oldest first.
    order: BTreeMap<u64, String>,
    tick: u64,
}

impl LruState {
    fn touch(&mut self, key: &str) -> Option<Arc<PointCloud>> {
        self.tick += 1;
        let tick = self.tick;
        let (cloud, last) = self.entries.get_mut(key)?;
        let previous = std::mem::replace(last, tick);
        let cloud = Arc::clone(cloud);
        self.order.remove(&previous);
        self.order.insert(tick, key.to_string());
        Some(cloud)
    }
}

/// Least-recently-used cache bounded by entry count.
#[derive(Debug)]
pub struct LruFrameCache {
    capacity: usize,
    state: Mutex<LruState>,
}

impl Default for LruFrameCache {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            state: Mutex::new(LruState::default()),
        }
    }
}

impl LruFrameCache {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(PointCloudError::ZeroCapacity);
        }
        Ok(Self {
            capacity,
            state: Mutex::new(LruState::default()),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.entries.clear();
        state.order.clear();
    }
}

impl FrameCache for LruFrameCache {
    fn get(&self, key: &str) -> Option<Arc<PointCloud>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .touch(key)
    }

    fn insert(&self, key: String, cloud: Arc<PointCloud>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.tick += 1;
        let tick = state.tick;
        if let Some((_, previous)) = state.entries.insert(key.clone(), (cloud, tick)) {
            state.order.remove(&previous);
        }
        state.order.insert(tick, key);

        while state.entries.len() > self.capacity {
            let Some((_, evicted)) = state.order.pop_first() else {
                break;
            };
            state.entries.remove(&evicted);
            debug!("Evicted cached frame {}", evicted);
        }
    }

    fn remove(&self, key: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, tick)) = state.entries.remove(key) {
            state.order.remove(&tick);
        }
    }

    fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud() -> Arc<PointCloud> {
        Arc::new(PointCloud::square(2, 1.0, [0, 0, 0]))
    }

    #[test]
    fn test_key_format() {
        assert_eq!(cache_key("swing.pcd", 1_000, 2.5, 0.25), "swing.pcd:2500000:0.25");
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = LruFrameCache::new(2).unwrap();
        cache.insert("a".into(), cloud());
        cache.insert("b".into(), cloud());
        assert!(cache.get("a").is_some());
        cache.insert("c".into(), cloud());

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_reinsert_refreshes_entry() {
        let cache = LruFrameCache::new(2).unwrap();
        cache.insert("a".into(), cloud());
        cache.insert("b".into(), cloud());
        cache.insert("a".into(), cloud());
        cache.insert("c".into(), cloud());
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = LruFrameCache::default();
        assert_eq!(cache.capacity(), DEFAULT_CACHE_CAPACITY);
        cache.insert("a".into(), cloud());
        cache.insert("b".into(), cloud());
        cache.remove("a");
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity() {
        assert!(matches!(LruFrameCache::new(0), Err(PointCloudError::ZeroCapacity)));
    }
}

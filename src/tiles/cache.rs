use crate::core::constants::DEFAULT_CACHE_CAPACITY;
use crate::core::geo::TileCoord;
use crate::tiles::source::ServerId;
use image::RgbaImage;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Identifies one cached tile image: which tile, from which server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileKey {
    pub coord: TileCoord,
    pub server: ServerId,
}

impl TileKey {
    pub fn new(coord: TileCoord, server: ServerId) -> Self {
        Self { coord, server }
    }

    /// The key of the tile actually stored for this position: x wraps across
    /// the antimeridian, positions beyond the poles have no tile.
    pub fn normalized(&self) -> Option<TileKey> {
        self.coord.wrapped().map(|coord| TileKey::new(coord, self.server))
    }
}

/// In-memory cache of decoded tiles shared by the loader workers, the
/// prefetcher and the UI thread. Bounded; least recently used tiles go first.
#[derive(Debug)]
pub struct TileCache {
    cache: Arc<Mutex<LruCache<TileKey, Arc<RgbaImage>>>>,
}

impl TileCache {
    /// Create a new tile cache with the given capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Create a new tile cache with default capacity (10 000 tiles)
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }

    /// Get a tile from the cache
    pub fn get(&self, key: &TileKey) -> Option<Arc<RgbaImage>> {
        self.cache.lock().ok()?.get(key).cloned()
    }

    /// Insert a tile into the cache, evicting the least recently used tile
    /// once capacity is reached
    pub fn put(&self, key: TileKey, image: Arc<RgbaImage>) {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some((evicted, _)) = cache.push(key, image) {
                if evicted != key {
                    log::trace!("evicted tile {} (server {:?})", evicted.coord, evicted.server);
                }
            }
        }
    }

    /// Check if a tile is in the cache without touching its recency
    pub fn contains(&self, key: &TileKey) -> bool {
        self.cache
            .lock()
            .map(|cache| cache.contains(key))
            .unwrap_or(false)
    }

    /// Clear all tiles from the cache
    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    /// Get the current number of cached tiles
    pub fn len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache capacity
    pub fn capacity(&self) -> usize {
        self.cache
            .lock()
            .map(|cache| cache.cap().get())
            .unwrap_or(0)
    }
}

impl Clone for TileCache {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn key(x: i64, y: i64, z: u8) -> TileKey {
        TileKey::new(TileCoord::new(x, y, z), ServerId(0))
    }

    fn pixel() -> Arc<RgbaImage> {
        Arc::new(RgbaImage::new(1, 1))
    }

    #[test]
    fn test_tile_cache_basic_operations() {
        let cache = TileCache::new(2);
        let image = pixel();

        assert!(cache.is_empty());
        assert!(cache.get(&key(1, 2, 3)).is_none());
        // a miss must not insert anything
        assert_eq!(cache.len(), 0);

        cache.put(key(1, 2, 3), Arc::clone(&image));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&key(1, 2, 3)));
        assert!(Arc::ptr_eq(&cache.get(&key(1, 2, 3)).unwrap(), &image));

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_keys_that_collide_as_strings_stay_distinct() {
        let cache = TileCache::new(8);
        let a = key(23, 4, 1);
        let b = key(3, 4, 12);
        cache.put(a, pixel());
        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));

        let other_server = TileKey::new(a.coord, ServerId(1));
        assert!(!cache.contains(&other_server));
    }

    #[test]
    fn test_tile_cache_lru_eviction() {
        let cache = TileCache::new(2);
        cache.put(key(1, 1, 1), pixel());
        cache.put(key(2, 2, 2), pixel());

        // touch the first entry so the second becomes the eviction candidate
        assert!(cache.get(&key(1, 1, 1)).is_some());
        cache.put(key(3, 3, 3), pixel());

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&key(1, 1, 1)));
        assert!(!cache.contains(&key(2, 2, 2)));
        assert!(cache.contains(&key(3, 3, 3)));
    }

    #[test]
    fn test_capacity_never_exceeded_under_concurrency() {
        let cache = TileCache::new(100);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..500 {
                        cache.put(key(i, t, 10), pixel());
                        assert!(cache.len() <= 100);
                        let _ = cache.get(&key(i / 2, t, 10));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 100);
        assert_eq!(cache.capacity(), 100);
    }

    #[test]
    fn test_normalized_key() {
        let wrapped = key(-1, 0, 1).normalized().unwrap();
        assert_eq!(wrapped.coord, TileCoord::new(1, 0, 1));
        assert!(key(0, 2, 1).normalized().is_none());
    }
}

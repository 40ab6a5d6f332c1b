use crate::core::config::{LoaderConfig, StorageConfig};
use crate::tiles::cache::{TileCache, TileKey};
use crate::tiles::fetch::TileFetcher;
use crate::tiles::image::TileImage;
use crate::tiles::source::{TileServer, TileSource};
use crate::tiles::store::{open_store, TileStore};
use image::RgbaImage;
use std::sync::Arc;

/// What became of one attempt to produce a tile.
#[derive(Debug, Clone)]
pub enum Resolution {
    Image(Arc<RgbaImage>),
    /// Permanently unavailable; shown as a placeholder, never retried
    Empty,
    /// Temporarily unavailable; try the same tile again later
    Retry,
}

/// Produces tile images from the cache, the offline store or the network,
/// in that order. Each worker thread owns one, since store connections are
/// not shared between threads.
pub struct TileResolver {
    cache: TileCache,
    store: Option<Box<dyn TileStore>>,
    fetcher: Arc<dyn TileFetcher>,
    offline_only: bool,
    persist_fetched: bool,
    network_retries: u32,
}

impl TileResolver {
    pub fn new(
        cache: TileCache,
        store: Option<Box<dyn TileStore>>,
        fetcher: Arc<dyn TileFetcher>,
        config: &LoaderConfig,
    ) -> Self {
        Self {
            cache,
            store,
            fetcher,
            offline_only: config.offline_only,
            persist_fetched: config.persist_fetched,
            network_retries: config.network_retries,
        }
    }

    /// Opens this thread's store connection. A store that cannot be opened
    /// is logged and the resolver carries on with cache and network only.
    pub fn open(
        cache: TileCache,
        storage: &StorageConfig,
        fetcher: Arc<dyn TileFetcher>,
        config: &LoaderConfig,
    ) -> Self {
        let store = match open_store(storage, false) {
            Ok(None) if storage.is_enabled() => {
                log::debug!("no tile store at {:?} yet, continuing without it", storage);
                None
            }
            Ok(store) => store,
            Err(e) => {
                log::warn!("tile store unavailable, continuing without it: {}", e);
                None
            }
        };
        Self::new(cache, store, fetcher, config)
    }

    /// Resolves one tile. `attempt` counts previous `Retry` outcomes for the
    /// same task.
    pub fn resolve(&self, server: &TileServer, key: TileKey, attempt: u32) -> Resolution {
        let Some(key) = key.normalized() else {
            return Resolution::Empty;
        };
        if key.coord.z > server.max_zoom {
            return Resolution::Empty;
        }

        if let Some(image) = self.cache.get(&key) {
            return Resolution::Image(image);
        }

        if let Some(store) = &self.store {
            match store.load(server, key.coord) {
                Ok(Some(bytes)) => match TileImage::decode(&bytes) {
                    Ok(image) => {
                        self.cache.put(key, Arc::clone(&image));
                        return Resolution::Image(image);
                    }
                    Err(e) => log::warn!("stored tile {} is not an image: {}", key.coord, e),
                },
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    log::debug!("store busy for tile {}, requeueing", key.coord);
                    return Resolution::Retry;
                }
                Err(e) => log::warn!("store lookup for tile {} failed: {}", key.coord, e),
            }
        }

        if self.offline_only {
            return Resolution::Empty;
        }

        let url = server.url(key.coord);
        match self.fetcher.fetch(&url) {
            Ok(bytes) => match TileImage::decode(&bytes) {
                Ok(image) => {
                    self.cache.put(key, Arc::clone(&image));
                    self.persist(server, key, &bytes);
                    Resolution::Image(image)
                }
                Err(e) => {
                    log::warn!("tile {} from {} is not an image: {}", key.coord, url, e);
                    Resolution::Empty
                }
            },
            Err(e) if e.is_transient() && attempt < self.network_retries => {
                log::debug!("tile {} attempt {} failed: {}", key.coord, attempt + 1, e);
                Resolution::Retry
            }
            Err(e) => {
                log::warn!("giving up on tile {}: {}", key.coord, e);
                Resolution::Empty
            }
        }
    }

    fn persist(&self, server: &TileServer, key: TileKey, bytes: &[u8]) {
        if !self.persist_fetched {
            return;
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.save(server, key.coord, bytes) {
                log::warn!("could not persist tile {}: {}", key.coord, e);
            }
        }
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }
}

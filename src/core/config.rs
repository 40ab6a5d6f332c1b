//! Configuration for the map engine
//!
//! Everything a [`MapView`](crate::MapView) needs at construction time lives
//! in [`MapConfig`]: the initial view, the tile servers, and the tuning knobs
//! of the loader pool, cache, prefetcher and offline store. All of it can be
//! loaded from JSON; missing fields take their defaults.

use crate::core::constants::*;
use crate::core::geo::LatLng;
use crate::tiles::source::{TileServer, TileServerRegistry};
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub center: LatLng,
    pub zoom: f64,
    pub tile_servers: Vec<TileServer>,
    /// Name of the server shown first; the first listed server when unset
    pub active_server: Option<String>,
    pub loader: LoaderConfig,
    pub cache: CacheConfig,
    pub prefetch: PrefetchConfig,
    pub storage: StorageConfig,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center: LatLng::default(),
            zoom: 1.0,
            tile_servers: TileServerRegistry::default_servers(),
            active_server: None,
            loader: LoaderConfig::default(),
            cache: CacheConfig::default(),
            prefetch: PrefetchConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl MapConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: MapConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Small pool, no prefetch, nothing persisted. Used by tests and the
    /// headless driver.
    pub fn for_testing() -> Self {
        Self {
            loader: LoaderConfig::for_testing(),
            cache: CacheConfig { capacity: 1_000 },
            prefetch: PrefetchConfig {
                enabled: false,
                ..PrefetchConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tile_servers.is_empty() {
            return Err(MapError::Config("at least one tile server is required".into()));
        }
        if !self.zoom.is_finite() {
            return Err(MapError::Config(format!("zoom must be finite, got {}", self.zoom)));
        }
        if !self.center.is_valid() {
            return Err(MapError::Config(format!(
                "center ({}, {}) is not a valid position",
                self.center.lat, self.center.lng
            )));
        }
        self.loader.validate()?;
        self.cache.validate()?;
        self.prefetch.validate()
    }
}

/// Loader pool tuning and the tile resolution policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub worker_count: usize,
    /// How long an idle worker sleeps on the task stack before re-checking
    pub idle_poll_ms: u64,
    pub request_timeout_ms: u64,
    /// Extra attempts for tiles whose server could not be reached
    pub network_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Never touch the network; store misses become empty tiles
    pub offline_only: bool,
    /// Write tiles fetched over the network into the offline store
    pub persist_fetched: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            idle_poll_ms: DEFAULT_WORKER_IDLE_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            network_retries: 0,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            offline_only: false,
            persist_fetched: false,
        }
    }
}

impl LoaderConfig {
    pub fn low_resource() -> Self {
        Self {
            worker_count: 4,
            idle_poll_ms: 25,
            ..Self::default()
        }
    }

    pub fn high_performance() -> Self {
        Self {
            worker_count: 64,
            idle_poll_ms: 5,
            network_retries: 2,
            ..Self::default()
        }
    }

    pub fn for_testing() -> Self {
        Self {
            worker_count: 4,
            idle_poll_ms: 5,
            request_timeout_ms: 2_000,
            retry_base_delay_ms: 5,
            retry_max_delay_ms: 50,
            ..Self::default()
        }
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Delay before the given retry attempt (1-based): the base delay doubled
    /// per attempt, capped at the maximum
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(20);
        let delay = self.retry_base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.retry_max_delay_ms))
    }

    fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(MapError::Config("loader needs at least one worker".into()));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(MapError::Config(format!(
                "retry base delay {}ms exceeds the maximum {}ms",
                self.retry_base_delay_ms, self.retry_max_delay_ms
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of decoded tiles kept in memory
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl CacheConfig {
    /// Rough memory footprint of a full cache of 256px RGBA tiles
    pub fn estimated_memory_usage(&self) -> usize {
        self.capacity * (TILE_SIZE * TILE_SIZE * 4) as usize
    }

    fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(MapError::Config("cache capacity must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    pub enabled: bool,
    /// Ring radius (in tiles) after which the prefetcher idles
    pub max_radius: u32,
    pub idle_ms: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_radius: DEFAULT_PREFETCH_MAX_RADIUS,
            idle_ms: DEFAULT_PREFETCH_IDLE_MS,
        }
    }
}

impl PrefetchConfig {
    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.enabled && self.max_radius == 0 {
            return Err(MapError::Config("prefetch radius must be at least 1".into()));
        }
        Ok(())
    }
}

/// Where tiles are looked up before going to the network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StorageConfig {
    #[default]
    None,
    /// One SQLite file holding the tiles of every server
    Database { path: PathBuf },
    /// `{root}/{server_dir}/{zoom}/{x}/{y}.png`
    Files { root: PathBuf },
}

impl StorageConfig {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, StorageConfig::None)
    }
}

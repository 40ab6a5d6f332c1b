//! Prelude module for common tileview types and traits
//!
//! `use tileview::prelude::*;` brings in what a GUI shell typically needs to
//! drive a map.

pub use crate::core::{
    config::{CacheConfig, LoaderConfig, MapConfig, PrefetchConfig, StorageConfig},
    geo::{LatLng, Point, TileCoord, TilePoint},
    map::{DrawableId, MapView, TickStats},
    viewport::{ViewChange, Viewport},
};

pub use crate::tiles::{
    cache::{TileCache, TileKey},
    fetch::{HttpFetcher, TileFetcher},
    grid::{GridSlot, PatchStats, SlotId, TileGrid},
    image::TileImage,
    source::{ServerId, TileServer, TileSource},
};

pub use crate::traits::Drawable;

pub use crate::{Error as MapError, Result};

pub use std::{
    sync::Arc,
    time::{Duration, Instant},
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};

//! # tileview
//!
//! The engine behind a pannable, zoomable slippy-map widget.
//!
//! It converts between geographic, tile-grid and widget-pixel coordinates,
//! keeps a grid of visible tile slots that is patched incrementally as the
//! view moves, and feeds that grid from a pool of loader threads backed by an
//! in-memory cache, an offline tile store and an HTTP tile server. A
//! background prefetcher warms the cache around the centre of the view.
//!
//! The GUI shell owns a [`MapView`], forwards input to it, calls
//! [`MapView::tick`] on a short timer and paints the slots it exposes.

pub mod core;
pub mod prelude;
pub mod tiles;
pub mod traits;

pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    config::MapConfig,
    geo::{LatLng, Point, TileCoord, TilePoint},
    map::{DrawableId, MapView},
    viewport::{ViewChange, Viewport},
};

pub use tiles::{
    cache::{TileCache, TileKey},
    grid::{GridSlot, TileGrid},
    image::TileImage,
    loader::TileLoader,
    source::{ServerId, TileServer},
};

pub use traits::Drawable;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Tile store error: {0}")]
    Store(#[from] tiles::store::StoreError),

    #[error("Tile fetch error: {0}")]
    Fetch(#[from] tiles::fetch::FetchError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("Unknown tile server: {0}")]
    UnknownTileServer(String),

    #[error("Invalid viewport: {0}")]
    InvalidViewport(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error type alias for convenience
pub type Error = MapError;

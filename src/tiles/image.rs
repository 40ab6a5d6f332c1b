use crate::core::constants::{EMPTY_COLOR, NOT_LOADED_COLOR};
use image::RgbaImage;
use std::sync::Arc;

/// Whatever currently represents a tile on screen.
#[derive(Debug, Clone)]
pub enum TileImage {
    /// Decoded pixels, shared with the cache
    Loaded(Arc<RgbaImage>),
    /// The tile is queued or in flight
    NotLoaded,
    /// The tile could not be produced; drawn as a flat placeholder
    Empty,
}

impl TileImage {
    /// Decodes PNG/JPEG bytes. Undecodable bodies are a permanent failure for
    /// the tile, so the error is returned for the caller to log and map to
    /// [`TileImage::Empty`].
    pub fn decode(bytes: &[u8]) -> Result<Arc<RgbaImage>, image::ImageError> {
        let decoded = image::load_from_memory(bytes)?;
        Ok(Arc::new(decoded.to_rgba8()))
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, TileImage::Loaded(_))
    }

    pub fn pixels(&self) -> Option<&Arc<RgbaImage>> {
        match self {
            TileImage::Loaded(image) => Some(image),
            _ => None,
        }
    }

    /// Flat fill colour for the placeholder states
    pub fn placeholder_color(&self) -> Option<[u8; 3]> {
        match self {
            TileImage::Loaded(_) => None,
            TileImage::NotLoaded => Some(NOT_LOADED_COLOR),
            TileImage::Empty => Some(EMPTY_COLOR),
        }
    }
}

impl PartialEq for TileImage {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TileImage::Loaded(a), TileImage::Loaded(b)) => Arc::ptr_eq(a, b),
            (TileImage::NotLoaded, TileImage::NotLoaded) => true,
            (TileImage::Empty, TileImage::Empty) => true,
            _ => false,
        }
    }
}

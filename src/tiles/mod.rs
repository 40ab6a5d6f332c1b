pub mod cache;
pub mod fetch;
pub mod grid;
pub mod image;
pub mod loader;
pub mod prefetch;
pub mod resolver;
pub mod source;
pub mod store;

// Re-exports for convenience
pub use cache::{TileCache, TileKey};
pub use fetch::{HttpFetcher, TileFetcher};
pub use grid::{GridSlot, SlotId, TileGrid};
pub use loader::{TileLoader, TileResult, TileTask};
pub use prefetch::PrefetchDaemon;
pub use source::{ServerId, TileServer, TileServerRegistry, TileSource};
pub use store::{FileTileStore, SqliteTileStore, TileStore};

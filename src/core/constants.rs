//! Engine-wide defaults for tile sizing, the loader pool and the prefetcher.
//! Keeping them in a single place makes it easier to tweak magic numbers.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Web Mercator latitude limit; the tile grid is square only up to here.
pub const MAX_LATITUDE: f64 = 85.051_128_779_8;

/// Deepest zoom level any tile server can advertise.
pub const MAX_SUPPORTED_ZOOM: u8 = 22;

/// Cache capacity in decoded tiles (10 000 tiles of 256px ≈ 80 MB).
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Number of loader worker threads.
pub const DEFAULT_WORKER_COUNT: usize = 25;

/// How long an idle worker waits before re-polling the task stack.
pub const DEFAULT_WORKER_IDLE_MS: u64 = 10;

/// Interval at which the GUI shell is expected to call `MapView::tick`.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 5;

/// HTTP timeout for a single tile request.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Prefetch ring stops growing past this radius until the centre moves.
pub const DEFAULT_PREFETCH_MAX_RADIUS: u32 = 8;

/// Prefetch thread sleep when there is nothing left to warm.
pub const DEFAULT_PREFETCH_IDLE_MS: u64 = 100;

/// First backoff step for requeued tasks; doubles on every attempt.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 50;

/// Upper bound for the requeue backoff.
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 5_000;

/// User-Agent sent with every tile request. Public servers reject empty agents.
pub const USER_AGENT: &str = concat!("tileview/", env!("CARGO_PKG_VERSION"));

/// Fill colour for slots whose tile is still being loaded.
pub const NOT_LOADED_COLOR: [u8; 3] = [250, 250, 250];

/// Fill colour for tiles that could not be fetched.
pub const EMPTY_COLOR: [u8; 3] = [190, 190, 190];

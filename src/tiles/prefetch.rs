use crate::core::config::{LoaderConfig, PrefetchConfig, StorageConfig};
use crate::core::geo::TileCoord;
use crate::tiles::cache::{TileCache, TileKey};
use crate::tiles::fetch::TileFetcher;
use crate::tiles::resolver::TileResolver;
use crate::tiles::source::TileServer;
use fxhash::FxHashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone)]
struct Focus {
    center: TileCoord,
    server: Arc<TileServer>,
}

struct Shared {
    focus: Mutex<Option<Focus>>,
    changed: Condvar,
    /// Bumped on every focus change so a ring in progress can bail out
    generation: AtomicU64,
    radius: AtomicU32,
    shutdown: AtomicBool,
}

/// Background thread warming the cache in growing square rings around the
/// tile at the centre of the view.
pub struct PrefetchDaemon {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl PrefetchDaemon {
    pub fn spawn(
        config: &PrefetchConfig,
        loader: &LoaderConfig,
        storage: &StorageConfig,
        cache: TileCache,
        fetcher: Arc<dyn TileFetcher>,
    ) -> Self {
        let shared = Arc::new(Shared {
            focus: Mutex::new(None),
            changed: Condvar::new(),
            generation: AtomicU64::new(0),
            radius: AtomicU32::new(0),
            shutdown: AtomicBool::new(false),
        });

        let thread_shared = Arc::clone(&shared);
        let config = config.clone();
        let loader = loader.clone();
        let storage = storage.clone();
        let handle = thread::Builder::new()
            .name("tile-prefetch".into())
            .spawn(move || {
                let resolver = TileResolver::open(cache, &storage, fetcher, &loader);
                run(&thread_shared, &config, &resolver);
            })
            .map_err(|e| log::error!("failed to spawn tile prefetcher: {}", e))
            .ok();

        Self { shared, handle }
    }

    /// Moves the centre of interest. Restarts from the innermost ring when
    /// the tile or the server differs from the current one.
    pub fn set_center(&self, center: TileCoord, server: Arc<TileServer>) {
        let Ok(mut focus) = self.shared.focus.lock() else {
            return;
        };
        let unchanged = focus
            .as_ref()
            .map_or(false, |f| f.center == center && f.server.id == server.id);
        if unchanged {
            return;
        }
        *focus = Some(Focus { center, server });
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.changed.notify_one();
    }

    /// Radius of the ring being (or last) warmed; 0 before the first centre
    pub fn radius(&self) -> u32 {
        self.shared.radius.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for PrefetchDaemon {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.changed.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("tile prefetcher panicked");
            }
        }
    }
}

fn run(shared: &Shared, config: &PrefetchConfig, resolver: &TileResolver) {
    let mut seen = u64::MAX;
    let mut focus: Option<Focus> = None;
    let mut radius = 1;

    while !shared.shutdown.load(Ordering::SeqCst) {
        let generation = shared.generation.load(Ordering::SeqCst);
        if generation != seen {
            seen = generation;
            focus = shared.focus.lock().ok().and_then(|f| f.clone());
            radius = 1;
        }

        let Some(current) = focus.as_ref().filter(|_| radius <= config.max_radius) else {
            // nothing left to warm until the centre moves
            if let Ok(guard) = shared.focus.lock() {
                if shared.generation.load(Ordering::SeqCst) == seen && !shared.shutdown.load(Ordering::SeqCst) {
                    let _ = shared.changed.wait_timeout(guard, config.idle());
                }
            }
            continue;
        };

        shared.radius.store(radius, Ordering::SeqCst);
        let mut warmed = 0;
        for key in ring(current.center, radius, &current.server) {
            if shared.shutdown.load(Ordering::SeqCst) || shared.generation.load(Ordering::SeqCst) != seen {
                break;
            }
            if !resolver.cache().contains(&key) {
                // failures are ignored; the loader reports them for visible tiles
                resolver.resolve(&current.server, key, 0);
                warmed += 1;
            }
        }
        log::trace!("prefetch ring {} around {}: {} tiles", radius, current.center, warmed);
        radius += 1;
    }
}

/// Keys of the tiles on the perimeter of the square ring `radius` tiles out
/// from `center`, wrapped across the antimeridian. Cells past the poles are
/// skipped and a cell reached twice through wrapping is listed once.
pub fn ring(center: TileCoord, radius: u32, server: &TileServer) -> Vec<TileKey> {
    let r = radius as i64;
    let mut cells = Vec::with_capacity(8 * radius as usize);
    for dx in -r..=r {
        cells.push((center.x + dx, center.y - r));
        cells.push((center.x + dx, center.y + r));
    }
    for dy in (1 - r)..r {
        cells.push((center.x - r, center.y + dy));
        cells.push((center.x + r, center.y + dy));
    }

    let mut seen = FxHashSet::default();
    cells
        .into_iter()
        .filter_map(|(x, y)| TileKey::new(TileCoord::new(x, y, center.z), server.id).normalized())
        .filter(|key| seen.insert(*key))
        .collect()
}

use crate::{
    core::{
        config::MapConfig,
        constants::DEFAULT_REQUEST_TIMEOUT_MS,
        geo::{LatLng, Point, TileCoord, TilePoint},
        viewport::{ViewChange, Viewport},
    },
    tiles::{
        cache::TileCache,
        fetch::{HttpFetcher, TileFetcher},
        grid::{PatchOutcome, PatchStats, TileGrid},
        loader::TileLoader,
        prefetch::PrefetchDaemon,
        source::{ServerId, TileServer, TileServerRegistry},
        store::{open_store, TileStore},
    },
    traits::Drawable,
    MapError, Result,
};
use std::sync::Arc;

/// What one [`MapView::tick`] did with the loader results it drained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub applied: usize,
    /// Results for a zoom, server or slot that is no longer displayed
    pub stale: usize,
}

/// Handle returned by [`MapView::add_drawable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawableId(u64);

/// The map as seen by the GUI shell.
///
/// Owns the viewport and the tile grid and is meant to live on the UI
/// thread: the shell forwards input to it, calls [`tick`](Self::tick) on a
/// short timer and paints [`grid`](Self::grid). Loading happens on the
/// loader's worker threads and the prefetch thread, which only ever share the
/// cache with this side.
pub struct MapView {
    config: MapConfig,
    viewport: Viewport,
    registry: TileServerRegistry,
    grid: TileGrid,
    cache: TileCache,
    loader: TileLoader,
    prefetcher: Option<PrefetchDaemon>,
    store: Option<Box<dyn TileStore>>,
    drawables: Vec<(DrawableId, Box<dyn Drawable>)>,
    next_drawable: u64,
}

impl MapView {
    /// Creates a map fetching tiles over HTTP
    pub fn new(config: MapConfig, size: Point) -> Result<Self> {
        let fetcher = if config.loader.request_timeout_ms == DEFAULT_REQUEST_TIMEOUT_MS {
            HttpFetcher::shared()?
        } else {
            HttpFetcher::new(config.loader.request_timeout())?
        };
        Self::with_fetcher(config, size, Arc::new(fetcher))
    }

    /// Creates a map using a caller supplied fetcher
    pub fn with_fetcher(config: MapConfig, size: Point, fetcher: Arc<dyn TileFetcher>) -> Result<Self> {
        config.validate()?;

        let mut registry = TileServerRegistry::new(config.tile_servers.clone())?;
        if let Some(name) = &config.active_server {
            registry.set_active(name)?;
        }
        let server = registry.active();

        // created here first so every worker finds the schema in place
        let store = open_store(&config.storage, true)?;
        register_server(store.as_deref(), &server);

        let viewport = Viewport::new(config.center, config.zoom, size, server.tile_size, server.max_zoom)?;
        let cache = TileCache::new(config.cache.capacity);
        log::debug!(
            "tile cache holds up to {} tiles (about {} MiB)",
            config.cache.capacity,
            config.cache.estimated_memory_usage() >> 20
        );
        let loader = TileLoader::new(&config.loader, &config.storage, cache.clone(), Arc::clone(&fetcher));
        let prefetcher = config.prefetch.enabled.then(|| {
            PrefetchDaemon::spawn(&config.prefetch, &config.loader, &config.storage, cache.clone(), fetcher)
        });

        let mut map = Self {
            config,
            viewport,
            registry,
            grid: TileGrid::new(),
            cache,
            loader,
            prefetcher,
            store,
            drawables: Vec::new(),
            next_drawable: 0,
        };
        map.refresh();
        log::info!(
            "map ready at {:?}, zoom {}, server '{}'",
            map.position(),
            map.zoom(),
            map.tile_server()
        );
        Ok(map)
    }

    /// Centres the map on `center` at the current zoom
    pub fn set_center(&mut self, center: LatLng) -> Result<()> {
        if !center.is_valid() {
            return Err(MapError::InvalidViewport(format!(
                "({}, {}) is not a valid position",
                center.lat, center.lng
            )));
        }
        let change = self.viewport.set_center(center);
        self.apply_change(change);
        Ok(())
    }

    /// Zooms keeping the point under the relative anchor fixed; `(0.5, 0.5)`
    /// zooms around the centre, a cursor position zooms around the cursor.
    pub fn set_zoom(&mut self, zoom: f64, anchor_x: f64, anchor_y: f64) -> PatchStats {
        let change = self.viewport.set_zoom(zoom, anchor_x, anchor_y);
        self.apply_change(change)
    }

    /// Drags the map by a pixel delta
    pub fn pan(&mut self, dx: f64, dy: f64) -> PatchStats {
        let change = self.viewport.pan(dx, dy);
        self.apply_change(change)
    }

    pub fn resize(&mut self, width: f64, height: f64) -> Result<PatchStats> {
        let change = self.viewport.resize(Point::new(width, height))?;
        // the grid span follows the size even when the corners stay put
        let change = match change {
            ViewChange::Rezoomed => ViewChange::Rezoomed,
            _ => ViewChange::Moved,
        };
        Ok(self.apply_change(change))
    }

    /// Zooms and centres so that the box spanned by two corners is visible,
    /// picking the deepest zoom at which it fits.
    pub fn fit_bounding_box(&mut self, top_left: LatLng, bottom_right: LatLng) -> Result<()> {
        if !top_left.is_valid() || !bottom_right.is_valid() {
            return Err(MapError::InvalidBoundingBox("corners must be valid positions".into()));
        }
        if top_left.lat <= bottom_right.lat || top_left.lng >= bottom_right.lng {
            return Err(MapError::InvalidBoundingBox(format!(
                "({}, {}) is not north-west of ({}, {})",
                top_left.lat, top_left.lng, bottom_right.lat, bottom_right.lng
            )));
        }

        let (width, height) = self.viewport.span();
        let min_zoom = self.viewport.min_zoom().ceil() as u8;
        let max_zoom = self.viewport.max_zoom() as u8;
        let zoom = (min_zoom..=max_zoom)
            .rev()
            .find(|&z| {
                let tl = top_left.to_tile_point(z);
                let br = bottom_right.to_tile_point(z);
                br.x - tl.x <= width && br.y - tl.y <= height
            })
            .unwrap_or(min_zoom);

        let tl = top_left.to_tile_point(zoom);
        let br = bottom_right.to_tile_point(zoom);
        let middle = TilePoint::new((tl.x + br.x) / 2.0, (tl.y + br.y) / 2.0);
        let center = LatLng::from_tile_point(middle, zoom);

        self.viewport.set_zoom(zoom as f64, 0.5, 0.5);
        self.viewport.set_center(center);
        self.refresh();
        Ok(())
    }

    /// Switches to another registered tile server
    pub fn set_tile_server(&mut self, name: &str) -> Result<()> {
        let server = self.registry.set_active(name)?;
        self.switch_server(server)
    }

    /// Registers a tile server without activating it
    pub fn add_tile_server(&mut self, server: TileServer) -> Result<ServerId> {
        let replaces_active = self.registry.active().name == server.name;
        let id = self.registry.add(server)?;
        if replaces_active {
            self.switch_server(self.registry.active())?;
        }
        Ok(id)
    }

    /// Unregisters a tile server. When it was the active one the map moves on
    /// to a neighbouring server. Returns false for unknown names and for the
    /// last remaining server.
    pub fn remove_tile_server(&mut self, name: &str) -> Result<bool> {
        let was_active = self.registry.active().name == name;
        if !self.registry.remove(name) {
            return Ok(false);
        }
        if was_active {
            self.switch_server(self.registry.active())?;
        }
        Ok(true)
    }

    /// Name of the active tile server
    pub fn tile_server(&self) -> String {
        self.registry.active().name.clone()
    }

    pub fn active_server(&self) -> Arc<TileServer> {
        self.registry.active()
    }

    pub fn tile_servers(&self) -> Vec<&str> {
        self.registry.names()
    }

    /// Moves finished tiles from the loader into the grid. Call it on a short
    /// timer from the UI thread.
    pub fn tick(&mut self) -> TickStats {
        let zoom = self.viewport.tile_zoom();
        let mut stats = TickStats::default();
        for result in self.loader.try_recv_results() {
            if self.grid.apply_result(result, zoom) {
                stats.applied += 1;
            } else {
                stats.stale += 1;
            }
        }
        if stats.stale > 0 {
            log::trace!("dropped {} stale tile results", stats.stale);
        }
        if stats.applied > 0 {
            self.redraw();
        }
        stats
    }

    /// Centre of the view
    pub fn position(&self) -> LatLng {
        self.viewport.center()
    }

    /// Zoom level of the tiles on screen
    pub fn zoom(&self) -> u8 {
        self.viewport.tile_zoom()
    }

    /// Geographic position under a widget pixel, e.g. for click handling
    pub fn canvas_to_geo(&self, px: f64, py: f64) -> LatLng {
        self.viewport.pixel_to_geo(px, py)
    }

    /// Adds an element drawn over the tiles and draws it once
    pub fn add_drawable(&mut self, mut drawable: Box<dyn Drawable>) -> DrawableId {
        let id = DrawableId(self.next_drawable);
        self.next_drawable += 1;
        drawable.draw(&self.viewport);
        self.drawables.push((id, drawable));
        id
    }

    /// Takes one element off the map, handing it back to the caller
    pub fn remove_drawable(&mut self, id: DrawableId) -> Option<Box<dyn Drawable>> {
        let index = self.drawables.iter().position(|(d, _)| *d == id)?;
        Some(self.drawables.remove(index).1)
    }

    pub fn clear_drawables(&mut self) {
        self.drawables.clear();
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Tile tasks queued or in flight
    pub fn pending_tiles(&self) -> usize {
        self.loader.pending_count()
    }

    /// Ring the prefetcher is working on, if it runs
    pub fn prefetch_radius(&self) -> Option<u32> {
        self.prefetcher.as_ref().map(PrefetchDaemon::radius)
    }

    fn switch_server(&mut self, server: Arc<TileServer>) -> Result<()> {
        register_server(self.store.as_deref(), &server);
        self.viewport = Viewport::new(
            self.viewport.center(),
            self.viewport.zoom(),
            self.viewport.size(),
            server.tile_size,
            server.max_zoom,
        )?;
        self.grid.clear();
        self.refresh();
        log::info!("switched to tile server '{}'", server.name);
        Ok(())
    }

    fn apply_change(&mut self, change: ViewChange) -> PatchStats {
        let server = self.registry.active();
        let outcome = match change {
            ViewChange::Unchanged => return PatchStats::default(),
            ViewChange::Moved => self.grid.patch(&self.viewport, &server, &self.cache),
            ViewChange::Recentered | ViewChange::Rezoomed => return self.refresh(),
        };
        self.finish_update(outcome, server)
    }

    /// Rebuilds the grid from scratch. Tasks queued for the old grid would
    /// only produce stale results, so they are dropped first.
    fn refresh(&mut self) -> PatchStats {
        self.loader.clear_pending();
        let server = self.registry.active();
        let outcome = self.grid.rebuild(&self.viewport, &server, &self.cache);
        self.finish_update(outcome, server)
    }

    fn finish_update(&mut self, outcome: PatchOutcome, server: Arc<TileServer>) -> PatchStats {
        if !outcome.tasks.is_empty() {
            self.loader.submit_batch(outcome.tasks);
        }
        if let Some(prefetcher) = &self.prefetcher {
            prefetcher.set_center(self.center_tile(), server);
        }
        self.redraw();
        outcome.stats
    }

    fn center_tile(&self) -> TileCoord {
        self.viewport.center_tile()
    }

    fn redraw(&mut self) {
        for (_, drawable) in &mut self.drawables {
            drawable.draw(&self.viewport);
        }
    }
}

fn register_server(store: Option<&dyn TileStore>, server: &TileServer) {
    if let Some(store) = store {
        if let Err(e) = store.register_server(server) {
            log::warn!("could not record tile server '{}' in the store: {}", server.name, e);
        }
    }
}

//! The grid of tile slots covering the visible window.
//!
//! Slots are stored column-major (`columns[col][row]`). Panning keeps the
//! slots that are still visible and only adds or drops whole rows and
//! columns at the edges, so a tile already on screen is never requested
//! again while the window moves.

use crate::core::geo::{to_pixel, Point, TileCoord, TilePoint};
use crate::core::viewport::Viewport;
use crate::tiles::cache::{TileCache, TileKey};
use crate::tiles::image::TileImage;
use crate::tiles::loader::{TileResult, TileTask};
use crate::tiles::source::{ServerId, TileServer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identity of a slot for as long as it exists in the grid. Results addressed
/// to a slot that was dropped in the meantime are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(pub u64);

#[derive(Debug, Clone)]
pub struct GridSlot {
    pub id: SlotId,
    pub coord: TileCoord,
    pub image: TileImage,
    /// Widget pixel of the tile's upper-left corner
    pub pixel: Point,
}

/// The block of tiles a viewport needs: a fixed number of columns and rows
/// starting at the tile under the upper-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridWindow {
    pub zoom: u8,
    pub first_column: i64,
    pub first_row: i64,
    pub columns: usize,
    pub rows: usize,
}

impl GridWindow {
    pub fn for_viewport(viewport: &Viewport) -> Self {
        let ul = viewport.upper_left();
        let size = viewport.size();
        let tile_size = viewport.tile_size() as f64;
        Self {
            zoom: viewport.tile_zoom(),
            first_column: ul.x.floor() as i64,
            first_row: ul.y.floor() as i64,
            columns: (size.x / tile_size).ceil() as usize + 1,
            rows: (size.y / tile_size).ceil() as usize + 1,
        }
    }

    pub fn last_column(&self) -> i64 {
        self.first_column + self.columns as i64 - 1
    }

    pub fn last_row(&self) -> i64 {
        self.first_row + self.rows as i64 - 1
    }

    pub fn overlaps(&self, other: &GridWindow) -> bool {
        self.zoom == other.zoom
            && self.first_column <= other.last_column()
            && other.first_column <= self.last_column()
            && self.first_row <= other.last_row()
            && other.first_row <= self.last_row()
    }
}

/// Structural changes made by one grid update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchStats {
    pub rows_inserted: usize,
    pub rows_removed: usize,
    pub columns_inserted: usize,
    pub columns_removed: usize,
    /// Every slot was discarded and recreated
    pub rebuilt: bool,
}

impl PatchStats {
    pub fn is_unchanged(&self) -> bool {
        *self == PatchStats::default()
    }
}

/// What a grid update changed and which tiles must now be loaded.
#[derive(Debug, Clone, Default)]
pub struct PatchOutcome {
    pub stats: PatchStats,
    pub tasks: Vec<TileTask>,
}

#[derive(Debug, Default)]
pub struct TileGrid {
    columns: Vec<Vec<GridSlot>>,
    zoom: Option<u8>,
    server: Option<ServerId>,
    next_id: u64,
}

/// Slot factory for one update; resolves new slots from the cache and
/// collects tasks for the rest.
struct SlotMaker<'a> {
    server: &'a Arc<TileServer>,
    cache: &'a TileCache,
    tasks: Vec<TileTask>,
}

impl TileGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards every slot and recreates the grid for `viewport`
    pub fn rebuild(&mut self, viewport: &Viewport, server: &Arc<TileServer>, cache: &TileCache) -> PatchOutcome {
        let window = GridWindow::for_viewport(viewport);
        let mut maker = SlotMaker::new(server, cache);

        let mut columns = Vec::with_capacity(window.columns);
        for c in 0..window.columns as i64 {
            let column = (0..window.rows as i64)
                .map(|r| {
                    let coord = TileCoord::new(window.first_column + c, window.first_row + r, window.zoom);
                    self.make_slot(coord, &mut maker)
                })
                .collect();
            columns.push(column);
        }
        self.columns = columns;
        self.zoom = Some(window.zoom);
        self.server = Some(server.id);
        self.update_pixels(viewport);

        // the loader serves the newest task first, so queue the centre last
        let center = viewport.center_point();
        let mut tasks = maker.tasks;
        tasks.sort_by(|a, b| {
            distance_sq(&b.key.coord, center).total_cmp(&distance_sq(&a.key.coord, center))
        });

        log::debug!(
            "rebuilt {}x{} grid at zoom {}, {} tiles to load",
            window.columns,
            window.rows,
            window.zoom,
            tasks.len()
        );
        PatchOutcome {
            stats: PatchStats {
                rebuilt: true,
                ..PatchStats::default()
            },
            tasks,
        }
    }

    /// Brings the grid in line with `viewport` by adding and dropping edge
    /// rows and columns. Falls back to a rebuild when nothing can be kept.
    pub fn patch(&mut self, viewport: &Viewport, server: &Arc<TileServer>, cache: &TileCache) -> PatchOutcome {
        let target = GridWindow::for_viewport(viewport);
        let keep = match self.window() {
            Some(current) => self.server == Some(server.id) && current.overlaps(&target),
            None => false,
        };
        if !keep {
            return self.rebuild(viewport, server, cache);
        }

        let mut stats = PatchStats::default();
        let mut maker = SlotMaker::new(server, cache);

        // shrink first so nothing is created only to be dropped again
        while self.first_coord().map_or(false, |c| c.x < target.first_column) && self.columns.len() > 1 {
            self.columns.remove(0);
            stats.columns_removed += 1;
        }
        while self.last_coord().map_or(false, |c| c.x > target.last_column()) && self.columns.len() > 1 {
            self.columns.pop();
            stats.columns_removed += 1;
        }
        while self.first_coord().map_or(false, |c| c.y < target.first_row) && self.row_count() > 1 {
            for column in &mut self.columns {
                column.remove(0);
            }
            stats.rows_removed += 1;
        }
        while self.last_coord().map_or(false, |c| c.y > target.last_row()) && self.row_count() > 1 {
            for column in &mut self.columns {
                column.pop();
            }
            stats.rows_removed += 1;
        }

        while let Some(first) = self.first_coord().filter(|c| c.x > target.first_column) {
            let column = self.make_column(first.x - 1, &mut maker);
            self.columns.insert(0, column);
            stats.columns_inserted += 1;
        }
        while let Some(last) = self.last_coord().filter(|c| c.x < target.last_column()) {
            let column = self.make_column(last.x + 1, &mut maker);
            self.columns.push(column);
            stats.columns_inserted += 1;
        }
        while let Some(first) = self.first_coord().filter(|c| c.y > target.first_row) {
            let y = first.y - 1;
            for c in 0..self.columns.len() {
                let coord = TileCoord::new(self.columns[c][0].coord.x, y, target.zoom);
                let slot = self.make_slot(coord, &mut maker);
                self.columns[c].insert(0, slot);
            }
            stats.rows_inserted += 1;
        }
        while let Some(last) = self.last_coord().filter(|c| c.y < target.last_row()) {
            let y = last.y + 1;
            for c in 0..self.columns.len() {
                let coord = TileCoord::new(self.columns[c][0].coord.x, y, target.zoom);
                let slot = self.make_slot(coord, &mut maker);
                self.columns[c].push(slot);
            }
            stats.rows_inserted += 1;
        }

        self.update_pixels(viewport);
        if !stats.is_unchanged() {
            log::trace!("patched grid: {:?}", stats);
        }
        PatchOutcome {
            stats,
            tasks: maker.tasks,
        }
    }

    /// Stores a loader result in its slot. Returns false (and changes
    /// nothing) when the result is for another zoom, another server or a slot
    /// that no longer exists.
    pub fn apply_result(&mut self, result: TileResult, zoom: u8) -> bool {
        if self.zoom != Some(zoom) || result.key.coord.z != zoom || self.server != Some(result.key.server) {
            return false;
        }
        let slot = self
            .columns
            .iter_mut()
            .flat_map(|column| column.iter_mut())
            .find(|slot| slot.id == result.slot);

        match slot {
            Some(slot) if slot.coord == result.key.coord => {
                slot.image = result.image;
                true
            }
            _ => false,
        }
    }

    /// The window currently covered, if any
    pub fn window(&self) -> Option<GridWindow> {
        let first = self.first_coord()?;
        Some(GridWindow {
            zoom: first.z,
            first_column: first.x,
            first_row: first.y,
            columns: self.columns.len(),
            rows: self.row_count(),
        })
    }

    /// `(columns, rows)`
    pub fn dimensions(&self) -> (usize, usize) {
        (self.columns.len(), self.row_count())
    }

    pub fn slot(&self, column: usize, row: usize) -> Option<&GridSlot> {
        self.columns.get(column)?.get(row)
    }

    pub fn slots(&self) -> impl Iterator<Item = &GridSlot> {
        self.columns.iter().flat_map(|column| column.iter())
    }

    pub fn columns(&self) -> &[Vec<GridSlot>] {
        &self.columns
    }

    pub fn zoom(&self) -> Option<u8> {
        self.zoom
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Slots still waiting for their image
    pub fn pending_slots(&self) -> usize {
        self.slots().filter(|slot| matches!(slot.image, TileImage::NotLoaded)).count()
    }

    pub fn clear(&mut self) {
        self.columns.clear();
        self.zoom = None;
        self.server = None;
    }

    fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    fn first_coord(&self) -> Option<TileCoord> {
        self.columns.first()?.first().map(|slot| slot.coord)
    }

    fn last_coord(&self) -> Option<TileCoord> {
        self.columns.last()?.last().map(|slot| slot.coord)
    }

    fn make_column(&mut self, x: i64, maker: &mut SlotMaker) -> Vec<GridSlot> {
        let Some(first) = self.first_coord() else {
            return Vec::new();
        };
        (0..self.row_count() as i64)
            .map(|r| self.make_slot(TileCoord::new(x, first.y + r, first.z), maker))
            .collect()
    }

    fn make_slot(&mut self, coord: TileCoord, maker: &mut SlotMaker) -> GridSlot {
        let id = SlotId(self.next_id);
        self.next_id += 1;
        GridSlot {
            id,
            coord,
            image: maker.image_for(id, coord),
            pixel: Point::default(),
        }
    }

    fn update_pixels(&mut self, viewport: &Viewport) {
        for slot in self.columns.iter_mut().flat_map(|column| column.iter_mut()) {
            slot.pixel = to_pixel(TilePoint::new(slot.coord.x as f64, slot.coord.y as f64), viewport);
        }
    }
}

impl<'a> SlotMaker<'a> {
    fn new(server: &'a Arc<TileServer>, cache: &'a TileCache) -> Self {
        Self {
            server,
            cache,
            tasks: Vec::new(),
        }
    }

    fn image_for(&mut self, id: SlotId, coord: TileCoord) -> TileImage {
        // overhang past the world edge stays blank
        if !coord.is_valid() || coord.z > self.server.max_zoom {
            return TileImage::Empty;
        }
        let key = TileKey::new(coord, self.server.id);
        match self.cache.get(&key) {
            Some(image) => TileImage::Loaded(image),
            None => {
                self.tasks.push(TileTask::new(key, id, Arc::clone(self.server)));
                TileImage::NotLoaded
            }
        }
    }
}

fn distance_sq(coord: &TileCoord, center: TilePoint) -> f64 {
    let dx = coord.x as f64 + 0.5 - center.x;
    let dy = coord.y as f64 + 0.5 - center.y;
    dx * dx + dy * dy
}

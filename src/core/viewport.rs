use crate::core::constants::MAX_SUPPORTED_ZOOM;
use crate::core::geo::{self, LatLng, Point, TileCoord, TilePoint};
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};

/// What a viewport mutation means for the tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewChange {
    /// Nothing moved; the grid can be left alone
    Unchanged,
    /// Corners shifted at the same tile zoom; patch the grid
    Moved,
    /// Jumped to a new centre; rebuild the grid
    Recentered,
    /// The rounded zoom changed; every tile identity is different
    Rezoomed,
}

/// The rectangular window of tile space currently mapped onto the widget.
///
/// Corners are expressed on the tile grid of [`Viewport::tile_zoom`]. The
/// window always spans `size / tile_size` tiles on each axis and is kept
/// inside the world by [`Viewport::clamp_to_world`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    zoom: f64,
    upper_left: TilePoint,
    lower_right: TilePoint,
    size: Point,
    tile_size: u32,
    min_zoom: f64,
    max_zoom: f64,
}

impl Viewport {
    /// Creates a viewport of `size` pixels centred on `center`
    pub fn new(center: LatLng, zoom: f64, size: Point, tile_size: u32, max_zoom: u8) -> Result<Self> {
        Self::validate_size(size)?;
        if tile_size == 0 {
            return Err(MapError::InvalidViewport("tile size must be positive".into()));
        }
        let max_zoom = max_zoom.min(MAX_SUPPORTED_ZOOM) as f64;
        let min_zoom = Self::min_zoom_for(size, tile_size).min(max_zoom);

        let mut viewport = Self {
            zoom: zoom.clamp(min_zoom, max_zoom),
            upper_left: TilePoint::new(0.0, 0.0),
            lower_right: TilePoint::new(0.0, 0.0),
            size,
            tile_size,
            min_zoom,
            max_zoom,
        };
        let anchor = center.to_tile_point(viewport.tile_zoom());
        viewport.place_around(anchor, 0.5, 0.5);
        viewport.clamp_to_world();
        Ok(viewport)
    }

    /// Lowest zoom at which the world still covers the whole widget
    pub fn min_zoom_for(size: Point, tile_size: u32) -> f64 {
        let tiles = (size.x.max(size.y) / tile_size as f64).ceil().max(1.0);
        tiles.log2().ceil()
    }

    fn validate_size(size: Point) -> Result<()> {
        if !(size.x.is_finite() && size.y.is_finite()) || size.x <= 0.0 || size.y <= 0.0 {
            return Err(MapError::InvalidViewport(format!(
                "widget size must be positive, got {}x{}",
                size.x, size.y
            )));
        }
        Ok(())
    }

    /// The continuous zoom as driven by wheel input
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// The integer zoom whose tiles are displayed
    pub fn tile_zoom(&self) -> u8 {
        self.zoom.round() as u8
    }

    pub fn min_zoom(&self) -> f64 {
        self.min_zoom
    }

    pub fn max_zoom(&self) -> f64 {
        self.max_zoom
    }

    pub fn upper_left(&self) -> TilePoint {
        self.upper_left
    }

    pub fn lower_right(&self) -> TilePoint {
        self.lower_right
    }

    /// Widget size in pixels
    pub fn size(&self) -> Point {
        self.size
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Window extent in tiles, `(width, height)`
    pub fn span(&self) -> (f64, f64) {
        (
            self.size.x / self.tile_size as f64,
            self.size.y / self.tile_size as f64,
        )
    }

    /// Middle of the window in tile space
    pub fn center_point(&self) -> TilePoint {
        TilePoint::new(
            (self.upper_left.x + self.lower_right.x) / 2.0,
            (self.upper_left.y + self.lower_right.y) / 2.0,
        )
    }

    /// Middle of the window in degrees
    pub fn center(&self) -> LatLng {
        LatLng::from_tile_point(self.center_point(), self.tile_zoom())
    }

    /// The tile under the middle of the window
    pub fn center_tile(&self) -> TileCoord {
        self.center_point().tile(self.tile_zoom())
    }

    /// Tile-space position under a widget pixel
    pub fn pixel_to_tile(&self, px: f64, py: f64) -> TilePoint {
        TilePoint::new(
            self.upper_left.x + (self.lower_right.x - self.upper_left.x) * px / self.size.x,
            self.upper_left.y + (self.lower_right.y - self.upper_left.y) * py / self.size.y,
        )
    }

    /// Geographic position under a widget pixel
    pub fn pixel_to_geo(&self, px: f64, py: f64) -> LatLng {
        LatLng::from_tile_point(self.pixel_to_tile(px, py), self.tile_zoom())
    }

    /// Widget pixel of a tile-space position at the current tile zoom
    pub fn tile_to_pixel(&self, point: TilePoint) -> Point {
        geo::to_pixel(point, self)
    }

    /// Widget pixel of a geographic position
    pub fn geo_to_pixel(&self, lat_lng: &LatLng) -> Point {
        self.tile_to_pixel(lat_lng.to_tile_point(self.tile_zoom()))
    }

    /// Centres the window on `center` at the current zoom
    pub fn set_center(&mut self, center: LatLng) -> ViewChange {
        let anchor = center.to_tile_point(self.tile_zoom());
        self.place_around(anchor, 0.5, 0.5);
        self.clamp_to_world();
        ViewChange::Recentered
    }

    /// Changes zoom while keeping the point under the relative anchor
    /// (fractions of the widget, 0.5/0.5 is the middle) fixed on screen
    pub fn set_zoom(&mut self, zoom: f64, anchor_x: f64, anchor_y: f64) -> ViewChange {
        if !(zoom.is_finite() && anchor_x.is_finite() && anchor_y.is_finite()) {
            return ViewChange::Unchanged;
        }
        let rel_x = anchor_x.clamp(0.0, 1.0);
        let rel_y = anchor_y.clamp(0.0, 1.0);
        let anchor = self.pixel_to_geo(rel_x * self.size.x, rel_y * self.size.y);
        self.rezoom_around(anchor, zoom, rel_x, rel_y)
    }

    /// Shifts the window by a pixel delta
    pub fn pan(&mut self, dx: f64, dy: f64) -> ViewChange {
        if !(dx.is_finite() && dy.is_finite()) {
            return ViewChange::Unchanged;
        }
        let before = (self.upper_left, self.lower_right);
        let tile_size = self.tile_size as f64;
        self.upper_left = self.upper_left.offset(dx / tile_size, dy / tile_size);
        self.lower_right = self.lower_right.offset(dx / tile_size, dy / tile_size);
        self.clamp_to_world();

        if before == (self.upper_left, self.lower_right) {
            ViewChange::Unchanged
        } else {
            ViewChange::Moved
        }
    }

    /// Adapts to a new widget size, keeping the centre in place
    pub fn resize(&mut self, size: Point) -> Result<ViewChange> {
        Self::validate_size(size)?;
        let center = self.center();
        self.size = size;
        self.min_zoom = Self::min_zoom_for(size, self.tile_size).min(self.max_zoom);
        Ok(self.rezoom_around(center, self.zoom, 0.5, 0.5))
    }

    /// Applies a tile server's zoom limit
    pub fn set_max_zoom(&mut self, max_zoom: u8) -> ViewChange {
        let center = self.center();
        self.max_zoom = max_zoom.min(MAX_SUPPORTED_ZOOM) as f64;
        self.min_zoom = Self::min_zoom_for(self.size, self.tile_size).min(self.max_zoom);
        self.rezoom_around(center, self.zoom, 0.5, 0.5)
    }

    fn rezoom_around(&mut self, anchor: LatLng, zoom: f64, rel_x: f64, rel_y: f64) -> ViewChange {
        let before = (self.upper_left, self.lower_right);
        let old_tile_zoom = self.tile_zoom();
        self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);

        let anchor = anchor.to_tile_point(self.tile_zoom());
        self.place_around(anchor, rel_x, rel_y);
        self.clamp_to_world();

        if self.tile_zoom() != old_tile_zoom {
            ViewChange::Rezoomed
        } else if before != (self.upper_left, self.lower_right) {
            ViewChange::Moved
        } else {
            ViewChange::Unchanged
        }
    }

    fn place_around(&mut self, anchor: TilePoint, rel_x: f64, rel_y: f64) {
        let (width, height) = self.span();
        self.upper_left = anchor.offset(-rel_x * width, -rel_y * height);
        self.lower_right = anchor.offset((1.0 - rel_x) * width, (1.0 - rel_y) * height);
    }

    /// Translates the window by the smallest amount that keeps it inside
    /// `[0, 2^zoom)` on both axes. A window wider than the world is centred
    /// on it instead. Never resizes; a no-op on a valid window.
    pub fn clamp_to_world(&mut self) {
        let world = TileCoord::world_size(self.tile_zoom()) as f64;
        clamp_axis(&mut self.upper_left.x, &mut self.lower_right.x, world);
        clamp_axis(&mut self.upper_left.y, &mut self.lower_right.y, world);
    }
}

// An oversized window is centred. Otherwise the violated edge is pinned
// exactly so a second pass sees a valid window.
fn clamp_axis(low: &mut f64, high: &mut f64, world: f64) {
    let span = *high - *low;
    if span > world {
        *low = (world - span) / 2.0;
        *high = *low + span;
    } else if *low < 0.0 {
        *high -= *low;
        *low = 0.0;
    } else if *high > world {
        *low -= *high - world;
        *high = world;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tomsk() -> Viewport {
        Viewport::new(
            LatLng::new(56.451127, 84.964496),
            17.0,
            Point::new(300.0, 200.0),
            256,
            19,
        )
        .unwrap()
    }

    fn assert_span(viewport: &Viewport) {
        let (w, h) = viewport.span();
        let ul = viewport.upper_left();
        let lr = viewport.lower_right();
        assert!((lr.x - ul.x - w).abs() < 1e-9);
        assert!((lr.y - ul.y - h).abs() < 1e-9);
    }

    #[test]
    fn test_viewport_creation() {
        let viewport = tomsk();
        assert_eq!(viewport.tile_zoom(), 17);
        assert_eq!(viewport.min_zoom(), 1.0);
        assert_span(&viewport);

        let center = viewport.center();
        assert!((center.lat - 56.451127).abs() < 1e-6);
        assert!((center.lng - 84.964496).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_size_rejected() {
        let err = Viewport::new(LatLng::default(), 3.0, Point::new(0.0, 200.0), 256, 19);
        assert!(matches!(err, Err(MapError::InvalidViewport(_))));
    }

    #[test]
    fn test_zoom_limits() {
        let mut viewport = tomsk();
        viewport.set_zoom(0.0, 0.5, 0.5);
        assert_eq!(viewport.zoom(), 1.0);

        viewport.set_zoom(25.0, 0.5, 0.5);
        assert_eq!(viewport.zoom(), 19.0);
    }

    #[test]
    fn test_pan_round_trip() {
        let mut viewport = tomsk();
        let ul = viewport.upper_left();
        let lr = viewport.lower_right();

        assert_eq!(viewport.pan(123.0, -45.5), ViewChange::Moved);
        viewport.pan(-123.0, 45.5);

        assert!((viewport.upper_left().x - ul.x).abs() < 1e-9);
        assert!((viewport.upper_left().y - ul.y).abs() < 1e-9);
        assert!((viewport.lower_right().x - lr.x).abs() < 1e-9);
        assert!((viewport.lower_right().y - lr.y).abs() < 1e-9);
        assert_eq!(viewport.pan(0.0, 0.0), ViewChange::Unchanged);
    }

    #[test]
    fn test_border_clamp_keeps_window_inside_world() {
        let mut viewport =
            Viewport::new(LatLng::new(0.0, 0.0), 2.0, Point::new(300.0, 200.0), 256, 19).unwrap();
        viewport.pan(-10_000.0, -10_000.0);
        assert_eq!(viewport.upper_left(), TilePoint::new(0.0, 0.0));
        assert_span(&viewport);

        viewport.pan(1_000_000.0, 1_000_000.0);
        assert_eq!(viewport.lower_right().x, 4.0);
        assert_eq!(viewport.lower_right().y, 4.0);
        assert_span(&viewport);
    }

    #[test]
    fn test_border_clamp_idempotent() {
        let mut viewport =
            Viewport::new(LatLng::new(84.0, 179.0), 3.0, Point::new(300.0, 200.0), 256, 19).unwrap();
        let once = viewport.clone();
        viewport.clamp_to_world();
        assert_eq!(viewport, once);
    }

    #[test]
    fn test_non_finite_input_is_ignored() {
        let mut viewport = tomsk();
        let before = viewport.clone();

        assert_eq!(viewport.pan(f64::NAN, 0.0), ViewChange::Unchanged);
        assert_eq!(viewport.pan(0.0, f64::INFINITY), ViewChange::Unchanged);
        assert_eq!(viewport.set_zoom(f64::NAN, 0.5, 0.5), ViewChange::Unchanged);
        assert_eq!(viewport.set_zoom(18.0, f64::NEG_INFINITY, 0.5), ViewChange::Unchanged);
        assert_eq!(viewport, before);
    }

    #[test]
    fn test_window_wider_than_world_is_centred() {
        // 2000px needs zoom 3, but the server stops at 1
        let mut viewport =
            Viewport::new(LatLng::new(40.0, -100.0), 5.0, Point::new(2000.0, 2000.0), 256, 1).unwrap();
        assert_eq!(viewport.tile_zoom(), 1);
        assert_span(&viewport);
        let middle = viewport.center_point();
        assert!((middle.x - 1.0).abs() < 1e-9);
        assert!((middle.y - 1.0).abs() < 1e-9);

        let once = viewport.upper_left();
        viewport.clamp_to_world();
        viewport.pan(300.0, -300.0);
        viewport.clamp_to_world();
        assert!((viewport.upper_left().x - once.x).abs() < 1e-9);
        assert!((viewport.upper_left().y - once.y).abs() < 1e-9);
        assert_span(&viewport);
    }

    #[test]
    fn test_set_zoom_keeps_center() {
        let mut viewport = tomsk();
        let before = viewport.center();

        assert_eq!(viewport.set_zoom(18.0, 0.5, 0.5), ViewChange::Rezoomed);
        assert_eq!(viewport.tile_zoom(), 18);
        assert_span(&viewport);

        let after = viewport.center();
        assert!((after.lat - before.lat).abs() < 1e-6);
        assert!((after.lng - before.lng).abs() < 1e-6);
    }

    #[test]
    fn test_set_zoom_keeps_anchor_under_cursor() {
        let mut viewport = tomsk();
        let under_cursor = viewport.pixel_to_geo(75.0, 50.0);

        viewport.set_zoom(16.0, 0.25, 0.25);
        let after = viewport.pixel_to_geo(75.0, 50.0);
        assert!((after.lat - under_cursor.lat).abs() < 1e-6);
        assert!((after.lng - under_cursor.lng).abs() < 1e-6);
    }

    #[test]
    fn test_fractional_zoom_within_same_tile_zoom() {
        let mut viewport = tomsk();
        assert_ne!(viewport.set_zoom(17.3, 0.5, 0.5), ViewChange::Rezoomed);
        assert_eq!(viewport.tile_zoom(), 17);
        assert_eq!(viewport.set_zoom(17.6, 0.5, 0.5), ViewChange::Rezoomed);
        assert_eq!(viewport.tile_zoom(), 18);
    }

    #[test]
    fn test_resize_updates_min_zoom() {
        let mut viewport = tomsk();
        viewport.resize(Point::new(1200.0, 800.0)).unwrap();
        assert_eq!(viewport.min_zoom(), 3.0);
        assert_span(&viewport);

        let center = viewport.center();
        assert!((center.lat - 56.451127).abs() < 1e-6);
    }

    #[test]
    fn test_pixel_geo_conversion() {
        let viewport = tomsk();
        let geo = viewport.pixel_to_geo(150.0, 100.0);
        let pixel = viewport.geo_to_pixel(&geo);
        assert!((pixel.x - 150.0).abs() < 1e-6);
        assert!((pixel.y - 100.0).abs() < 1e-6);
    }
}

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::core::constants::MAX_LATITUDE;
use crate::core::viewport::Viewport;

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Validates that the coordinates are within valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat >= -90.0 && self.lat <= 90.0 && self.lng >= -180.0 && self.lng <= 180.0
    }

    /// Clamps latitude to the Web Mercator limit
    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
    }

    /// Projects onto the tile grid at `zoom`, keeping sub-tile precision
    pub fn to_tile_point(&self, zoom: u8) -> TilePoint {
        let (x, y) = to_tile(self.lat, self.lng, zoom);
        TilePoint::new(x, y)
    }

    /// Inverse of [`LatLng::to_tile_point`]
    pub fn from_tile_point(point: TilePoint, zoom: u8) -> Self {
        let (lat, lng) = to_geo(point.x, point.y, zoom);
        Self::new(lat, lng)
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a point in screen (widget pixel) coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// A fractional position on the tile grid of some zoom level.
///
/// Viewport corners are `TilePoint`s; the zoom they belong to is carried by
/// the viewport itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TilePoint {
    pub x: f64,
    pub y: f64,
}

impl TilePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(&self, dx: f64, dy: f64) -> TilePoint {
        TilePoint::new(self.x + dx, self.y + dy)
    }

    /// The concrete tile containing this point
    pub fn tile(&self, zoom: u8) -> TileCoord {
        TileCoord::new(self.x.floor() as i64, self.y.floor() as i64, zoom)
    }
}

/// Represents a tile coordinate in the slippy map tile system.
///
/// `x` and `y` are signed so that neighbourhood arithmetic may step past the
/// world edge; [`TileCoord::wrapped`] brings such a coordinate back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: i64,
    pub y: i64,
    pub z: u8,
}

impl TileCoord {
    pub fn new(x: i64, y: i64, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Creates the tile coordinate containing a LatLng at the given zoom level
    pub fn from_lat_lng(lat_lng: &LatLng, zoom: u8) -> Self {
        lat_lng.to_tile_point(zoom).tile(zoom)
    }

    /// Converts tile coordinate to LatLng (northwest corner)
    pub fn to_lat_lng(&self) -> LatLng {
        LatLng::from_tile_point(TilePoint::new(self.x as f64, self.y as f64), self.z)
    }

    /// Number of tiles along one axis at this zoom level
    pub fn world_size(zoom: u8) -> i64 {
        1_i64 << zoom
    }

    /// Checks if the tile lies inside the world at its zoom level
    pub fn is_valid(&self) -> bool {
        let n = Self::world_size(self.z);
        (0..n).contains(&self.x) && (0..n).contains(&self.y)
    }

    /// Wraps `x` across the antimeridian; there is nothing to wrap to past the
    /// poles, so an out-of-range `y` yields `None`.
    pub fn wrapped(&self) -> Option<TileCoord> {
        let n = Self::world_size(self.z);
        if !(0..n).contains(&self.y) {
            return None;
        }
        Some(TileCoord::new(self.x.rem_euclid(n), self.y, self.z))
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Web Mercator projection of degrees onto the slippy tile grid at `zoom`.
/// Longitude maps linearly; latitude goes through the inverse Gudermannian.
pub fn to_tile(lat: f64, lng: f64, zoom: u8) -> (f64, f64) {
    let n = TileCoord::world_size(zoom) as f64;
    let lat_rad = LatLng::clamp_lat(lat).to_radians();
    let x = (lng + 180.0) / 360.0 * n;
    let y = (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n;
    (x, y)
}

/// Exact inverse of [`to_tile`].
pub fn to_geo(x: f64, y: f64, zoom: u8) -> (f64, f64) {
    let n = TileCoord::world_size(zoom) as f64;
    let lng = x / n * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees();
    (lat, lng)
}

/// Affine map from the viewport's tile-space window onto widget pixels.
pub fn to_pixel(point: TilePoint, viewport: &Viewport) -> Point {
    let ul = viewport.upper_left();
    let lr = viewport.lower_right();
    let size = viewport.size();
    Point::new(
        (point.x - ul.x) / (lr.x - ul.x) * size.x,
        (point.y - ul.y) / (lr.y - ul.y) * size.y,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lat_lng_creation() {
        let coord = LatLng::new(40.7128, -74.0060);
        assert_eq!(coord.lat, 40.7128);
        assert_eq!(coord.lng, -74.0060);
        assert!(coord.is_valid());
    }

    #[test]
    fn test_geo_tile_round_trip() {
        let samples = [
            (0.0, 0.0),
            (56.451127, 84.964496),
            (-33.8688, 151.2093),
            (85.0, -179.999),
            (-85.0, 179.999),
            (40.7128, -74.0060),
        ];
        for zoom in 0..=22u8 {
            for &(lat, lng) in &samples {
                let (x, y) = to_tile(lat, lng, zoom);
                let (lat2, lng2) = to_geo(x, y, zoom);
                assert!((lat - lat2).abs() < 1e-6, "lat {} vs {} at z{}", lat, lat2, zoom);
                assert!((lng - lng2).abs() < 1e-6, "lng {} vs {} at z{}", lng, lng2, zoom);
            }
        }
    }

    #[test]
    fn test_known_tile() {
        // Null island sits on the corner of the four central tiles
        let (x, y) = to_tile(0.0, 0.0, 1);
        assert!((x - 1.0).abs() < 1e-12);
        assert!((y - 1.0).abs() < 1e-12);

        let berlin = TileCoord::from_lat_lng(&LatLng::new(52.5163, 13.3777), 10);
        assert_eq!(berlin, TileCoord::new(550, 335, 10));
    }

    #[test]
    fn test_latitude_clamped_past_mercator_limit() {
        let (_, y) = to_tile(89.9, 0.0, 3);
        let (_, y_limit) = to_tile(MAX_LATITUDE, 0.0, 3);
        assert_eq!(y, y_limit);
        assert!(y.abs() < 1e-6);
    }

    #[test]
    fn test_wrapped_tile() {
        let tile = TileCoord::new(-1, 2, 2);
        assert_eq!(tile.wrapped(), Some(TileCoord::new(3, 2, 2)));
        assert_eq!(TileCoord::new(4, 0, 2).wrapped(), Some(TileCoord::new(0, 0, 2)));
        assert_eq!(TileCoord::new(0, 4, 2).wrapped(), None);
        assert_eq!(TileCoord::new(0, -1, 2).wrapped(), None);
        assert!(!tile.is_valid());
        assert!(TileCoord::new(3, 3, 2).is_valid());
    }
}

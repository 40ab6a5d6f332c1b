//! Capabilities the map core expects from things living on top of it

use crate::core::viewport::Viewport;

/// Anything drawn over the tiles (markers, paths, polygons). The core never
/// looks inside; it only asks every element to redraw after the visible
/// window changed, passing the viewport for coordinate conversion.
pub trait Drawable {
    fn draw(&mut self, viewport: &Viewport);
}

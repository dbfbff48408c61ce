// THEORY:
// A `Region` is the spatial unit every detector reports in: an axis-aligned box in
// pixel coordinates. Regions come out of contour bounding boxes and grid cells, and
// are expanded by a fixed margin before cropping so that the edges of an LED are
// never cut off. Expansion always clips against the enclosing image, so a Region
// handed to a crop or a drawing routine is in-bounds by construction.

use serde::Serialize;

/// A simple struct to represent a 2D point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

/// An axis-aligned box `(x, y, w, h)` in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// The tightest box around a set of points. `None` when `points` is empty.
    pub fn bounding(points: impl IntoIterator<Item = Point>) -> Option<Self> {
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0;
        let mut max_y = 0;
        let mut any = false;

        for point in points {
            any = true;
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
        }

        any.then(|| Self::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn top_left(&self) -> Point {
        Point { x: self.x, y: self.y }
    }

    /// True when `point` lies inside the box.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.y >= self.y
            && (point.x as u64) < self.x as u64 + self.width as u64
            && (point.y as u64) < self.y as u64 + self.height as u64
    }

    /// Grows the box by `margin` on every side, clipped to a `bounds_width` x
    /// `bounds_height` image.
    pub fn expand(&self, margin: u32, bounds_width: u32, bounds_height: u32) -> Self {
        let x = self.x.saturating_sub(margin);
        let y = self.y.saturating_sub(margin);
        let right = (self.x as u64 + self.width as u64 + margin as u64).min(bounds_width as u64) as u32;
        let bottom = (self.y as u64 + self.height as u64 + margin as u64).min(bounds_height as u64) as u32;
        Self::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }
}

//! Integer bounding boxes on the device tile grid.
//!
//! Coordinates are inclusive tile coordinates. A freshly created [`BBox`] is
//! empty (inverted extents) and grows by [`BBox::update`] or
//! [`BBox::union_with`].

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle of tile coordinates, inclusive on all sides.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct BBox {
    /// Smallest x coordinate covered by the box.
    pub x_min: i32,
    /// Smallest y coordinate covered by the box.
    pub y_min: i32,
    /// Largest x coordinate covered by the box.
    pub x_max: i32,
    /// Largest y coordinate covered by the box.
    pub y_max: i32,
}

impl BBox {
    /// Creates a box from its four inclusive extents.
    pub fn new(x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Creates an empty box; any [`update`](Self::update) makes it valid.
    pub fn empty() -> Self {
        Self {
            x_min: i32::MAX,
            y_min: i32::MAX,
            x_max: i32::MIN,
            y_max: i32::MIN,
        }
    }

    /// Returns whether the box covers at least one point.
    pub fn is_valid(&self) -> bool {
        self.x_min <= self.x_max && self.y_min <= self.y_max
    }

    /// Grows the box to cover the point `(x, y)`.
    pub fn update(&mut self, x: i32, y: i32) {
        self.x_min = self.x_min.min(x);
        self.y_min = self.y_min.min(y);
        self.x_max = self.x_max.max(x);
        self.y_max = self.y_max.max(y);
    }

    /// Returns the smallest box covering both `self` and `other`.
    pub fn union_with(&self, other: &BBox) -> BBox {
        BBox {
            x_min: self.x_min.min(other.x_min),
            y_min: self.y_min.min(other.y_min),
            x_max: self.x_max.max(other.x_max),
            y_max: self.y_max.max(other.y_max),
        }
    }

    /// Returns whether the interiors of `self` and `other` overlap.
    ///
    /// Boxes that merely share an edge or a corner do not strictly intersect.
    pub fn strictly_intersects(&self, other: &BBox) -> bool {
        self.x_min < other.x_max
            && other.x_min < self.x_max
            && self.y_min < other.y_max
            && other.y_min < self.y_max
    }

    /// Half-perimeter wirelength of the box.
    pub fn hpwl(&self) -> i32 {
        (self.x_max - self.x_min) + (self.y_max - self.y_min)
    }

    /// Width of the box in tiles (inclusive extents).
    pub fn width(&self) -> i32 {
        self.x_max - self.x_min + 1
    }

    /// Height of the box in tiles (inclusive extents).
    pub fn height(&self) -> i32 {
        self.y_max - self.y_min + 1
    }

    /// The x coordinate of the box center.
    pub fn x_center(&self) -> f64 {
        (self.x_min + self.x_max) as f64 / 2.0
    }

    /// The y coordinate of the box center.
    pub fn y_center(&self) -> f64 {
        (self.y_min + self.y_max) as f64 / 2.0
    }
}

impl Default for BBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Display for BBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}] x [{}, {}]",
            self.x_min, self.x_max, self.y_min, self.y_max
        )
    }
}

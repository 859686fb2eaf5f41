//! Geometric primitives in PDF user space.
//!
//! PDF rectangles are given by two opposite corners, lower-left first. Values
//! supplied by callers may arrive in any corner order and are normalised on
//! construction.

use crate::object::Object;
use serde::{Deserialize, Serialize};

/// A 2D point in user space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
}

impl Point {
    /// Create a new point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A rectangle as `[x0 y0 x1 y1]`, with `x0 <= x1` and `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge
    pub x0: f64,
    /// Bottom edge
    pub y0: f64,
    /// Right edge
    pub x1: f64,
    /// Top edge
    pub y1: f64,
}

impl Rect {
    /// Create a rectangle from two corners, in any order.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdf_seal::geometry::Rect;
    ///
    /// let rect = Rect::new(350.0, 200.0, 100.0, 100.0);
    /// assert_eq!(rect.x0, 100.0);
    /// assert_eq!(rect.y1, 200.0);
    /// assert_eq!(rect.width(), 250.0);
    /// ```
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Create a rectangle from its lower-left corner and dimensions.
    pub fn from_origin(origin: Point, width: f64, height: f64) -> Self {
        Self::new(origin.x, origin.y, origin.x + width, origin.y + height)
    }

    /// Normalised copy; useful after deserialising caller-supplied corners.
    pub fn normalized(&self) -> Self {
        Self::new(self.x0, self.y0, self.x1, self.y1)
    }

    /// Width of the rectangle.
    pub fn width(&self) -> f64 {
        (self.x1 - self.x0).abs()
    }

    /// Height of the rectangle.
    pub fn height(&self) -> f64 {
        (self.y1 - self.y0).abs()
    }

    /// Lower-left corner.
    pub fn origin(&self) -> Point {
        Point::new(self.x0.min(self.x1), self.y0.min(self.y1))
    }

    /// Whether the rectangle encloses no area, or has non-finite corners.
    pub fn is_degenerate(&self) -> bool {
        let finite = [self.x0, self.y0, self.x1, self.y1].iter().all(|v| v.is_finite());
        !finite || self.width() <= f64::EPSILON || self.height() <= f64::EPSILON
    }

    /// PDF array form `[x0 y0 x1 y1]`.
    pub fn to_object(&self) -> Object {
        let r = self.normalized();
        Object::Array(vec![
            Object::Real(r.x0),
            Object::Real(r.y0),
            Object::Real(r.x1),
            Object::Real(r.y1),
        ])
    }
}

impl Default for Rect {
    fn default() -> Self {
        Self::new(100.0, 100.0, 350.0, 200.0)
    }
}

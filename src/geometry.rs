use serde::{Deserialize, Serialize};

/// A barbell position in normalized screen space.
///
/// `x` and `y` are in [0, 1] with `y` growing downward, so a smaller `y` is
/// visually higher on screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub timestamp_ms: u64,
}

impl Point {
    pub fn new(x: f64, y: f64, timestamp_ms: u64) -> Self {
        Self { x, y, timestamp_ms }
    }

    /// Euclidean distance in normalized units, ignoring time.
    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Milliseconds from `self` to `later`, zero if `later` is not later.
    pub fn millis_until(&self, later: &Point) -> u64 {
        later.timestamp_ms.saturating_sub(self.timestamp_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl BoundingBox {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }
}

/// One frame's barbell observation from the external detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub timestamp_ms: u64,
}

impl Detection {
    pub fn new(bbox: BoundingBox, timestamp_ms: u64) -> Self {
        Self { bbox, timestamp_ms }
    }

    /// Detection whose box is a small square centered on `(x, y)`.
    pub fn centered_at(x: f64, y: f64, timestamp_ms: u64) -> Self {
        const HALF: f64 = 0.02;
        Self::new(
            BoundingBox::new(x - HALF, y - HALF, x + HALF, y + HALF),
            timestamp_ms,
        )
    }

    pub fn to_point(&self) -> Point {
        let (x, y) = self.bbox.center();
        Point::new(x, y, self.timestamp_ms)
    }
}

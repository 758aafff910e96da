use crate::geometry::Point;

/// Speed of one path segment, stamped at the segment's end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocitySample {
    /// Seconds since the first point of the path
    pub t: f64,
    /// Segment duration in seconds
    pub dt: f64,
    /// Segment speed in normalized units per second
    pub speed: f64,
}

impl VelocitySample {
    pub fn new(t: f64, dt: f64, speed: f64) -> Self {
        Self { t, dt, speed }
    }
}

/// Per-segment speeds of a path. Segment `i` spans `points[i]..points[i + 1]`;
/// segments with no elapsed time get a speed of zero.
pub fn velocity_profile(points: &[Point]) -> Vec<VelocitySample> {
    let Some(first) = points.first() else {
        return Vec::new();
    };

    points
        .windows(2)
        .map(|pair| {
            let dt = pair[0].millis_until(&pair[1]) as f64 / 1000.0;
            let t = first.millis_until(&pair[1]) as f64 / 1000.0;
            let speed = if dt > 0.0 {
                pair[0].distance_to(&pair[1]) / dt
            } else {
                0.0
            };
            VelocitySample::new(t, dt, speed)
        })
        .collect()
}

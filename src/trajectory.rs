use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::{Detection, Point};

/// Tunable tracking heuristics. The distance and recency gates are not
/// physical constants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    pub max_active_paths: usize,
    /// Max center distance (normalized) for a detection to join a path
    pub assignment_distance: f64,
    /// A path only accepts detections within this long of its last point
    pub assignment_window_ms: u64,
    pub path_timeout_ms: u64,
    pub min_path_points: usize,
    /// How long a path may stay below `min_path_points` before eviction
    pub short_path_grace_ms: u64,
    pub cleanup_interval_ms: u64,
    pub max_path_points: usize,
    pub retained_path_points: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_active_paths: 2,
            assignment_distance: 0.1,
            assignment_window_ms: 2000,
            path_timeout_ms: 4000,
            min_path_points: 15,
            short_path_grace_ms: 3000,
            cleanup_interval_ms: 2000,
            max_path_points: 300,
            retained_path_points: 200,
        }
    }
}

/// Display tag for a path; rotates through the palette as paths are created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PathColor {
    Cyan,
    Magenta,
    Yellow,
    Green,
    Orange,
}

const PALETTE: [PathColor; 5] = [
    PathColor::Cyan,
    PathColor::Magenta,
    PathColor::Yellow,
    PathColor::Green,
    PathColor::Orange,
];

/// A time-ordered trajectory attributed to one continuous lift attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub id: u64,
    pub points: Vec<Point>,
    pub color: PathColor,
    pub start_time_ms: u64,
}

impl Path {
    pub fn new(id: u64, color: PathColor, start_time_ms: u64) -> Self {
        Self {
            id,
            points: Vec::new(),
            color,
            start_time_ms,
        }
    }

    pub fn last_point(&self) -> Option<&Point> {
        self.points.last()
    }

    /// Milliseconds since the newest point, `None` for an empty path.
    pub fn idle_ms(&self, now_ms: u64) -> Option<u64> {
        self.last_point()
            .map(|p| now_ms.saturating_sub(p.timestamp_ms))
    }

    pub fn duration_secs(&self) -> f64 {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => first.millis_until(last) as f64 / 1000.0,
            _ => 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EvictReason {
    Empty,
    TimedOut,
    TooShort,
}

/// Owns the active paths of one session.
/// Multi-path tracking of barbell detections.
///
/// Each detection is attached to the nearest recently-seen path or starts a new
/// one. At most `max_active_paths` paths are tracked; when a new path is needed
/// at capacity, the path that went quiet first is dropped. A periodic cleanup
/// pass evicts paths that timed out or never collected enough points.
#[derive(Debug)]
pub struct TrajectoryStore {
    config: TrackerConfig,
    paths: Vec<Path>,
    next_id: u64,
    last_cleanup_ms: u64,
}

impl TrajectoryStore {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            paths: Vec::new(),
            next_id: 0,
            last_cleanup_ms: 0,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    pub fn total_points(&self) -> usize {
        self.paths.iter().map(Path::len).sum()
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }

    /// Drops every path and restarts the cleanup timer at `now_ms`.
    pub fn reset(&mut self, now_ms: u64) {
        self.clear();
        self.last_cleanup_ms = now_ms;
    }

    /// Attaches the detection to a path and returns the active paths.
    /// Detections not newer than the chosen path's last point are dropped.
    pub fn add_detection(&mut self, detection: &Detection, now_ms: u64) -> &[Path] {
        let point = detection.to_point();

        let idx = match self.nearest_path(&point, now_ms) {
            Some(idx) => idx,
            None => self.spawn_path(now_ms),
        };
        let path = &mut self.paths[idx];
        let stale = path
            .last_point()
            .map(|last| last.timestamp_ms)
            .filter(|&last_ms| point.timestamp_ms <= last_ms);
        if let Some(last_ms) = stale {
            debug!(
                path_id = path.id,
                timestamp_ms = point.timestamp_ms,
                last_ms,
                "Dropping out-of-order detection"
            );
        } else {
            path.points.push(point);
        }

        self.cleanup_if_due(now_ms);
        self.cap_path_lengths();

        &self.paths
    }

    /// Index of the closest path whose newest point is recent enough and
    /// within the assignment distance.
    fn nearest_path(&self, point: &Point, now_ms: u64) -> Option<usize> {
        self.paths
            .iter()
            .enumerate()
            .filter_map(|(i, path)| {
                let last = path.last_point()?;
                (now_ms.saturating_sub(last.timestamp_ms) <= self.config.assignment_window_ms)
                    .then(|| (i, last.distance_to(point)))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .filter(|(_, distance)| *distance < self.config.assignment_distance)
            .map(|(i, _)| i)
    }

    fn spawn_path(&mut self, now_ms: u64) -> usize {
        if self.paths.len() >= self.config.max_active_paths.max(1) {
            self.evict_oldest();
        }

        let id = self.next_id;
        self.next_id += 1;
        let color = PALETTE[(id as usize) % PALETTE.len()];
        debug!(path_id = id, %color, "Starting new path");

        self.paths.push(Path::new(id, color, now_ms));
        self.paths.len() - 1
    }

    /// Removes the path whose newest point is the oldest. Empty paths count as
    /// oldest of all.
    fn evict_oldest(&mut self) {
        let oldest = self
            .paths
            .iter()
            .enumerate()
            .min_by_key(|(_, path)| path.last_point().map_or(0, |p| p.timestamp_ms))
            .map(|(i, _)| i);

        if let Some(i) = oldest {
            let evicted = self.paths.remove(i);
            debug!(path_id = evicted.id, points = evicted.len(), "Evicted oldest path at capacity");
        }
    }

    /// Runs [`Self::cleanup`] when the cleanup interval has elapsed.
    pub fn cleanup_if_due(&mut self, now_ms: u64) {
        if now_ms.saturating_sub(self.last_cleanup_ms) >= self.config.cleanup_interval_ms {
            self.cleanup(now_ms);
            self.last_cleanup_ms = now_ms;
        }
    }

    /// Evicts empty, timed-out, and stalled short paths.
    pub fn cleanup(&mut self, now_ms: u64) {
        let config = &self.config;
        self.paths.retain(|path| {
            let reason = match path.idle_ms(now_ms) {
                None => Some(EvictReason::Empty),
                Some(idle) if idle > config.path_timeout_ms => Some(EvictReason::TimedOut),
                Some(_)
                    if path.len() < config.min_path_points
                        && now_ms.saturating_sub(path.start_time_ms)
                            >= config.short_path_grace_ms =>
                {
                    Some(EvictReason::TooShort)
                }
                Some(_) => None,
            };

            if let Some(reason) = reason {
                debug!(path_id = path.id, points = path.len(), ?reason, "Evicting path");
            }
            reason.is_none()
        });
    }

    fn cap_path_lengths(&mut self) {
        let (max, keep) = (self.config.max_path_points, self.config.retained_path_points);
        for path in self.paths.iter_mut().filter(|p| p.len() > max) {
            let drop = path.len() - keep.min(path.len());
            path.points.drain(..drop);
        }
    }

    /// Removes and returns the paths for which `take` is true, preserving order.
    pub fn take_paths<F>(&mut self, mut take: F) -> Vec<Path>
    where
        F: FnMut(&Path) -> bool,
    {
        let (taken, kept): (Vec<Path>, Vec<Path>) =
            std::mem::take(&mut self.paths).into_iter().partition(|p| take(p));
        self.paths = kept;
        taken
    }
}

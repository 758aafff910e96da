use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::OverlaySettings;
use crate::geometry::Point;
use crate::trajectory::{Path, TrajectoryStore};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmenterConfig {
    /// A path is evaluated once its newest point is at least this old
    pub stability_window_ms: u64,
    /// Distance from the line a point must exceed to count for a crossing
    pub crossing_hysteresis: f64,
    /// Max start/end height difference for symmetric exercises
    pub symmetry_tolerance: f64,
    /// How far below the line a row's top may sit
    pub row_extreme_slack: f64,
    pub min_duration_secs: f64,
    pub max_duration_secs: f64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            stability_window_ms: 1500,
            crossing_hysteresis: 0.02,
            symmetry_tolerance: 0.05,
            row_extreme_slack: 0.02,
            min_duration_secs: 0.5,
            max_duration_secs: 15.0,
        }
    }
}

/// A path that passed segmentation, numbered in completion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedRep {
    pub rep_number: u32,
    pub path: Path,
}

/// Why a candidate path was not accepted as a repetition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    TooFewPointsInBand,
    TooFewCrossings,
    WrongShape,
    DurationOutOfRange,
}

/// Counts transitions from clearly on one side of the line to clearly on the
/// other between consecutive points.
pub fn count_line_crossings(points: &[Point], line_y: f64, hysteresis: f64) -> usize {
    points
        .windows(2)
        .filter(|pair| {
            let (a, b) = (pair[0].y - line_y, pair[1].y - line_y);
            (a > hysteresis && b < -hysteresis) || (a < -hysteresis && b > hysteresis)
        })
        .count()
}

/// Promotes stabilized paths to completed repetitions.
///
/// A path is a candidate once it has enough points and its newest point is
/// older than the stability window. Candidates are checked against the overlay
/// line; rejected paths stay active and are looked at again on the next call.
#[derive(Debug)]
pub struct RepSegmenter {
    config: SegmenterConfig,
    completed: Vec<CompletedRep>,
    next_rep_number: u32,
}

impl RepSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            completed: Vec::new(),
            next_rep_number: 1,
        }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    pub fn completed(&self) -> &[CompletedRep] {
        &self.completed
    }

    pub fn next_rep_number(&self) -> u32 {
        self.next_rep_number
    }

    /// Forgets completed reps. The rep counter only restarts when
    /// `reset_counter` is set.
    pub fn clear(&mut self, reset_counter: bool) {
        self.completed.clear();
        if reset_counter {
            self.next_rep_number = 1;
        }
    }

    /// Evaluates every stable candidate in `store` and moves accepted paths
    /// into the completed set. Returns how many reps were completed.
    pub fn promote(
        &mut self,
        store: &mut TrajectoryStore,
        overlay: &OverlaySettings,
        now_ms: u64,
    ) -> usize {
        let min_points = store.config().min_path_points;
        let accepted = store.take_paths(|path| {
            self.is_candidate(path, min_points, now_ms)
                && match self.evaluate(path, overlay, min_points) {
                    Ok(()) => true,
                    Err(reason) => {
                        debug!(path_id = path.id, points = path.len(), ?reason, "Path rejected");
                        false
                    }
                }
        });

        let count = accepted.len();
        for path in accepted {
            let rep_number = self.next_rep_number;
            self.next_rep_number += 1;
            info!(
                rep_number,
                path_id = path.id,
                points = path.len(),
                duration_secs = path.duration_secs(),
                "Repetition completed"
            );
            self.completed.push(CompletedRep { rep_number, path });
        }
        count
    }

    fn is_candidate(&self, path: &Path, min_points: usize, now_ms: u64) -> bool {
        path.len() >= min_points
            && path
                .idle_ms(now_ms)
                .is_some_and(|idle| idle >= self.config.stability_window_ms)
    }

    /// Checks a path against the overlay line and the exercise's shape.
    pub fn evaluate(
        &self,
        path: &Path,
        overlay: &OverlaySettings,
        min_points: usize,
    ) -> Result<(), Rejection> {
        let line_y = overlay.line_screen_y();
        let (low, high) = overlay.band();

        let in_band = path
            .points
            .iter()
            .filter(|p| p.y >= low && p.y <= high)
            .count();
        if in_band < min_points / 2 {
            return Err(Rejection::TooFewPointsInBand);
        }

        if count_line_crossings(&path.points, line_y, self.config.crossing_hysteresis) < 2 {
            return Err(Rejection::TooFewCrossings);
        }

        if !overlay.exercise.pattern().matches(
            &path.points,
            line_y,
            self.config.symmetry_tolerance,
            self.config.row_extreme_slack,
        ) {
            return Err(Rejection::WrongShape);
        }

        let duration = path.duration_secs();
        if duration < self.config.min_duration_secs || duration > self.config.max_duration_secs {
            return Err(Rejection::DurationOutOfRange);
        }

        Ok(())
    }
}

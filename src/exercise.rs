use clap::ValueEnum;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// Supported barbell lifts.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    ValueEnum,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Exercise {
    #[default]
    Squat,
    BenchPress,
    Deadlift,
    OverheadPress,
    BarbellRow,
}

/// Where a point sits relative to the overlay line. "Above" is visually
/// higher on screen, i.e. a smaller `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Above,
    Below,
}

impl Side {
    pub fn holds(self, y: f64, line_y: f64) -> bool {
        match self {
            Side::Above => y < line_y,
            Side::Below => y > line_y,
        }
    }
}

/// Requirement on the turning point of a rep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extreme {
    /// The highest (minimum-y) point must be below the line.
    HighestBelow,
    /// The deepest (maximum-y) point must be below the line.
    DeepestBelow,
    /// The highest (minimum-y) point must be above the line.
    HighestAbove,
    /// The highest (minimum-y) point must be at most `slack` below the line.
    HighestNearLine,
}

/// Expected shape of one rep relative to the overlay line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExercisePattern {
    pub start: Side,
    pub extreme: Extreme,
    pub end: Side,
    /// Start and end must return to (nearly) the same height
    pub symmetric: bool,
}

impl Exercise {
    /// The per-exercise shape table. Adding an exercise means adding a row here.
    pub const fn pattern(self) -> ExercisePattern {
        match self {
            Exercise::Squat => ExercisePattern {
                start: Side::Above,
                extreme: Extreme::DeepestBelow,
                end: Side::Above,
                symmetric: true,
            },
            Exercise::BenchPress => ExercisePattern {
                start: Side::Below,
                extreme: Extreme::HighestAbove,
                end: Side::Below,
                symmetric: true,
            },
            Exercise::Deadlift => ExercisePattern {
                start: Side::Below,
                extreme: Extreme::HighestAbove,
                end: Side::Below,
                symmetric: false,
            },
            Exercise::OverheadPress => ExercisePattern {
                start: Side::Below,
                extreme: Extreme::HighestAbove,
                end: Side::Below,
                symmetric: true,
            },
            Exercise::BarbellRow => ExercisePattern {
                start: Side::Below,
                extreme: Extreme::HighestNearLine,
                end: Side::Below,
                symmetric: false,
            },
        }
    }
}

impl ExercisePattern {
    /// Index of the rep's turning point.
    pub fn extreme_index(&self, points: &[Point]) -> Option<usize> {
        match self.extreme {
            Extreme::DeepestBelow => points.iter().position_max_by(|a, b| a.y.total_cmp(&b.y)),
            Extreme::HighestBelow | Extreme::HighestAbove | Extreme::HighestNearLine => {
                points.iter().position_min_by(|a, b| a.y.total_cmp(&b.y))
            }
        }
    }

    pub fn matches(
        &self,
        points: &[Point],
        line_y: f64,
        symmetry_tolerance: f64,
        extreme_slack: f64,
    ) -> bool {
        let (Some(first), Some(last)) = (points.first(), points.last()) else {
            return false;
        };
        let Some(extreme) = self.extreme_index(points).map(|i| points[i]) else {
            return false;
        };

        if !self.start.holds(first.y, line_y) || !self.end.holds(last.y, line_y) {
            return false;
        }

        let extreme_ok = match self.extreme {
            Extreme::HighestBelow | Extreme::DeepestBelow => extreme.y > line_y,
            Extreme::HighestAbove => extreme.y < line_y,
            Extreme::HighestNearLine => extreme.y <= line_y + extreme_slack,
        };
        if !extreme_ok {
            return false;
        }

        !self.symmetric || (first.y - last.y).abs() < symmetry_tolerance
    }
}

/// A tempo prescription in seconds per phase, e.g. `"3-1-2"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    pub eccentric: f64,
    pub pause: f64,
    pub concentric: f64,
}

impl Tempo {
    /// Parses `eccentric-pause-concentric` with `-` or `:` separators. An `x`
    /// (explosive) counts as zero seconds and a fourth field is ignored.
    /// Labels such as `"Normal"` yield `None`.
    pub fn parse(s: &str) -> Option<Tempo> {
        let fields: Vec<f64> = s
            .trim()
            .split(['-', ':'])
            .map(|f| match f.trim() {
                "x" | "X" => Some(0.0),
                other => other.parse::<f64>().ok(),
            })
            .collect::<Option<Vec<_>>>()?;

        if !(3..=4).contains(&fields.len()) || fields.iter().any(|f| !f.is_finite() || *f < 0.0) {
            return None;
        }

        Some(Tempo {
            eccentric: fields[0],
            pause: fields[1],
            concentric: fields[2],
        })
    }
}

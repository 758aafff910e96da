use itertools::{Itertools, MinMaxResult};
use serde::{Deserialize, Serialize};

use crate::config::OverlaySettings;
use crate::exercise::{Exercise, Tempo};
use crate::geometry::Point;
use crate::segmenter::CompletedRep;
use crate::time_series::{velocity_profile, VelocitySample};
use crate::util::{clamp_score, coefficient_of_variation, mean};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Real-world centimeters per normalized screen unit
    pub cm_per_unit: f64,
    /// Segments slower than this around the turning point count as a pause
    pub pause_velocity_cm_s: f64,
    /// Quality points lost per centimeter of mean distance from the overlay line
    pub deviation_penalty_per_cm: f64,
    /// Share of the quality score driven by deviation; the rest is tempo
    pub deviation_weight: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            cm_per_unit: 100.0,
            pause_velocity_cm_s: 5.0,
            deviation_penalty_per_cm: 2.0,
            deviation_weight: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 90.0 => Grade::A,
            s if s >= 80.0 => Grade::B,
            s if s >= 70.0 => Grade::C,
            s if s >= 60.0 => Grade::D,
            _ => Grade::F,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseDurations {
    pub eccentric_secs: f64,
    pub pause_secs: f64,
    pub concentric_secs: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RepMetrics {
    pub total_distance_cm: f64,
    pub vertical_range_cm: f64,
    pub avg_velocity_cm_s: f64,
    pub peak_velocity_cm_s: f64,
    pub path_deviation_cm: f64,
    pub duration_secs: f64,
    pub phases: PhaseDurations,
    pub tempo_score: f64,
}

/// Blend of quality and raw deviation, clamped to [0, 100].
pub fn overlay_line_adherence(quality_score: f64, path_deviation: f64) -> f64 {
    let deviation_score = (100.0 - 50.0 * path_deviation).max(0.0);
    // 0.7 / 0.3 weighting, kept exact for whole-number inputs
    clamp_score((7.0 * quality_score + 3.0 * deviation_score) / 10.0)
}

/// Analysis record for one completed repetition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepData {
    pub rep_number: u32,
    pub timestamp_ms: u64,
    pub exercise: Exercise,
    pub tempo: String,
    pub metrics: RepMetrics,
    pub quality_score: f64,
    overlay_line_adherence: f64,
}

impl RepData {
    pub fn new(
        rep_number: u32,
        timestamp_ms: u64,
        exercise: Exercise,
        tempo: impl Into<String>,
        metrics: RepMetrics,
        quality_score: f64,
    ) -> Self {
        let quality_score = clamp_score(quality_score);
        Self {
            rep_number,
            timestamp_ms,
            exercise,
            tempo: tempo.into(),
            metrics,
            quality_score,
            overlay_line_adherence: overlay_line_adherence(
                quality_score,
                metrics.path_deviation_cm,
            ),
        }
    }

    /// Fixed when the record is built.
    pub fn overlay_line_adherence(&self) -> f64 {
        self.overlay_line_adherence
    }

    pub fn grade(&self) -> Grade {
        Grade::from_score(self.quality_score)
    }
}

/// Movement-quality metrics for completed repetitions.
///
/// Distances are measured in normalized screen units and converted to
/// centimeters with `cm_per_unit`. Paths with fewer than two points or no
/// elapsed time produce no analysis.
#[derive(Debug, Clone, Default)]
pub struct RepAnalyzer {
    config: AnalyzerConfig,
}

impl RepAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Scores `rep` against the overlay line in `overlay`.
    pub fn analyze(
        &self,
        rep: &CompletedRep,
        overlay: &OverlaySettings,
        exercise: Exercise,
        tempo: &str,
    ) -> Option<RepData> {
        let metrics = self.metrics(&rep.path.points, overlay.line_screen_y(), exercise, tempo)?;
        let deviation_score =
            clamp_score(100.0 - metrics.path_deviation_cm * self.config.deviation_penalty_per_cm);
        let weight = self.config.deviation_weight.clamp(0.0, 1.0);
        let quality = weight * deviation_score + (1.0 - weight) * metrics.tempo_score;
        let timestamp_ms = rep.path.last_point()?.timestamp_ms;

        Some(RepData::new(
            rep.rep_number,
            timestamp_ms,
            exercise,
            tempo,
            metrics,
            quality,
        ))
    }

    /// Raw metrics for a path; `line_y` is the overlay line in normalized
    /// screen space.
    pub fn metrics(
        &self,
        points: &[Point],
        line_y: f64,
        exercise: Exercise,
        tempo: &str,
    ) -> Option<RepMetrics> {
        let (first, last) = (points.first()?, points.last()?);
        if points.len() < 2 {
            return None;
        }
        let duration_secs = first.millis_until(last) as f64 / 1000.0;
        if duration_secs <= 0.0 {
            return None;
        }

        let scale = self.config.cm_per_unit;
        let profile = velocity_profile(points);

        let total_distance_cm = points
            .iter()
            .tuple_windows()
            .map(|(a, b)| a.distance_to(b))
            .sum::<f64>()
            * scale;

        let vertical_range_cm = match points.iter().map(|p| p.y).minmax_by(f64::total_cmp) {
            MinMaxResult::MinMax(min, max) => (max - min) * scale,
            MinMaxResult::OneElement(_) | MinMaxResult::NoElements => 0.0,
        };

        let peak_velocity_cm_s = profile
            .iter()
            .map(|s| s.speed * scale)
            .fold(0.0, f64::max);

        let path_deviation_cm = mean(
            &points
                .iter()
                .map(|p| (p.y - line_y).abs() * scale)
                .collect::<Vec<_>>(),
        )
        .unwrap_or(0.0);

        let phases = self.phases(points, &profile, exercise);
        let tempo_score = self.tempo_score(&phases, &profile, tempo);

        Some(RepMetrics {
            total_distance_cm,
            vertical_range_cm,
            avg_velocity_cm_s: total_distance_cm / duration_secs,
            peak_velocity_cm_s,
            path_deviation_cm,
            duration_secs,
            phases,
            tempo_score,
        })
    }

    /// Splits the rep at its turning point. Slow segments contiguous with the
    /// turning point form the pause; the rest is eccentric before and
    /// concentric after.
    fn phases(
        &self,
        points: &[Point],
        profile: &[VelocitySample],
        exercise: Exercise,
    ) -> PhaseDurations {
        let Some(turn) = exercise.pattern().extreme_index(points) else {
            return PhaseDurations::default();
        };
        let slow = |segment: usize| {
            profile[segment].speed * self.config.cm_per_unit < self.config.pause_velocity_cm_s
        };

        let mut pause_start = turn;
        while pause_start > 0 && slow(pause_start - 1) {
            pause_start -= 1;
        }
        let mut pause_end = turn;
        while pause_end + 1 < points.len() && slow(pause_end) {
            pause_end += 1;
        }

        let secs = |a: usize, b: usize| points[a].millis_until(&points[b]) as f64 / 1000.0;
        let last = points.len() - 1;
        PhaseDurations {
            eccentric_secs: secs(0, pause_start),
            pause_secs: secs(pause_start, pause_end),
            concentric_secs: secs(pause_end, last),
        }
    }

    /// Agreement with the prescribed tempo, or velocity steadiness when the
    /// tempo is a label rather than a prescription.
    fn tempo_score(&self, phases: &PhaseDurations, profile: &[VelocitySample], tempo: &str) -> f64 {
        let prescribed = Tempo::parse(tempo).map(|t| {
            [
                (phases.eccentric_secs, t.eccentric),
                (phases.pause_secs, t.pause),
                (phases.concentric_secs, t.concentric),
            ]
            .into_iter()
            .filter(|(_, target)| *target > 0.0)
            .map(|(actual, target)| (actual - target).abs() / target)
            .collect::<Vec<_>>()
        });

        match prescribed.as_deref().and_then(mean) {
            Some(relative_error) => clamp_score(100.0 * (1.0 - relative_error)),
            None => {
                let speeds: Vec<f64> = profile
                    .iter()
                    .filter(|s| s.dt > 0.0)
                    .map(|s| s.speed)
                    .collect();
                coefficient_of_variation(&speeds)
                    .map_or(0.0, |cv| clamp_score(100.0 * (1.0 - cv.min(1.0))))
            }
        }
    }
}

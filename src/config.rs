use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::analyzer::AnalyzerConfig;
use crate::error::{Error, Result};
use crate::exercise::Exercise;
use crate::segmenter::SegmenterConfig;
use crate::trajectory::TrackerConfig;

/// Overlay line offset (dp from screen top) that maps to the vertical center.
pub const REFERENCE_OFFSET_DP: f64 = 400.0;

/// Overlay state pushed by the host UI. Construct through [`OverlaySettings::new`]
/// so the derived geometry is always finite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverlaySettings {
    pub line_height_dp: f64,
    pub range_of_motion: f64,
    pub exercise: Exercise,
    pub tempo: String,
    pub phase: String,
    pub canvas_height: f64,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            line_height_dp: REFERENCE_OFFSET_DP,
            range_of_motion: 400.0,
            exercise: Exercise::Squat,
            tempo: "2-1-2".to_string(),
            phase: "Full".to_string(),
            canvas_height: 800.0,
        }
    }
}

impl OverlaySettings {
    pub fn new(
        line_height_dp: f64,
        range_of_motion: f64,
        exercise: Exercise,
        tempo: impl Into<String>,
        phase: impl Into<String>,
        canvas_height: f64,
    ) -> Result<Self> {
        let settings = Self {
            line_height_dp,
            range_of_motion,
            exercise,
            tempo: tempo.into(),
            phase: phase.into(),
            canvas_height,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects values that would turn the line or band into NaN/infinity.
    pub fn validate(&self) -> Result<()> {
        if !self.canvas_height.is_finite() || self.canvas_height <= 0.0 {
            return Err(Error::InvalidSettings(format!(
                "canvas height must be positive, got {}",
                self.canvas_height
            )));
        }
        if !self.line_height_dp.is_finite() {
            return Err(Error::InvalidSettings(format!(
                "line height must be finite, got {}",
                self.line_height_dp
            )));
        }
        if !self.range_of_motion.is_finite() || self.range_of_motion < 0.0 {
            return Err(Error::InvalidSettings(format!(
                "range of motion must be non-negative, got {}",
                self.range_of_motion
            )));
        }
        Ok(())
    }

    /// Overlay line position in normalized screen space, clamped to [0, 1].
    pub fn line_screen_y(&self) -> f64 {
        (0.5 + (self.line_height_dp - REFERENCE_OFFSET_DP) / self.canvas_height).clamp(0.0, 1.0)
    }

    /// Acceptance band `(low, high)` around the line, in normalized units.
    pub fn band(&self) -> (f64, f64) {
        let line_y = self.line_screen_y();
        let half = (self.range_of_motion / 2.0) / self.canvas_height;
        (line_y - half, line_y + half)
    }
}

/// Everything the CLI persists between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub overlay: OverlaySettings,
    pub tracker: TrackerConfig,
    pub segmenter: SegmenterConfig,
    pub analyzer: AnalyzerConfig,
}

impl Config {
    /// Checks the overlay plus the tracker, segmenter and analyzer tunables.
    pub fn validate(&self) -> Result<()> {
        self.overlay.validate()?;

        let t = &self.tracker;
        if t.max_active_paths == 0 {
            return Err(invalid("tracker.max_active_paths must be at least 1"));
        }
        if !t.assignment_distance.is_finite() || t.assignment_distance <= 0.0 {
            return Err(invalid("tracker.assignment_distance must be positive"));
        }
        if t.max_path_points == 0 || t.retained_path_points > t.max_path_points {
            return Err(invalid(
                "tracker.retained_path_points must not exceed a non-zero max_path_points",
            ));
        }

        let s = &self.segmenter;
        if !(s.crossing_hysteresis >= 0.0 && s.symmetry_tolerance >= 0.0 && s.row_extreme_slack >= 0.0) {
            return Err(invalid("segmenter tolerances must be non-negative"));
        }
        if !(s.min_duration_secs >= 0.0 && s.min_duration_secs <= s.max_duration_secs) {
            return Err(invalid("segmenter.min_duration_secs must not exceed max_duration_secs"));
        }

        let a = &self.analyzer;
        if !a.cm_per_unit.is_finite() || a.cm_per_unit <= 0.0 {
            return Err(invalid("analyzer.cm_per_unit must be positive"));
        }
        if !(a.pause_velocity_cm_s >= 0.0 && a.deviation_penalty_per_cm >= 0.0) {
            return Err(invalid("analyzer thresholds must be non-negative"));
        }
        if !(0.0..=1.0).contains(&a.deviation_weight) {
            return Err(invalid("analyzer.deviation_weight must be within [0, 1]"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> Error {
    Error::InvalidSettings(msg.to_string())
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "barpath") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("barpath_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    /// Missing, unreadable or invalid files fall back to defaults.
    fn load(&self) -> Config {
        let Ok(bytes) = fs::read(&self.path) else {
            return Config::default();
        };
        match serde_json::from_slice::<Config>(&bytes) {
            Ok(cfg) => match cfg.validate() {
                Ok(()) => cfg,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "Stored settings are invalid, using defaults");
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to parse config, using defaults");
                Config::default()
            }
        }
    }

    fn save(&self, cfg: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

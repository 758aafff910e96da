use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::analyzer::{RepAnalyzer, RepData};
use crate::config::{Config, OverlaySettings};
use crate::error::Result;
use crate::exercise::Exercise;
use crate::geometry::Detection;
use crate::report::{ReportHandle, ReportSink, SessionInfo};
use crate::segmenter::{CompletedRep, RepSegmenter};
use crate::trajectory::{Path, TrajectoryStore};
use crate::util::mean;

/// Read-only projection over the completed reps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStats {
    pub total_reps: usize,
    pub average_quality: f64,
    pub session_duration_secs: f64,
}

/// One lifting session: tracking, segmentation and the completed-rep history.
///
/// Ingestion, queries and report generation must be serialized by the caller;
/// nothing here locks.
#[derive(Debug)]
pub struct Session {
    overlay: OverlaySettings,
    store: TrajectoryStore,
    segmenter: RepSegmenter,
    analyzer: RepAnalyzer,
    started_at_ms: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            overlay: OverlaySettings::default(),
            store: TrajectoryStore::new(Default::default()),
            segmenter: RepSegmenter::new(Default::default()),
            analyzer: RepAnalyzer::default(),
            started_at_ms: 0,
        }
    }
}

impl Session {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            overlay: config.overlay.clone(),
            store: TrajectoryStore::new(config.tracker.clone()),
            segmenter: RepSegmenter::new(config.segmenter.clone()),
            analyzer: RepAnalyzer::new(config.analyzer.clone()),
            started_at_ms: 0,
        })
    }

    /// Clears paths and reps, restarts rep numbering at 1 and stamps the
    /// session start.
    pub fn start_session(&mut self, now_ms: u64) {
        self.store.reset(now_ms);
        self.segmenter.clear(true);
        self.started_at_ms = now_ms;
        info!(started_at_ms = now_ms, "Session started");
    }

    /// Clears paths and reps but keeps the session start time.
    pub fn clear_all_paths(&mut self) {
        self.store.clear();
        self.segmenter.clear(true);
        info!("Cleared all paths");
    }

    pub fn overlay(&self) -> &OverlaySettings {
        &self.overlay
    }

    /// Replaces the overlay settings. Invalid settings are rejected and the
    /// previous ones stay in effect.
    pub fn set_overlay(&mut self, overlay: OverlaySettings) -> Result<()> {
        if let Err(e) = overlay.validate() {
            warn!(error = %e, "Rejected overlay settings");
            return Err(e);
        }
        self.overlay = overlay;
        Ok(())
    }

    pub fn update_overlay_settings(
        &mut self,
        line_height_dp: f64,
        range_of_motion: f64,
        exercise: Exercise,
        tempo: &str,
        phase: &str,
        canvas_height: f64,
    ) -> Result<()> {
        self.set_overlay(OverlaySettings {
            line_height_dp,
            range_of_motion,
            exercise,
            tempo: tempo.to_string(),
            phase: phase.to_string(),
            canvas_height,
        })
    }

    /// Tracks one detection, promotes any stabilized reps, and returns the
    /// paths that are still active.
    pub fn add_detection(&mut self, detection: &Detection, now_ms: u64) -> &[Path] {
        self.store.add_detection(detection, now_ms);
        self.segmenter.promote(&mut self.store, &self.overlay, now_ms);
        self.store.paths()
    }

    /// Advances time without a detection. Returns the number of reps completed.
    pub fn tick(&mut self, now_ms: u64) -> usize {
        self.store.cleanup_if_due(now_ms);
        self.segmenter.promote(&mut self.store, &self.overlay, now_ms)
    }

    /// Ends the feed at `now_ms`: advances past the stability window so a
    /// final rep still in flight gets evaluated. Returns the reps completed
    /// and the flushed time.
    pub fn finish(&mut self, now_ms: u64) -> (usize, u64) {
        let flushed_at = now_ms.saturating_add(self.segmenter.config().stability_window_ms);
        (self.tick(flushed_at), flushed_at)
    }

    pub fn current_paths(&self) -> &[Path] {
        self.store.paths()
    }

    pub fn completed_reps(&self) -> &[CompletedRep] {
        self.segmenter.completed()
    }

    pub fn active_path_count(&self) -> usize {
        self.store.paths().len()
    }

    pub fn total_points(&self) -> usize {
        self.store.total_points()
    }

    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    /// Analyzes every completed rep in completion order against the current
    /// overlay line. Reps that cannot be analyzed are skipped.
    pub fn rep_data(&self, exercise: Exercise, tempo: &str) -> Vec<RepData> {
        self.completed_reps()
            .iter()
            .filter_map(|rep| self.analyzer.analyze(rep, &self.overlay, exercise, tempo))
            .collect()
    }

    pub fn session_stats(&self, now_ms: u64) -> SessionStats {
        let qualities: Vec<f64> = self
            .rep_data(self.overlay.exercise, &self.overlay.tempo)
            .iter()
            .map(|rep| rep.quality_score)
            .collect();

        SessionStats {
            total_reps: self.completed_reps().len(),
            average_quality: mean(&qualities).unwrap_or(0.0),
            session_duration_secs: now_ms.saturating_sub(self.started_at_ms) as f64 / 1000.0,
        }
    }

    pub fn session_info(&self, exercise: Exercise, tempo: &str, now_ms: u64) -> SessionInfo {
        SessionInfo {
            exercise,
            tempo: tempo.to_string(),
            timestamp: i64::try_from(self.started_at_ms)
                .ok()
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .unwrap_or_default(),
            duration_secs: now_ms.saturating_sub(self.started_at_ms) as f64 / 1000.0,
            overlay_line_height: Some(self.overlay.line_height_dp),
            range_of_motion: Some(self.overlay.range_of_motion),
        }
    }

    /// Hands the analyzed reps to `sink`. Sink failures are logged and
    /// reported as `None`.
    pub fn generate_report(
        &self,
        sink: &dyn ReportSink,
        exercise: Exercise,
        tempo: &str,
        now_ms: u64,
    ) -> Option<ReportHandle> {
        let reps = self.rep_data(exercise, tempo);
        let info = self.session_info(exercise, tempo, now_ms);

        match sink.write_report(&reps, &info) {
            Ok(handle) => {
                info!(location = %handle.location, reps = reps.len(), "Report written");
                Some(handle)
            }
            Err(e) => {
                warn!(error = %e, "Failed to write report");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use assert_matches::assert_matches;
    use std::cell::RefCell;

    /// 0.2 -> 0.8 -> 0.2 squat trace, 20 detections starting at `start_ms`
    fn feed_squat(session: &mut Session, start_ms: u64, x: f64) -> u64 {
        let mut t = start_ms;
        for i in 0..20 {
            let y = if i < 10 {
                0.2 + i as f64 * 0.6 / 9.0
            } else {
                0.8 - (i - 10) as f64 * 0.6 / 9.0
            };
            t = start_ms + i * 105;
            session.add_detection(&Detection::centered_at(x, y, t), t);
        }
        t
    }

    struct RecordingSink {
        seen: RefCell<Vec<(usize, SessionInfo)>>,
        fail: bool,
    }

    impl ReportSink for RecordingSink {
        fn write_report(&self, reps: &[RepData], info: &SessionInfo) -> Result<ReportHandle> {
            if self.fail {
                return Err(Error::Report("disk full".into()));
            }
            self.seen.borrow_mut().push((reps.len(), info.clone()));
            Ok(ReportHandle {
                location: "memory".into(),
            })
        }
    }

    #[test]
    fn test_start_session_resets_everything() {
        let mut session = Session::default();
        session.start_session(1000);
        let last = feed_squat(&mut session, 1000, 0.5);
        assert_eq!(session.tick(last + 1500), 1);
        session.add_detection(&Detection::centered_at(0.1, 0.1, last + 1600), last + 1600);
        assert_eq!(session.active_path_count(), 1);

        session.start_session(50_000);
        assert_eq!(session.active_path_count(), 0);
        assert!(session.completed_reps().is_empty());
        assert_eq!(session.started_at_ms(), 50_000);

        let last = feed_squat(&mut session, 50_000, 0.5);
        session.tick(last + 1500);
        assert_eq!(session.completed_reps()[0].rep_number, 1);
    }

    #[test]
    fn test_clear_all_paths_keeps_start_time() {
        let mut session = Session::default();
        session.start_session(1000);
        let last = feed_squat(&mut session, 1000, 0.5);
        session.tick(last + 1500);
        session.clear_all_paths();
        assert!(session.completed_reps().is_empty());
        assert_eq!(session.total_points(), 0);
        assert_eq!(session.started_at_ms(), 1000);
    }

    #[test]
    fn test_rep_numbers_are_sequential() {
        let mut session = Session::default();
        session.start_session(0);
        let mut t = 1000;
        for _ in 0..3 {
            let last = feed_squat(&mut session, t, 0.5);
            // Rest long enough for the next rep to start a new path
            t = last + 2500;
        }
        session.tick(t);
        let numbers: Vec<u32> = session
            .completed_reps()
            .iter()
            .map(|r| r.rep_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_new_rejects_invalid_tunables() {
        let mut config = Config::default();
        config.analyzer.cm_per_unit = -1.0;
        assert_matches!(Session::new(&config), Err(Error::InvalidSettings(_)));
    }

    #[test]
    fn test_invalid_overlay_update_keeps_previous_settings() {
        let mut session = Session::default();
        let before = session.overlay().clone();
        assert_matches!(
            session.update_overlay_settings(420.0, 300.0, Exercise::Deadlift, "3-1-1", "Full", 0.0),
            Err(Error::InvalidSettings(_))
        );
        assert_eq!(session.overlay(), &before);

        session
            .update_overlay_settings(420.0, 300.0, Exercise::Deadlift, "3-1-1", "Full", 900.0)
            .unwrap();
        assert_eq!(session.overlay().exercise, Exercise::Deadlift);
        assert_eq!(session.overlay().canvas_height, 900.0);
    }

    #[test]
    fn test_stats_are_idempotent_and_zero_when_empty() {
        let mut session = Session::default();
        session.start_session(10_000);
        let empty = session.session_stats(12_500);
        assert_eq!(empty.total_reps, 0);
        assert_eq!(empty.average_quality, 0.0);
        assert_eq!(empty.session_duration_secs, 2.5);

        let last = feed_squat(&mut session, 10_000, 0.5);
        session.tick(last + 1500);
        let first = session.session_stats(20_000);
        let second = session.session_stats(20_000);
        assert_eq!(first, second);
        assert_eq!(first.total_reps, 1);
        assert!(first.average_quality > 0.0 && first.average_quality <= 100.0);
    }

    #[test]
    fn test_generate_report_passes_reps_and_info() {
        let mut session = Session::default();
        session.start_session(1_700_000_000_000);
        let last = feed_squat(&mut session, 1_700_000_000_000, 0.5);
        session.tick(last + 1500);

        let sink = RecordingSink {
            seen: RefCell::new(Vec::new()),
            fail: false,
        };
        let handle = session.generate_report(&sink, Exercise::Squat, "2-1-2", 1_700_000_060_000);
        assert_eq!(handle.unwrap().location, "memory");

        let seen = sink.seen.borrow();
        let (count, info) = &seen[0];
        assert_eq!(*count, 1);
        assert_eq!(info.exercise, Exercise::Squat);
        assert_eq!(info.duration_secs, 60.0);
        assert_eq!(info.overlay_line_height, Some(400.0));
        assert_eq!(info.timestamp.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_moving_the_line_changes_deviation() {
        let mut session = Session::default();
        session.start_session(0);
        let last = feed_squat(&mut session, 0, 0.5);
        session.tick(last + 1500);

        let centered = session.rep_data(Exercise::Squat, "2-1-2")[0].metrics.path_deviation_cm;
        session
            .update_overlay_settings(560.0, 400.0, Exercise::Squat, "2-1-2", "Full", 800.0)
            .unwrap();
        let lowered = session.rep_data(Exercise::Squat, "2-1-2")[0].metrics.path_deviation_cm;

        assert!(centered > 0.0);
        assert!(lowered > centered);
    }

    #[test]
    fn test_generate_report_failure_returns_none() {
        let session = Session::default();
        let sink = RecordingSink {
            seen: RefCell::new(Vec::new()),
            fail: true,
        };
        assert!(session
            .generate_report(&sink, Exercise::Squat, "2-1-2", 0)
            .is_none());
    }
}

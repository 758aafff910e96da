use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::analyzer::RepData;
use crate::error::{Error, Result};
use crate::exercise::Exercise;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub exercise: Exercise,
    pub tempo: String,
    pub timestamp: DateTime<Utc>,
    pub duration_secs: f64,
    pub overlay_line_height: Option<f64>,
    pub range_of_motion: Option<f64>,
}

/// Where a report was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportHandle {
    pub location: String,
}

/// Receives the ordered rep records plus [`SessionInfo`] and returns a handle
/// naming where the report went. File sinks write to a temporary file and
/// rename it into place, so a failed write leaves no partial report.
pub trait ReportSink {
    fn write_report(&self, reps: &[RepData], info: &SessionInfo) -> Result<ReportHandle>;
}

/// Formats a millisecond timestamp the way report rows show it.
pub fn format_timestamp(timestamp_ms: u64) -> String {
    i64::try_from(timestamp_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

fn fixed0<S: Serializer>(v: &f64, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{:.0}", v))
}

fn fixed1<S: Serializer>(v: &f64, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{:.1}", v))
}

fn fixed2<S: Serializer>(v: &f64, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{:.2}", v))
}

/// One CSV line. Field order is the report's column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    #[serde(rename = "Rep_Number")]
    pub rep_number: u32,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Exercise")]
    pub exercise: String,
    #[serde(rename = "Tempo")]
    pub tempo: String,
    #[serde(rename = "Total_Distance_cm", serialize_with = "fixed2")]
    pub total_distance_cm: f64,
    #[serde(rename = "Vertical_Range_cm", serialize_with = "fixed2")]
    pub vertical_range_cm: f64,
    #[serde(rename = "Avg_Velocity_cm_s", serialize_with = "fixed2")]
    pub avg_velocity_cm_s: f64,
    #[serde(rename = "Peak_Velocity_cm_s", serialize_with = "fixed2")]
    pub peak_velocity_cm_s: f64,
    #[serde(rename = "Path_Deviation_cm", serialize_with = "fixed2")]
    pub path_deviation_cm: f64,
    #[serde(rename = "Duration_sec", serialize_with = "fixed1")]
    pub duration_sec: f64,
    #[serde(rename = "Eccentric_Duration_sec", serialize_with = "fixed1")]
    pub eccentric_duration_sec: f64,
    #[serde(rename = "Pause_Duration_sec", serialize_with = "fixed1")]
    pub pause_duration_sec: f64,
    #[serde(rename = "Concentric_Duration_sec", serialize_with = "fixed1")]
    pub concentric_duration_sec: f64,
    #[serde(rename = "Quality_Score", serialize_with = "fixed0")]
    pub quality_score: f64,
    #[serde(rename = "Grade")]
    pub grade: String,
    #[serde(rename = "Overlay_Line_Adherence", serialize_with = "fixed1")]
    pub overlay_line_adherence: f64,
}

impl From<&RepData> for ReportRow {
    fn from(rep: &RepData) -> Self {
        let m = &rep.metrics;
        Self {
            rep_number: rep.rep_number,
            timestamp: format_timestamp(rep.timestamp_ms),
            exercise: rep.exercise.to_string(),
            tempo: rep.tempo.clone(),
            total_distance_cm: m.total_distance_cm,
            vertical_range_cm: m.vertical_range_cm,
            avg_velocity_cm_s: m.avg_velocity_cm_s,
            peak_velocity_cm_s: m.peak_velocity_cm_s,
            path_deviation_cm: m.path_deviation_cm,
            duration_sec: m.duration_secs,
            eccentric_duration_sec: m.phases.eccentric_secs,
            pause_duration_sec: m.phases.pause_secs,
            concentric_duration_sec: m.phases.concentric_secs,
            quality_score: rep.quality_score,
            grade: rep.grade().to_string(),
            overlay_line_adherence: rep.overlay_line_adherence(),
        }
    }
}

/// Writes `reps` as CSV (header plus one row per rep) to any writer.
pub fn write_csv<W: Write>(writer: W, reps: &[RepData]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    if reps.is_empty() {
        // serialize() only emits headers alongside the first record
        wtr.write_record(REPORT_COLUMNS)?;
    }
    for rep in reps {
        wtr.serialize(ReportRow::from(rep))?;
    }
    wtr.flush()?;
    Ok(())
}

pub const REPORT_COLUMNS: [&str; 16] = [
    "Rep_Number",
    "Timestamp",
    "Exercise",
    "Tempo",
    "Total_Distance_cm",
    "Vertical_Range_cm",
    "Avg_Velocity_cm_s",
    "Peak_Velocity_cm_s",
    "Path_Deviation_cm",
    "Duration_sec",
    "Eccentric_Duration_sec",
    "Pause_Duration_sec",
    "Concentric_Duration_sec",
    "Quality_Score",
    "Grade",
    "Overlay_Line_Adherence",
];

/// Reads a CSV report back into rows.
pub fn read_csv_report<P: AsRef<Path>>(path: P) -> Result<Vec<ReportRow>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let rows = rdr.deserialize().collect::<std::result::Result<Vec<ReportRow>, _>>()?;
    Ok(rows)
}

fn report_file_name(info: &SessionInfo, extension: &str) -> String {
    format!(
        "barpath_{}_{}.{}",
        info.exercise.to_string().to_lowercase(),
        info.timestamp.format("%Y%m%d_%H%M%S"),
        extension
    )
}

/// Writes through `<target>.tmp` and renames it over `target`.
fn write_atomically<F>(target: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut fs::File) -> Result<()>,
{
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = target.with_extension("tmp");
    let result = fs::File::create(&tmp)
        .map_err(Error::from)
        .and_then(|mut file| {
            write(&mut file)?;
            file.sync_all()?;
            Ok(())
        })
        .and_then(|()| fs::rename(&tmp, target).map_err(Error::from));

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

#[derive(Debug, Clone)]
pub struct CsvReportSink {
    dir: PathBuf,
}

impl CsvReportSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl ReportSink for CsvReportSink {
    fn write_report(&self, reps: &[RepData], info: &SessionInfo) -> Result<ReportHandle> {
        let target = self.dir.join(report_file_name(info, "csv"));
        write_atomically(&target, |file| write_csv(file, reps))?;
        Ok(ReportHandle {
            location: target.display().to_string(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonReport {
    pub session: SessionInfo,
    pub reps: Vec<RepData>,
}

#[derive(Debug, Clone)]
pub struct JsonReportSink {
    dir: PathBuf,
}

impl JsonReportSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl ReportSink for JsonReportSink {
    fn write_report(&self, reps: &[RepData], info: &SessionInfo) -> Result<ReportHandle> {
        let target = self.dir.join(report_file_name(info, "json"));
        let report = JsonReport {
            session: info.clone(),
            reps: reps.to_vec(),
        };
        write_atomically(&target, |file| {
            serde_json::to_writer_pretty(&mut *file, &report)?;
            Ok(())
        })?;
        Ok(ReportHandle {
            location: target.display().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{PhaseDurations, RepMetrics};
    use tempfile::tempdir;

    fn sample_rep() -> RepData {
        let metrics = RepMetrics {
            total_distance_cm: 123.456,
            vertical_range_cm: 60.004,
            avg_velocity_cm_s: 61.7281,
            peak_velocity_cm_s: 99.999,
            path_deviation_cm: 0.347,
            duration_secs: 2.04,
            phases: PhaseDurations {
                eccentric_secs: 0.96,
                pause_secs: 0.12,
                concentric_secs: 0.96,
            },
            tempo_score: 88.0,
        };
        RepData::new(1, 1_700_000_000_123, Exercise::Squat, "2-1-2", metrics, 87.6)
    }

    fn sample_info() -> SessionInfo {
        SessionInfo {
            exercise: Exercise::Squat,
            tempo: "2-1-2".into(),
            timestamp: DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap(),
            duration_secs: 42.0,
            overlay_line_height: Some(400.0),
            range_of_motion: Some(400.0),
        }
    }

    #[test]
    fn test_csv_columns_and_precision() {
        let mut out = Vec::new();
        write_csv(&mut out, &[sample_rep()]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();

        assert_eq!(lines.next().unwrap(), REPORT_COLUMNS.join(","));
        let adherence = sample_rep().overlay_line_adherence();
        assert_eq!(
            lines.next().unwrap(),
            format!(
                "1,2023-11-14 22:13:20.123,SQUAT,2-1-2,123.46,60.00,61.73,100.00,0.35,2.0,1.0,0.1,1.0,88,B,{:.1}",
                adherence
            )
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_empty_report_has_header_only() {
        let mut out = Vec::new();
        write_csv(&mut out, &[]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.trim_end(), REPORT_COLUMNS.join(","));
    }

    #[test]
    fn test_csv_sink_round_trip() {
        let dir = tempdir().unwrap();
        let sink = CsvReportSink::new(dir.path());
        let handle = sink.write_report(&[sample_rep()], &sample_info()).unwrap();

        assert!(handle.location.ends_with("barpath_squat_20231114_221320.csv"));
        let rows = read_csv_report(&handle.location).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rep_number, 1);
        assert_eq!(rows[0].exercise, "SQUAT");
        assert_eq!(rows[0].total_distance_cm, 123.46);
        assert_eq!(rows[0].quality_score, 88.0);
        assert_eq!(rows[0].grade, "B");

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_json_sink_round_trip() {
        let dir = tempdir().unwrap();
        let sink = JsonReportSink::new(dir.path());
        let handle = sink.write_report(&[sample_rep()], &sample_info()).unwrap();

        let bytes = fs::read(&handle.location).unwrap();
        let report: JsonReport = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(report.session, sample_info());
        assert_eq!(report.reps.len(), 1);

        let (read, written) = (&report.reps[0], sample_rep());
        assert_eq!(read.rep_number, written.rep_number);
        assert_eq!(read.exercise, written.exercise);
        assert_eq!(read.tempo, written.tempo);
        assert!((read.quality_score - written.quality_score).abs() < 1e-9);
        assert!(
            (read.overlay_line_adherence() - written.overlay_line_adherence()).abs() < 1e-9
        );
        assert!(
            (read.metrics.total_distance_cm - written.metrics.total_distance_cm).abs() < 1e-9
        );
    }

    #[test]
    fn test_sink_failure_is_an_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"file").unwrap();
        let sink = CsvReportSink::new(&blocker);
        assert!(sink.write_report(&[sample_rep()], &sample_info()).is_err());
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00.000");
        assert_eq!(format_timestamp(u64::MAX), u64::MAX.to_string());
    }
}

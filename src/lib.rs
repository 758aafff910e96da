// Library surface for the CLI, integration tests and host applications.
pub mod analyzer;
pub mod config;
pub mod error;
pub mod exercise;
pub mod geometry;
pub mod report;
pub mod runtime;
pub mod segmenter;
pub mod session;
pub mod simulate;
pub mod time_series;
pub mod trajectory;
pub mod util;

pub use analyzer::{Grade, RepAnalyzer, RepData, RepMetrics};
pub use config::{Config, ConfigStore, FileConfigStore, OverlaySettings};
pub use error::{Error, Result};
pub use exercise::{Exercise, Tempo};
pub use geometry::{BoundingBox, Detection, Point};
pub use report::{CsvReportSink, JsonReportSink, ReportHandle, ReportSink, SessionInfo};
pub use segmenter::CompletedRep;
pub use session::{Session, SessionStats};
pub use trajectory::Path;

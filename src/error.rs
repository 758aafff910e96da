use thiserror::Error;

/// Errors surfaced by the barpath library.
///
/// Segmentation rejections and failed rep analysis are not errors; they are
/// reported as `false`/`None` by the components that produce them.
#[derive(Error, Debug)]
pub enum Error {
    /// Overlay or engine settings that would produce NaN or infinite geometry
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A report sink could not produce its output
    #[error("Report error: {0}")]
    Report(String),
}

pub type Result<T> = std::result::Result<T, Error>;

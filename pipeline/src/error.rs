//! Error types for the pipeline.

use bayeslm_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that abort a pipeline run.
///
/// Rendering the model graph is the only step allowed to fail without
/// aborting; it is logged instead of surfacing here.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Reading or writing a file failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Encoding or decoding the observation table failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// Drawing a chart failed.
    #[error("Chart error: {0}")]
    Chart(String),
    /// Encoding a chart as PNG failed.
    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),
    /// The configuration is unreadable or out of range.
    #[error("Invalid configuration: {0}")]
    Config(String),
    /// Model construction, sampling or inference-data handling failed.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Map a plotters drawing error into [`PipelineError::Chart`].
pub(crate) fn chart_err<E: std::fmt::Display>(err: E) -> PipelineError {
    PipelineError::Chart(err.to_string())
}

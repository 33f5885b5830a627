//! Model invariant and parse errors.

use std::path::PathBuf;

/// Errors raised when constructing or loading model values.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Invalid segment span for {path}: start {start:.3}s, end {end:.3}s")]
    InvalidSpan { path: PathBuf, start: f64, end: f64 },

    #[error("Invalid job: {message}")]
    InvalidJob { message: String },

    #[error("Invalid subtitle at entry {entry}: {message}")]
    InvalidSubtitle { entry: usize, message: String },

    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl ModelError {
    pub fn invalid_job(msg: impl Into<String>) -> Self {
        Self::InvalidJob {
            message: msg.into(),
        }
    }
}

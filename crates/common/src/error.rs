//! Error types shared across Reelsmith crates.

use std::path::PathBuf;

/// Top-level error type for Reelsmith operations.
///
/// The first six variants form the pipeline taxonomy. `SegmentProcess` and
/// `BatchAssembly` are recoverable: the pipeline reports them to its observer
/// and keeps going. The remaining pipeline kinds terminate the job.
#[derive(Debug, thiserror::Error)]
pub enum ReelError {
    #[error("No usable media: none of the {sources} source(s) produced a segment")]
    NoUsableMedia { sources: usize },

    #[error("Insufficient material: no segment is at least {min_secs:.2}s long")]
    InsufficientMaterial { min_secs: f64 },

    #[error("Empty timeline: {message}")]
    EmptyTimeline { message: String },

    #[error("Segment {index} failed: {message}")]
    SegmentProcess { index: usize, message: String },

    #[error("Batch {batch} failed: {message}")]
    BatchAssembly { batch: usize, message: String },

    #[error("Encode error: {message}")]
    Encode {
        message: String,
        /// Diagnostic file written next to the intended output, if any.
        diagnostic: Option<PathBuf>,
    },

    #[error("Probe error: {message}")]
    Probe { message: String },

    #[error("Invalid job: {message}")]
    InvalidJob { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Encoder capacity exceeded: {message}")]
    CapacityExceeded { message: String },

    #[error("Required tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ReelError.
pub type ReelResult<T> = Result<T, ReelError>;

impl ReelError {
    pub fn empty_timeline(msg: impl Into<String>) -> Self {
        Self::EmptyTimeline {
            message: msg.into(),
        }
    }

    pub fn segment(index: usize, msg: impl Into<String>) -> Self {
        Self::SegmentProcess {
            index,
            message: msg.into(),
        }
    }

    pub fn batch(batch: usize, msg: impl Into<String>) -> Self {
        Self::BatchAssembly {
            batch,
            message: msg.into(),
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode {
            message: msg.into(),
            diagnostic: None,
        }
    }

    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe {
            message: msg.into(),
        }
    }

    pub fn invalid_job(msg: impl Into<String>) -> Self {
        Self::InvalidJob {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn capacity(msg: impl Into<String>) -> Self {
        Self::CapacityExceeded {
            message: msg.into(),
        }
    }

    /// Whether the pipeline absorbs this error instead of failing the job.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SegmentProcess { .. } | Self::BatchAssembly { .. }
        )
    }
}

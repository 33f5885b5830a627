//! Pipeline observation: stage changes, absorbed errors, and encode progress.

use std::fmt;
use std::sync::Mutex;

use reelsmith_common::ReelError;
use serde::{Deserialize, Serialize};

/// Lifecycle stage of one render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Segmenting,
    Accumulating,
    Normalizing,
    Batching,
    Encoding,
    Done,
    Failed,
}

impl JobStage {
    /// Position in the forward order. `Done` and `Failed` share the last slot.
    pub fn ordinal(self) -> u8 {
        match self {
            JobStage::Segmenting => 0,
            JobStage::Accumulating => 1,
            JobStage::Normalizing => 2,
            JobStage::Batching => 3,
            JobStage::Encoding => 4,
            JobStage::Done | JobStage::Failed => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStage::Done | JobStage::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStage::Segmenting => "segmenting",
            JobStage::Accumulating => "accumulating",
            JobStage::Normalizing => "normalizing",
            JobStage::Batching => "batching",
            JobStage::Encoding => "encoding",
            JobStage::Done => "done",
            JobStage::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives pipeline events. All methods default to no-ops.
///
/// Recoverable errors (skipped segments, skipped batches) are only ever
/// reported here; they never reach the caller as `Err`.
pub trait PipelineObserver: Send + Sync {
    fn on_stage(&self, _stage: JobStage) {}

    fn on_warning(&self, _warning: &ReelError) {}

    /// Final encode progress in `[0, 1]`.
    fn on_progress(&self, _fraction: f64) {}
}

/// Default observer: forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_stage(&self, stage: JobStage) {
        tracing::info!(stage = %stage, "Pipeline stage");
    }

    fn on_warning(&self, warning: &ReelError) {
        tracing::warn!(error = %warning, "Recovered from pipeline error");
    }

    fn on_progress(&self, fraction: f64) {
        tracing::debug!(progress = format!("{:.1}%", fraction * 100.0), "Encoding");
    }
}

/// Observer that keeps everything it sees. Useful in tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    stages: Mutex<Vec<JobStage>>,
    warnings: Mutex<Vec<String>>,
    progress: Mutex<Vec<f64>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stages(&self) -> Vec<JobStage> {
        self.stages.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Display strings of the reported warnings.
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn progress(&self) -> Vec<f64> {
        self.progress.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl PipelineObserver for RecordingObserver {
    fn on_stage(&self, stage: JobStage) {
        if let Ok(mut stages) = self.stages.lock() {
            stages.push(stage);
        }
    }

    fn on_warning(&self, warning: &ReelError) {
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.push(warning.to_string());
        }
    }

    fn on_progress(&self, fraction: f64) {
        if let Ok(mut progress) = self.progress.lock() {
            progress.push(fraction);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert!(JobStage::Segmenting.ordinal() < JobStage::Encoding.ordinal());
        assert_eq!(JobStage::Done.ordinal(), JobStage::Failed.ordinal());
        assert!(JobStage::Failed.is_terminal());
        assert!(!JobStage::Batching.is_terminal());
    }

    #[test]
    fn test_recording_observer() {
        let observer = RecordingObserver::new();
        observer.on_stage(JobStage::Segmenting);
        observer.on_warning(&ReelError::segment(2, "bad frame"));
        observer.on_progress(0.5);

        assert_eq!(observer.stages(), vec![JobStage::Segmenting]);
        assert_eq!(observer.warnings(), vec!["Segment 2 failed: bad frame"]);
        assert_eq!(observer.progress(), vec![0.5]);
    }
}

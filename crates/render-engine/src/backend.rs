//! Media backends: the only place clips become encoded files.

use std::path::{Path, PathBuf};

use reelsmith_common::{EncoderConfig, ReelError, ReelResult};
use reelsmith_processing_core::PipelineObserver;
use reelsmith_project_model::Clip;

use crate::command::{find_tool, run_tool, FfmpegCommand, ProgressState};
use crate::encoder::{EncodeFailure, EncodePlan};
use crate::filters::{segment_filter_graph, segment_input_args, SEGMENT_OUTPUT_LABEL};
use crate::scope::JobScope;

/// Realizes clip descriptions, joins encoded parts, and runs the final encode.
pub trait MediaBackend: Send + Sync {
    /// Encode one clip to `output` at canvas size, video only.
    fn render_clip(&self, clip: &Clip, output: &Path, scope: &JobScope) -> ReelResult<()>;

    /// Join already-encoded parts end to end, in order, without re-encoding.
    fn concat(&self, parts: &[PathBuf], output: &Path, scope: &JobScope) -> ReelResult<()>;

    /// Produce the final output described by `plan`.
    fn encode(
        &self,
        plan: &EncodePlan,
        scope: &JobScope,
        observer: &dyn PipelineObserver,
    ) -> Result<(), EncodeFailure>;

    /// Threads each encoder process may use.
    fn threads(&self) -> usize {
        1
    }

    /// Check if this backend is available on the system.
    fn is_available(&self) -> bool;

    /// Backend name.
    fn name(&self) -> &str;
}

/// Backend driving the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    config: EncoderConfig,
    threads: usize,
}

impl FfmpegBackend {
    pub fn new(config: EncoderConfig, threads: usize) -> Self {
        Self {
            config,
            threads: threads.max(1),
        }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }
}

impl MediaBackend for FfmpegBackend {
    fn render_clip(&self, clip: &Clip, output: &Path, scope: &JobScope) -> ReelResult<()> {
        let fps = self.config.fps;
        let args = FfmpegCommand::new(output)
            .input_with(segment_input_args(clip, fps), clip.source.source_path())
            .filter_complex(segment_filter_graph(clip, fps))
            .map(SEGMENT_OUTPUT_LABEL)
            .output_arg("-an")
            .video_codec(&self.config.video_codec)
            .preset(&self.config.preset)
            .crf(self.config.intermediate_crf)
            .threads(self.threads)
            .build_args();

        tracing::debug!(index = clip.index, args = ?args, "Rendering clip");
        let result = run_tool(&self.config.ffmpeg_path, &args, scope.registry(), None)?;
        if !result.success() {
            return Err(ReelError::segment(
                clip.index,
                format!("ffmpeg exited with {}: {}", result.status, result.stderr_tail()),
            ));
        }
        Ok(())
    }

    fn concat(&self, parts: &[PathBuf], output: &Path, scope: &JobScope) -> ReelResult<()> {
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "concat".to_string());
        let list_path = scope.intermediate(&format!("{stem}.list.txt"));
        std::fs::write(&list_path, concat_list(parts))?;

        let args = FfmpegCommand::new(output)
            .input_with(["-f", "concat", "-safe", "0"], &list_path)
            .output_args(["-c", "copy"])
            .build_args();

        let result = run_tool(&self.config.ffmpeg_path, &args, scope.registry(), None);
        if let Err(err) = std::fs::remove_file(&list_path) {
            tracing::debug!(error = %err, "Failed to remove concat list");
        }
        let result = result?;
        if !result.success() {
            return Err(ReelError::Other(anyhow::anyhow!(
                "ffmpeg concat exited with {}: {}",
                result.status,
                result.stderr_tail()
            )));
        }
        Ok(())
    }

    fn encode(
        &self,
        plan: &EncodePlan,
        scope: &JobScope,
        observer: &dyn PipelineObserver,
    ) -> Result<(), EncodeFailure> {
        let args = plan.ffmpeg_args(&self.config, self.threads);
        let report = |state: &ProgressState| observer.on_progress(state.fraction(plan.duration));

        tracing::debug!(args = ?args, "Running final encode");
        let result = run_tool(&self.config.ffmpeg_path, &args, scope.registry(), Some(&report))?;
        if !result.success() {
            return Err(EncodeFailure::new(
                ReelError::encode(format!("ffmpeg exited with {}", result.status)),
                result.stderr_tail(),
            ));
        }
        if !plan.output.is_file() {
            return Err(EncodeFailure::new(
                ReelError::encode("ffmpeg reported success but wrote no output"),
                result.stderr_tail(),
            ));
        }
        Ok(())
    }

    fn threads(&self) -> usize {
        self.threads
    }

    fn is_available(&self) -> bool {
        find_tool(&self.config.ffmpeg_path).is_ok()
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Body of an ffmpeg concat-demuxer list file.
pub fn concat_list(parts: &[PathBuf]) -> String {
    parts
        .iter()
        .map(|part| {
            let path = part.to_string_lossy().replace('\'', "'\\''");
            format!("file '{path}'\n")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_list_quotes_paths() {
        let list = concat_list(&[
            PathBuf::from("/work/seg-00000.mp4"),
            PathBuf::from("/work/it's.mp4"),
        ]);
        assert_eq!(
            list,
            "file '/work/seg-00000.mp4'\nfile '/work/it'\\''s.mp4'\n"
        );
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let mut config = EncoderConfig::default();
        config.ffmpeg_path = PathBuf::from("/nonexistent/ffmpeg-reelsmith");
        let backend = FfmpegBackend::new(config, 0);
        assert!(!backend.is_available());
        assert_eq!(backend.threads(), 1);
    }

    #[test]
    fn test_render_clip_reports_missing_binary() {
        use reelsmith_project_model::{FrameSize, SegmentKind, SourceSegment, Timeline, TransitionKind};
        use std::sync::Arc;

        let mut config = EncoderConfig::default();
        config.ffmpeg_path = PathBuf::from("/nonexistent/ffmpeg-reelsmith");
        let backend = FfmpegBackend::new(config, 1);
        let scope = JobScope::new().unwrap();

        let segment = SourceSegment::new(
            "/m/a.mp4",
            0.0,
            3.0,
            FrameSize::new(1920, 1080),
            30.0,
            SegmentKind::Video,
        )
        .unwrap();
        let mut timeline = Timeline::new();
        timeline.push(Arc::new(segment), 3.0, TransitionKind::None);
        let clip = Clip::from_placed(0, &timeline.placements()[0]);

        let err = backend
            .render_clip(&clip, &scope.intermediate("seg.mp4"), &scope)
            .unwrap_err();
        assert!(matches!(err, ReelError::ToolNotFound { .. }));
    }
}

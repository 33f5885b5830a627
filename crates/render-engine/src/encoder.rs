//! Final encode: composite video + audio mix + subtitle overlays → output file.

use std::backtrace::Backtrace;
use std::error::Error as _;
use std::path::{Path, PathBuf};

use reelsmith_common::{EncoderConfig, ReelError, ReelResult};
use reelsmith_processing_core::PipelineObserver;

use crate::audio::{AudioMix, AUDIO_OUTPUT_LABEL};
use crate::backend::MediaBackend;
use crate::command::FfmpegCommand;
use crate::scope::JobScope;

/// Label of the final video stream.
pub const VIDEO_OUTPUT_LABEL: &str = "[vout]";

/// Everything the final encode needs.
#[derive(Debug, Clone)]
pub struct EncodePlan {
    /// The assembled video from the batch compositor.
    pub video: PathBuf,

    /// Output length in seconds. Audio is trimmed or padded to match.
    pub duration: f64,

    pub audio: AudioMix,

    /// Extra filters applied to the video in order (subtitle `drawtext`s).
    pub video_filters: Vec<String>,

    pub output: PathBuf,
}

impl EncodePlan {
    /// Combined video and audio filtergraph.
    pub fn filter_graph(&self) -> String {
        let video_chain = if self.video_filters.is_empty() {
            "null".to_string()
        } else {
            self.video_filters.join(",")
        };
        let bgm_input = 2;
        format!(
            "[0:v]{video_chain}{VIDEO_OUTPUT_LABEL};{}",
            self.audio.filter_graph(self.duration, 1, bgm_input)
        )
    }

    /// Complete ffmpeg argument list for this plan.
    pub fn ffmpeg_args(&self, config: &EncoderConfig, threads: usize) -> Vec<String> {
        let mut command = FfmpegCommand::new(&self.output)
            .input(&self.video)
            .input(&self.audio.narration);
        if let Some(bgm) = &self.audio.bgm {
            command = command.input_with(["-stream_loop", "-1"], &bgm.path);
        }

        command
            .filter_complex(self.filter_graph())
            .map(VIDEO_OUTPUT_LABEL)
            .map(AUDIO_OUTPUT_LABEL)
            .output_args(["-t".to_string(), format!("{:.3}", self.duration)])
            .video_codec(&config.video_codec)
            .output_args(["-b:v", config.video_bitrate.as_str()])
            .preset(&config.preset)
            .crf(config.crf)
            .output_args(["-r".to_string(), config.fps.to_string()])
            .output_args(["-pix_fmt", "yuv420p"])
            .audio_codec(&config.audio_codec)
            .output_args(["-b:a", config.audio_bitrate.as_str()])
            .output_args(["-movflags", "+faststart"])
            .threads(threads)
            .with_progress()
            .build_args()
    }

    /// Plain-text summary written next to the output before encoding.
    pub fn debug_report(&self, args: &[String]) -> String {
        format!(
            "video={}\nduration_secs={:.3}\nnarration={}\nbgm={}\nsubtitle_filters={}\nffmpeg_args={}\n",
            self.video.display(),
            self.duration,
            self.audio.narration.display(),
            self.audio
                .bgm
                .as_ref()
                .map(|bgm| bgm.path.display().to_string())
                .unwrap_or_else(|| "none".to_string()),
            self.video_filters.len(),
            args.join(" "),
        )
    }
}

/// A failed final encode, with whatever the encoder printed last.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct EncodeFailure {
    #[source]
    pub error: ReelError,
    pub stderr_tail: String,
}

impl EncodeFailure {
    pub fn new(error: ReelError, stderr_tail: impl Into<String>) -> Self {
        Self {
            error,
            stderr_tail: stderr_tail.into(),
        }
    }
}

impl From<ReelError> for EncodeFailure {
    fn from(error: ReelError) -> Self {
        Self::new(error, String::new())
    }
}

/// `<output>` with `suffix` appended to the full file name.
pub fn sibling_path(output: &Path, suffix: &str) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Run the final encode through `backend`.
///
/// On failure a diagnostic file `<output>.error.txt` is written, any partial
/// output is removed, and the returned [`ReelError::Encode`] points at the
/// diagnostic.
pub fn run_final_encode(
    backend: &dyn MediaBackend,
    plan: &EncodePlan,
    config: &EncoderConfig,
    scope: &JobScope,
    write_debug_report: bool,
    observer: &dyn PipelineObserver,
) -> ReelResult<PathBuf> {
    if let Some(parent) = plan.output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    if write_debug_report {
        let debug_path = sibling_path(&plan.output, ".ffmpeg-debug.txt");
        let report = plan.debug_report(&plan.ffmpeg_args(config, backend.threads()));
        if let Err(err) = std::fs::write(&debug_path, report) {
            tracing::warn!(error = %err, path = %debug_path.display(), "Failed to write ffmpeg debug report");
        } else {
            tracing::info!(path = %debug_path.display(), "Wrote ffmpeg debug report");
        }
    }

    let started = std::time::Instant::now();
    match backend.encode(plan, scope, observer) {
        Ok(()) => {
            tracing::info!(
                output = %plan.output.display(),
                duration_secs = plan.duration,
                elapsed_secs = started.elapsed().as_secs_f64(),
                "Final encode finished"
            );
            Ok(plan.output.clone())
        }
        Err(failure) => {
            if plan.output.exists() {
                if let Err(err) = std::fs::remove_file(&plan.output) {
                    tracing::warn!(error = %err, "Failed to remove partial output");
                }
            }

            let diagnostic = sibling_path(&plan.output, ".error.txt");
            let diagnostic = match std::fs::write(&diagnostic, failure_report(&failure)) {
                Ok(()) => Some(diagnostic),
                Err(err) => {
                    tracing::warn!(error = %err, path = %diagnostic.display(), "Failed to write encode diagnostic");
                    None
                }
            };
            tracing::error!(
                error = %failure.error,
                diagnostic = ?diagnostic,
                "Final encode failed"
            );
            Err(ReelError::Encode {
                message: failure.error.to_string(),
                diagnostic,
            })
        }
    }
}

fn failure_report(failure: &EncodeFailure) -> String {
    let mut chain = Vec::new();
    let mut source = failure.error.source();
    while let Some(err) = source {
        chain.push(format!("  caused by: {err}"));
        source = err.source();
    }

    format!(
        "timestamp: {}\nerror: {}\n{}\n\n--- encoder stderr (tail) ---\n{}\n\n--- backtrace ---\n{}\n",
        chrono::Utc::now().to_rfc3339(),
        failure.error,
        chain.join("\n"),
        failure.stderr_tail,
        Backtrace::force_capture(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::BgmTrack;

    fn plan(output: PathBuf) -> EncodePlan {
        EncodePlan {
            video: PathBuf::from("/work/assembled.mp4"),
            duration: 30.0,
            audio: AudioMix {
                narration: PathBuf::from("/media/voice.mp3"),
                narration_volume: 1.0,
                bgm: Some(BgmTrack {
                    path: PathBuf::from("/music/song.mp3"),
                    volume: 0.2,
                    fade_out: 3.0,
                }),
            },
            video_filters: vec!["drawtext=textfile=/work/cue.txt".to_string()],
            output,
        }
    }

    #[test]
    fn test_args_loop_bgm_and_cap_duration() {
        let args = plan(PathBuf::from("/out/final.mp4")).ffmpeg_args(&EncoderConfig::default(), 4);

        let bgm = args.iter().position(|a| a == "/music/song.mp3").unwrap();
        assert_eq!(&args[bgm - 3..bgm], &["-stream_loop", "-1", "-i"]);
        assert!(args.windows(2).any(|w| w == ["-t", "30.000"]));
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
        assert!(args.windows(2).any(|w| w == ["-b:v", "2000k"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "aac"]));
        assert!(args.windows(2).any(|w| w == ["-r", "30"]));
        assert!(args.windows(2).any(|w| w == ["-threads", "4"]));
        assert_eq!(args.last().map(String::as_str), Some("/out/final.mp4"));
    }

    #[test]
    fn test_graph_without_overlays_passes_video_through() {
        let mut plan = plan(PathBuf::from("/out/final.mp4"));
        plan.video_filters.clear();
        plan.audio.bgm = None;
        assert_eq!(
            plan.filter_graph(),
            "[0:v]null[vout];[1:a]volume=1.000,atrim=0:30.000,asetpts=PTS-STARTPTS[aout]"
        );
    }

    #[test]
    fn test_sibling_path_appends_to_name() {
        assert_eq!(
            sibling_path(Path::new("/out/final.mp4"), ".error.txt"),
            PathBuf::from("/out/final.mp4.error.txt")
        );
    }
}

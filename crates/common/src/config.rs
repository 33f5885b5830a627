//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Final and intermediate encode settings.
    pub encoder: EncoderConfig,

    /// Encoder process and RAM limits shared across jobs.
    pub resources: ResourceConfig,

    /// Pipeline tuning knobs.
    pub pipeline: PipelineDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Fixed encode parameters. Nothing here is derived from the input media.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// ffmpeg binary (name resolved on `PATH`, or absolute path).
    pub ffmpeg_path: PathBuf,

    /// ffprobe binary.
    pub ffprobe_path: PathBuf,

    /// Output frame rate.
    pub fps: u32,

    /// Video codec for both intermediates and the final output.
    pub video_codec: String,

    /// Target video bitrate for the final output (ffmpeg syntax, e.g. `2000k`).
    pub video_bitrate: String,

    /// x264 preset (quality/speed trade-off).
    pub preset: String,

    /// Constant rate factor for the final output.
    pub crf: u8,

    /// Constant rate factor for per-segment intermediates.
    pub intermediate_crf: u8,

    /// Audio codec for the final output.
    pub audio_codec: String,

    /// Audio bitrate for the final output.
    pub audio_bitrate: String,
}

/// Limits for concurrent encoder processes.
///
/// RAM use per process is estimated as `base_process_mb + per_thread_mb * threads`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Maximum concurrent encoder processes across all jobs.
    pub max_processes: usize,

    /// Threads handed to each encoder process.
    pub threads_per_process: usize,

    /// Total RAM budget for encoder processes, in MiB.
    pub ram_limit_mb: u64,

    /// Fixed per-process RAM estimate, in MiB.
    pub base_process_mb: u64,

    /// Additional RAM estimate per encoder thread, in MiB.
    pub per_thread_mb: u64,
}

/// Defaults for the assembly pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineDefaults {
    /// Segments concatenated together before merging into the running result.
    pub batch_size: usize,

    /// Safety cap on accumulator passes over the segment pool.
    pub max_iterations: usize,

    /// Sources whose smaller dimension is below this are skipped (0 = off).
    pub min_source_dimension: u32,

    /// Duration given to still-image sources, in seconds.
    pub image_segment_duration: f64,

    /// Fade-out applied to the end of the background music, in seconds.
    pub bgm_fade_out_secs: f64,

    /// Directory searched for `*.mp3` files when BGM is `random`.
    pub bgm_dir: Option<PathBuf>,

    /// Write `<output>.ffmpeg-debug.txt` with the final encoder arguments.
    pub write_debug_report: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "reelsmith=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            fps: 30,
            video_codec: "libx264".to_string(),
            video_bitrate: "2000k".to_string(),
            preset: "ultrafast".to_string(),
            crf: 28,
            intermediate_crf: 18,
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
        }
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            max_processes: 3,
            threads_per_process: 2,
            ram_limit_mb: 7 * 1024,
            base_process_mb: 400,
            per_thread_mb: 200,
        }
    }
}

impl Default for PipelineDefaults {
    fn default() -> Self {
        Self {
            batch_size: 3,
            max_iterations: 1000,
            min_source_dimension: 480,
            image_segment_duration: 4.0,
            bgm_fade_out_secs: 3.0,
            bgm_dir: None,
            write_debug_report: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &std::path::Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("reelsmith").join("config.json")
}

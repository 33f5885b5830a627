//! Render job descriptor and its parameter types.
//!
//! A [`RenderJob`] is created once per invocation, already validated by the
//! caller's configuration surface, and read-only for the rest of the run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cue::SubtitleCue;
use crate::error::ModelError;

/// Output aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoAspect {
    /// 16:9 widescreen.
    #[serde(alias = "16:9")]
    Landscape,
    /// 9:16 vertical (social media).
    #[default]
    #[serde(alias = "9:16")]
    Portrait,
    /// 1:1 square.
    #[serde(alias = "1:1")]
    Square,
}

impl VideoAspect {
    /// The fixed output canvas for this aspect.
    pub fn canvas(self) -> OutputCanvas {
        match self {
            VideoAspect::Landscape => OutputCanvas::new(1920, 1080),
            VideoAspect::Portrait => OutputCanvas::new(1080, 1920),
            VideoAspect::Square => OutputCanvas::new(1080, 1080),
        }
    }
}

/// Output frame dimensions shared by every segment of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputCanvas {
    pub width: u32,
    pub height: u32,
}

impl OutputCanvas {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width divided by height.
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }
}

/// How the segment pool is ordered before accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcatMode {
    /// Keep source order.
    Sequential,
    /// Uniform random permutation of the pool.
    #[default]
    Random,
}

/// Visual transition applied to a placed segment.
///
/// `Shuffle` resolves to one of the four concrete kinds, independently per
/// segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    #[default]
    None,
    #[serde(alias = "FadeIn")]
    FadeIn,
    #[serde(alias = "FadeOut")]
    FadeOut,
    #[serde(alias = "SlideIn")]
    SlideIn,
    #[serde(alias = "SlideOut")]
    SlideOut,
    #[serde(alias = "Shuffle")]
    Shuffle,
}

impl TransitionKind {
    /// The kinds `Shuffle` chooses between.
    pub const CONCRETE: [TransitionKind; 4] = [
        TransitionKind::FadeIn,
        TransitionKind::FadeOut,
        TransitionKind::SlideIn,
        TransitionKind::SlideOut,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TransitionKind::None => "none",
            TransitionKind::FadeIn => "fade_in",
            TransitionKind::FadeOut => "fade_out",
            TransitionKind::SlideIn => "slide_in",
            TransitionKind::SlideOut => "slide_out",
            TransitionKind::Shuffle => "shuffle",
        }
    }
}

/// One entry of the source media pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMedia {
    /// Video or still image file.
    pub path: PathBuf,

    /// Opaque provider metadata (e.g. `pexels`, `local`); not used by the pipeline.
    #[serde(default)]
    pub provider: String,
}

impl SourceMedia {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            provider: String::new(),
        }
    }
}

/// Narration track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationTrack {
    /// Decodable audio file.
    pub path: PathBuf,

    /// Known duration in seconds; probed when absent.
    #[serde(default)]
    pub duration_secs: Option<f64>,

    /// Volume multiplier.
    #[serde(default = "default_narration_volume")]
    pub volume: f64,
}

/// Background music source selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BgmMode {
    /// No background music.
    #[default]
    None,
    /// Use `BgmSettings::file`.
    File,
    /// Pick a random `*.mp3` from the configured music directory.
    Random,
}

/// Background music settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BgmSettings {
    pub mode: BgmMode,

    /// Explicit file; takes precedence whenever it exists.
    pub file: Option<PathBuf>,

    /// Volume multiplier.
    pub volume: f64,
}

impl Default for BgmSettings {
    fn default() -> Self {
        Self {
            mode: BgmMode::None,
            file: None,
            volume: 0.2,
        }
    }
}

/// Vertical placement of subtitle overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtitlePosition {
    #[default]
    Bottom,
    Top,
    Center,
    /// `SubtitleStyle::custom_position` percent of the free vertical space.
    Custom,
}

/// Subtitle rendering style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleStyle {
    /// TrueType/OpenType font file used for measuring and drawing.
    pub font_path: Option<PathBuf>,

    /// Font size in pixels.
    pub font_size: u32,

    /// Text color (`#RRGGBB`).
    pub fore_color: String,

    /// Box color behind the text; no box when absent.
    pub background_color: Option<String>,

    /// Outline color (`#RRGGBB`).
    pub stroke_color: String,

    /// Outline width in pixels.
    pub stroke_width: f64,

    pub position: SubtitlePosition,

    /// Percentage used by [`SubtitlePosition::Custom`], in `[0, 100]`.
    pub custom_position: f64,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font_path: None,
            font_size: 60,
            fore_color: "#FFFFFF".to_string(),
            background_color: None,
            stroke_color: "#000000".to_string(),
            stroke_width: 1.5,
            position: SubtitlePosition::Bottom,
            custom_position: 70.0,
        }
    }
}

/// Subtitle input: inline cues, an SRT file, or both (inline first).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleInput {
    pub enabled: bool,
    pub cues: Vec<SubtitleCue>,
    pub srt_path: Option<PathBuf>,
    pub style: SubtitleStyle,
}

/// Top-level render job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderJob {
    /// Finished video destination.
    pub output_path: PathBuf,

    /// Raw media pool.
    pub sources: Vec<SourceMedia>,

    pub narration: NarrationTrack,

    #[serde(default)]
    pub bgm: BgmSettings,

    #[serde(default)]
    pub subtitles: SubtitleInput,

    #[serde(default)]
    pub aspect: VideoAspect,

    #[serde(default)]
    pub concat_mode: ConcatMode,

    #[serde(default)]
    pub transition: TransitionKind,

    /// Overrides the narration duration as the timeline target.
    #[serde(default)]
    pub target_duration: Option<f64>,

    /// Longest segment placed on the timeline, in seconds.
    #[serde(default = "default_max_segment_duration")]
    pub max_segment_duration: f64,

    /// Segments shorter than this are dropped before accumulation.
    #[serde(default = "default_min_segment_duration")]
    pub min_segment_duration: f64,

    /// Length of the transition ramp, in seconds.
    #[serde(default = "default_transition_duration")]
    pub transition_duration: f64,

    /// Still-image duration; the application default applies when absent.
    #[serde(default)]
    pub image_segment_duration: Option<f64>,

    /// Worker threads for segment preparation, also handed to the encoder.
    #[serde(default = "default_thread_budget")]
    pub thread_budget: usize,

    /// Seed for shuffling and transition choices; random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_narration_volume() -> f64 {
    1.0
}

fn default_max_segment_duration() -> f64 {
    5.0
}

fn default_min_segment_duration() -> f64 {
    1.5
}

fn default_transition_duration() -> f64 {
    1.0
}

fn default_thread_budget() -> usize {
    2
}

impl RenderJob {
    /// Create a job with default parameters.
    pub fn new(
        output_path: impl Into<PathBuf>,
        sources: Vec<SourceMedia>,
        narration: impl Into<PathBuf>,
    ) -> Self {
        Self {
            output_path: output_path.into(),
            sources,
            narration: NarrationTrack {
                path: narration.into(),
                duration_secs: None,
                volume: default_narration_volume(),
            },
            bgm: BgmSettings::default(),
            subtitles: SubtitleInput::default(),
            aspect: VideoAspect::default(),
            concat_mode: ConcatMode::default(),
            transition: TransitionKind::default(),
            target_duration: None,
            max_segment_duration: default_max_segment_duration(),
            min_segment_duration: default_min_segment_duration(),
            transition_duration: default_transition_duration(),
            image_segment_duration: None,
            thread_budget: default_thread_budget(),
            seed: None,
        }
    }

    /// Load a job descriptor from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ModelError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let job: RenderJob = serde_json::from_str(&json).map_err(|e| ModelError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        job.validate()?;
        Ok(job)
    }

    /// The output canvas.
    pub fn canvas(&self) -> OutputCanvas {
        self.aspect.canvas()
    }

    /// Sibling diagnostic file written when the encoder fails.
    pub fn diagnostic_path(&self) -> PathBuf {
        let mut name = self.output_path.as_os_str().to_os_string();
        name.push(".error.txt");
        PathBuf::from(name)
    }

    /// Check numeric parameters for consistency.
    pub fn validate(&self) -> Result<(), ModelError> {
        let positive = |value: f64, name: &str| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ModelError::invalid_job(format!(
                    "{name} must be positive, got {value}"
                )))
            }
        };

        if self.output_path.as_os_str().is_empty() {
            return Err(ModelError::invalid_job("output_path is empty"));
        }
        positive(self.max_segment_duration, "max_segment_duration")?;
        if !self.min_segment_duration.is_finite() || self.min_segment_duration < 0.0 {
            return Err(ModelError::invalid_job(
                "min_segment_duration must be non-negative",
            ));
        }
        if self.min_segment_duration > self.max_segment_duration {
            return Err(ModelError::invalid_job(format!(
                "min_segment_duration ({}) exceeds max_segment_duration ({})",
                self.min_segment_duration, self.max_segment_duration
            )));
        }
        if !self.transition_duration.is_finite() || self.transition_duration < 0.0 {
            return Err(ModelError::invalid_job(
                "transition_duration must be non-negative",
            ));
        }
        if let Some(target) = self.target_duration {
            positive(target, "target_duration")?;
        }
        if let Some(duration) = self.narration.duration_secs {
            positive(duration, "narration.duration_secs")?;
        }
        if let Some(duration) = self.image_segment_duration {
            positive(duration, "image_segment_duration")?;
        }
        if self.thread_budget == 0 {
            return Err(ModelError::invalid_job("thread_budget must be at least 1"));
        }
        if self.narration.volume < 0.0 || self.bgm.volume < 0.0 {
            return Err(ModelError::invalid_job("volumes must be non-negative"));
        }
        if !(0.0..=100.0).contains(&self.subtitles.style.custom_position) {
            return Err(ModelError::invalid_job(
                "subtitles.style.custom_position must be within [0, 100]",
            ));
        }
        Ok(())
    }
}

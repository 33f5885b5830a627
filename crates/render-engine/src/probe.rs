//! ffprobe-backed [`MediaProbe`].
//!
//! Runs `ffprobe -v quiet -print_format json -show_format -show_streams`
//! and maps the JSON into [`MediaInfo`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reelsmith_common::{ReelError, ReelResult};
use reelsmith_processing_core::{MediaInfo, MediaProbe};
use reelsmith_project_model::FrameSize;
use serde::Deserialize;

use crate::command::{run_tool, ProcessRegistry};

/// Default frame rate when a stream does not report one.
const FALLBACK_FRAME_RATE: f64 = 30.0;

/// A probe backed by the `ffprobe` CLI.
///
/// Each ffprobe run is a managed child of `registry`, so a job that binds
/// the probe to its scope also reaps probes still running when it ends.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    ffprobe_path: PathBuf,
    registry: Arc<ProcessRegistry>,
}

impl FfprobeProbe {
    pub fn new(ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
            registry: Arc::new(ProcessRegistry::new()),
        }
    }

    /// Register ffprobe runs with `registry` instead of a private one.
    pub fn with_registry(mut self, registry: Arc<ProcessRegistry>) -> Self {
        self.registry = registry;
        self
    }
}

impl MediaProbe for FfprobeProbe {
    fn probe(&self, path: &Path) -> ReelResult<MediaInfo> {
        if !path.exists() {
            return Err(ReelError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let mut args: Vec<String> = [
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        args.push(path.to_string_lossy().into_owned());

        let output = run_tool(&self.ffprobe_path, &args, &self.registry, None)?;
        if !output.success() {
            return Err(ReelError::probe(format!(
                "ffprobe failed on {} ({})",
                path.display(),
                output.status
            )));
        }

        parse_ffprobe_json(&output.stdout)
            .map_err(|e| ReelError::probe(format!("{}: {e}", path.display())))
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

/// Map ffprobe JSON output to [`MediaInfo`].
pub fn parse_ffprobe_json(json: &str) -> ReelResult<MediaInfo> {
    let parsed: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| ReelError::probe(format!("ffprobe JSON parse error: {e}")))?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    let duration = parsed
        .format
        .as_ref()
        .and_then(|f| parse_seconds(f.duration.as_deref()))
        .or_else(|| {
            parsed
                .streams
                .iter()
                .find_map(|s| parse_seconds(s.duration.as_deref()))
        });

    let size = video
        .map(|v| FrameSize::new(v.width.unwrap_or(0), v.height.unwrap_or(0)))
        .unwrap_or_default();

    let frame_rate = video
        .and_then(|v| {
            parse_frame_rate(v.avg_frame_rate.as_deref())
                .or_else(|| parse_frame_rate(v.r_frame_rate.as_deref()))
        })
        .unwrap_or(FALLBACK_FRAME_RATE);

    Ok(MediaInfo {
        duration,
        size,
        frame_rate,
    })
}

fn parse_seconds(raw: Option<&str>) -> Option<f64> {
    raw?.trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > 0.0)
}

/// Parse a rational like `30000/1001`, or a plain number.
fn parse_frame_rate(raw: Option<&str>) -> Option<f64> {
    let raw = raw?.trim();
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

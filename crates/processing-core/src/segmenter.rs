//! Clip segmentation.
//!
//! Splits every usable source into consecutive spans of at most
//! `max_segment_duration`. Still images become a single span. Sources that
//! cannot be probed, or that are too small, are skipped with a warning.

use std::path::Path;

use reelsmith_common::{PipelineDefaults, ReelError, ReelResult};
use reelsmith_project_model::{
    FrameSize, ModelError, RenderJob, SegmentKind, SourceMedia, SourceSegment,
};

use crate::observer::PipelineObserver;

/// Trailing slices shorter than this are floating residue, not content.
const MIN_SLICE_SECS: f64 = 1e-3;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp", "tif", "tiff"];

/// What a probe reports about one media file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    /// Stream duration; absent for still images.
    pub duration: Option<f64>,

    /// Natural frame size; zero when the probe could not tell.
    pub size: FrameSize,

    pub frame_rate: f64,
}

/// Reads media metadata without decoding frames.
pub trait MediaProbe: Send + Sync {
    fn probe(&self, path: &Path) -> ReelResult<MediaInfo>;
}

/// Segmentation parameters.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    pub max_segment_duration: f64,

    /// Duration of a still image before clamping to `max_segment_duration`.
    pub image_segment_duration: f64,

    /// Smallest accepted `min(width, height)`; 0 disables the check.
    pub min_source_dimension: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_segment_duration: 5.0,
            image_segment_duration: 4.0,
            min_source_dimension: 480,
        }
    }
}

impl SegmenterConfig {
    pub fn from_job(job: &RenderJob, defaults: &PipelineDefaults) -> Self {
        Self {
            max_segment_duration: job.max_segment_duration,
            image_segment_duration: job
                .image_segment_duration
                .unwrap_or(defaults.image_segment_duration),
            min_source_dimension: defaults.min_source_dimension,
        }
    }
}

/// Whether `path` names a still image, judged by extension.
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Segment every source, in source order.
///
/// Fails with [`ReelError::NoUsableMedia`] only when nothing at all survives.
pub fn segment_sources(
    sources: &[SourceMedia],
    probe: &dyn MediaProbe,
    config: &SegmenterConfig,
    observer: &dyn PipelineObserver,
) -> ReelResult<Vec<SourceSegment>> {
    let mut segments = Vec::new();

    for source in sources {
        match segment_source(&source.path, probe, config) {
            Ok(mut produced) => {
                tracing::debug!(
                    path = %source.path.display(),
                    segments = produced.len(),
                    "Segmented source"
                );
                segments.append(&mut produced);
            }
            Err(e) => {
                tracing::warn!(path = %source.path.display(), error = %e, "Skipping source");
                observer.on_warning(&e);
            }
        }
    }

    if segments.is_empty() {
        return Err(ReelError::NoUsableMedia {
            sources: sources.len(),
        });
    }

    tracing::info!(
        sources = sources.len(),
        segments = segments.len(),
        "Segmentation complete"
    );
    Ok(segments)
}

fn segment_source(
    path: &Path,
    probe: &dyn MediaProbe,
    config: &SegmenterConfig,
) -> ReelResult<Vec<SourceSegment>> {
    let info = probe.probe(path)?;

    if config.min_source_dimension > 0
        && info.size.is_known()
        && info.size.min_dimension() < config.min_source_dimension
    {
        return Err(ReelError::probe(format!(
            "{} is {}x{}, below the {}px minimum",
            path.display(),
            info.size.width,
            info.size.height,
            config.min_source_dimension
        )));
    }

    let invalid = |e: ModelError| ReelError::probe(format!("{}: {e}", path.display()));

    if is_image_path(path) {
        let duration = config
            .image_segment_duration
            .min(config.max_segment_duration);
        let segment = SourceSegment::new(
            path,
            0.0,
            duration,
            info.size,
            info.frame_rate,
            SegmentKind::Image,
        )
        .map_err(invalid)?;
        return Ok(vec![segment]);
    }

    let duration = info
        .duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| ReelError::probe(format!("{} has no usable duration", path.display())))?;

    slice_span(duration, config.max_segment_duration)
        .into_iter()
        .map(|(start, end)| {
            SourceSegment::new(
                path,
                start,
                end,
                info.size,
                info.frame_rate,
                SegmentKind::Video,
            )
            .map_err(invalid)
        })
        .collect()
}

/// Consecutive `[start, end)` spans covering `[0, duration)`.
fn slice_span(duration: f64, max_len: f64) -> Vec<(f64, f64)> {
    let mut spans = Vec::new();
    let mut index = 0u32;
    loop {
        // Multiply instead of accumulating to keep boundaries exact.
        let start = f64::from(index) * max_len;
        if duration - start < MIN_SLICE_SECS {
            break;
        }
        spans.push((start, (start + max_len).min(duration)));
        index += 1;
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::RecordingObserver;
    use crate::testing::TableProbe;

    fn sources(paths: &[&str]) -> Vec<SourceMedia> {
        paths.iter().map(|p| SourceMedia::new(*p)).collect()
    }

    #[test]
    fn test_video_sliced_with_short_tail() {
        let probe = TableProbe::default().with("a.mp4", Some(12.0), 1920, 1080);
        let observer = RecordingObserver::new();
        let segments = segment_sources(
            &sources(&["a.mp4"]),
            &probe,
            &SegmenterConfig::default(),
            &observer,
        )
        .unwrap();

        let spans: Vec<(f64, f64)> = segments
            .iter()
            .map(|s| (s.start_offset(), s.end_offset()))
            .collect();
        assert_eq!(spans, vec![(0.0, 5.0), (5.0, 10.0), (10.0, 12.0)]);
        assert!(segments.iter().all(|s| s.kind() == SegmentKind::Video));
    }

    #[test]
    fn test_exact_multiple_has_no_residue() {
        assert_eq!(slice_span(10.0, 5.0), vec![(0.0, 5.0), (5.0, 10.0)]);
        assert_eq!(slice_span(10.0004, 5.0).len(), 2);
    }

    #[test]
    fn test_image_is_single_clamped_segment() {
        let probe = TableProbe::default().with("still.PNG", None, 2000, 2000);
        let config = SegmenterConfig {
            max_segment_duration: 3.0,
            ..SegmenterConfig::default()
        };
        let segments =
            segment_sources(&sources(&["still.PNG"]), &probe, &config, &RecordingObserver::new())
                .unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].kind(), SegmentKind::Image);
        assert_eq!(segments[0].duration(), 3.0);
    }

    #[test]
    fn test_unreadable_and_small_sources_skipped() {
        let probe = TableProbe::default()
            .with("good.mp4", Some(4.0), 1280, 720)
            .with("tiny.mp4", Some(8.0), 320, 240);
        let observer = RecordingObserver::new();
        let segments = segment_sources(
            &sources(&["missing.mp4", "tiny.mp4", "good.mp4"]),
            &probe,
            &SegmenterConfig::default(),
            &observer,
        )
        .unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].source_path(), Path::new("good.mp4"));
        assert_eq!(observer.warnings().len(), 2);
    }

    #[test]
    fn test_no_usable_media() {
        let probe = TableProbe::default().with("silent.mp4", None, 1920, 1080);
        let err = segment_sources(
            &sources(&["silent.mp4", "missing.mov"]),
            &probe,
            &SegmenterConfig::default(),
            &RecordingObserver::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ReelError::NoUsableMedia { sources: 2 }));
    }

    #[test]
    fn test_image_extension_detection() {
        assert!(is_image_path(Path::new("/a/b/photo.JPG")));
        assert!(!is_image_path(Path::new("/a/b/clip.mp4")));
        assert!(!is_image_path(Path::new("noext")));
    }
}

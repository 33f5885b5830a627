//! Source segments and the timeline they are placed on.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clip::FrameSize;
use crate::error::ModelError;
use crate::job::TransitionKind;

/// Whether a segment comes from a video stream or a still image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Video,
    Image,
}

/// A contiguous span of one source file.
///
/// Immutable once created: fields are private and the constructor enforces
/// `end_offset > start_offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSegment {
    source_path: PathBuf,
    start_offset: f64,
    end_offset: f64,
    natural_size: FrameSize,
    frame_rate: f64,
    kind: SegmentKind,
}

impl SourceSegment {
    pub fn new(
        source_path: impl Into<PathBuf>,
        start_offset: f64,
        end_offset: f64,
        natural_size: FrameSize,
        frame_rate: f64,
        kind: SegmentKind,
    ) -> Result<Self, ModelError> {
        let source_path = source_path.into();
        if !start_offset.is_finite()
            || !end_offset.is_finite()
            || start_offset < 0.0
            || end_offset <= start_offset
        {
            return Err(ModelError::InvalidSpan {
                path: source_path,
                start: start_offset,
                end: end_offset,
            });
        }
        Ok(Self {
            source_path,
            start_offset,
            end_offset,
            natural_size,
            frame_rate,
            kind,
        })
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn start_offset(&self) -> f64 {
        self.start_offset
    }

    pub fn end_offset(&self) -> f64 {
        self.end_offset
    }

    pub fn natural_size(&self) -> FrameSize {
        self.natural_size
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    /// Natural (untrimmed) duration in seconds.
    pub fn duration(&self) -> f64 {
        self.end_offset - self.start_offset
    }
}

/// Top-left of a segment's picture on the canvas, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CanvasPosition {
    pub x: i32,
    pub y: i32,
}

/// A segment placed on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedSegment {
    pub segment: Arc<SourceSegment>,

    /// Seconds of the segment actually used, starting at its start offset.
    pub trimmed_duration: f64,

    pub canvas_position: CanvasPosition,

    pub transition: TransitionKind,

    /// Timeline time at which this segment starts playing.
    pub cumulative_start_time: f64,
}

impl PlacedSegment {
    /// Timeline time at which this segment stops playing.
    pub fn end_time(&self) -> f64 {
        self.cumulative_start_time + self.trimmed_duration
    }
}

/// Ordered, contiguous sequence of placed segments.
///
/// Placements can only be appended through [`Timeline::push`], which starts
/// each one where the previous ended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    placements: Vec<PlacedSegment>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a segment at the current end of the timeline.
    pub fn push(
        &mut self,
        segment: Arc<SourceSegment>,
        trimmed_duration: f64,
        transition: TransitionKind,
    ) -> &PlacedSegment {
        let cumulative_start_time = self.total_duration();
        self.placements.push(PlacedSegment {
            segment,
            trimmed_duration,
            canvas_position: CanvasPosition::default(),
            transition,
            cumulative_start_time,
        });
        &self.placements[self.placements.len() - 1]
    }

    /// Record where the normalized picture of placement `index` sits on the canvas.
    pub fn set_canvas_position(&mut self, index: usize, position: CanvasPosition) {
        if let Some(placed) = self.placements.get_mut(index) {
            placed.canvas_position = position;
        }
    }

    /// Sum of trimmed durations.
    pub fn total_duration(&self) -> f64 {
        self.placements
            .last()
            .map(PlacedSegment::end_time)
            .unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn placements(&self) -> &[PlacedSegment] {
        &self.placements
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlacedSegment> {
        self.placements.iter()
    }

    pub fn last(&self) -> Option<&PlacedSegment> {
        self.placements.last()
    }
}

impl<'a> IntoIterator for &'a Timeline {
    type Item = &'a PlacedSegment;
    type IntoIter = std::slice::Iter<'a, PlacedSegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.placements.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: f64, end: f64) -> Arc<SourceSegment> {
        Arc::new(
            SourceSegment::new(
                "a.mp4",
                start,
                end,
                FrameSize::new(1920, 1080),
                30.0,
                SegmentKind::Video,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_segment_rejects_empty_span() {
        let err = SourceSegment::new(
            "a.mp4",
            2.0,
            2.0,
            FrameSize::new(1920, 1080),
            30.0,
            SegmentKind::Video,
        );
        assert!(matches!(err, Err(ModelError::InvalidSpan { .. })));
    }

    #[test]
    fn test_segment_duration() {
        assert!((segment(5.0, 7.5).duration() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_timeline_push_is_contiguous() {
        let mut timeline = Timeline::new();
        timeline.push(segment(0.0, 5.0), 5.0, TransitionKind::None);
        timeline.push(segment(5.0, 10.0), 4.0, TransitionKind::FadeIn);
        timeline.push(segment(0.0, 5.0), 1.5, TransitionKind::None);

        let starts: Vec<f64> = timeline.iter().map(|p| p.cumulative_start_time).collect();
        assert_eq!(starts, vec![0.0, 5.0, 9.0]);
        assert!((timeline.total_duration() - 10.5).abs() < 1e-12);

        for pair in timeline.placements().windows(2) {
            assert_eq!(pair[0].end_time(), pair[1].cumulative_start_time);
        }
    }

    #[test]
    fn test_set_canvas_position() {
        let mut timeline = Timeline::new();
        timeline.push(segment(0.0, 5.0), 5.0, TransitionKind::None);
        timeline.set_canvas_position(0, CanvasPosition { x: 0, y: 656 });
        assert_eq!(timeline.placements()[0].canvas_position.y, 656);
        // out of range is ignored
        timeline.set_canvas_position(9, CanvasPosition { x: 1, y: 1 });
    }
}

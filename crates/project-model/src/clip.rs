//! Clip descriptions: a placed segment plus the frame operations applied to it.
//!
//! A [`Clip`] is a lazy description. Nothing is decoded here; the render
//! engine translates the operation list into an encoder filter chain.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::job::OutputCanvas;
use crate::segment::{PlacedSegment, SourceSegment};

/// Frame dimensions in pixels. Zero means "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both dimensions were reported by the probe.
    pub fn is_known(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Width divided by height, when known.
    pub fn aspect_ratio(&self) -> Option<f64> {
        self.is_known()
            .then(|| self.width as f64 / self.height as f64)
    }

    /// The smaller of the two dimensions.
    pub fn min_dimension(&self) -> u32 {
        self.width.min(self.height)
    }
}

impl From<OutputCanvas> for FrameSize {
    fn from(canvas: OutputCanvas) -> Self {
        Self::new(canvas.width, canvas.height)
    }
}

/// Canvas edge a slide enters from or exits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Left,
    Right,
    Top,
    Bottom,
}

impl Edge {
    pub const ALL: [Edge; 4] = [Edge::Left, Edge::Right, Edge::Top, Edge::Bottom];
}

/// Whether a ramp plays at the head or the tail of a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RampDirection {
    In,
    Out,
}

/// One frame operation, applied in list order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClipOp {
    /// Slow zoom toward the center; scale grows from 1 to `1 + rate` over the clip.
    ZoomIn { rate: f64 },

    /// Resize to exactly `size`, uniform or not.
    Scale { size: FrameSize },

    /// Fit inside `canvas` keeping aspect, centered on opaque black.
    ///
    /// `content` is the scaled picture size when the natural size is known.
    Letterbox {
        canvas: FrameSize,
        content: Option<FrameSize>,
    },

    /// Opacity ramp over the first (`In`) or last (`Out`) `duration` seconds.
    Fade {
        direction: RampDirection,
        duration: f64,
    },

    /// Position ramp from (`In`) or to (`Out`) an off-canvas edge.
    Slide {
        direction: RampDirection,
        edge: Edge,
        duration: f64,
    },
}

/// A timeline placement ready to be realized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    /// Position on the timeline.
    pub index: usize,

    pub source: Arc<SourceSegment>,

    /// Offset into the source file where playback starts.
    pub start: f64,

    /// Playback length; never changed by frame operations.
    pub duration: f64,

    /// Frame size after the operations so far.
    pub size: FrameSize,

    pub ops: Vec<ClipOp>,
}

impl Clip {
    /// Start a clip at the natural size of a placed segment.
    pub fn from_placed(index: usize, placed: &PlacedSegment) -> Self {
        Self {
            index,
            source: Arc::clone(&placed.segment),
            start: placed.segment.start_offset(),
            duration: placed.trimmed_duration,
            size: placed.segment.natural_size(),
            ops: Vec::new(),
        }
    }

    /// Append an operation, tracking the resulting frame size.
    pub fn with_op(mut self, op: ClipOp) -> Self {
        match &op {
            ClipOp::Scale { size } => self.size = *size,
            ClipOp::Letterbox { canvas, .. } => self.size = *canvas,
            ClipOp::ZoomIn { .. } | ClipOp::Fade { .. } | ClipOp::Slide { .. } => {}
        }
        self.ops.push(op);
        self
    }

    /// Whether any transition ramp has been applied.
    pub fn has_transition(&self) -> bool {
        self.ops
            .iter()
            .any(|op| matches!(op, ClipOp::Fade { .. } | ClipOp::Slide { .. }))
    }
}

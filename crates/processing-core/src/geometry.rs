//! Geometry normalization.
//!
//! Brings every clip to exactly the canvas size. Matching aspects scale
//! uniformly; anything else goes through the [`Resizer`] first and falls back
//! to a centered letterbox when the resizer refuses.

use reelsmith_common::{ReelError, ReelResult};
use reelsmith_project_model::{CanvasPosition, Clip, ClipOp, FrameSize};
use serde::{Deserialize, Serialize};

/// Aspect ratios closer than this are treated as equal.
pub const ASPECT_TOLERANCE: f64 = 1e-3;

/// How a clip was brought to the canvas size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryPolicy {
    /// Natural size already equals the canvas.
    Passthrough,
    /// Same aspect, resized proportionally.
    UniformScale,
    /// Resized to the canvas, distorting the aspect.
    Stretch,
    /// Fitted inside the canvas and centered on black.
    Letterbox,
}

/// Primary resize strategy for clips whose aspect differs from the canvas.
pub trait Resizer: Send + Sync {
    /// Resize `clip` to exactly `canvas`, or refuse.
    fn stretch(&self, clip: &Clip, canvas: FrameSize) -> ReelResult<Clip>;
}

/// Stretches to the canvas whenever the natural size is known.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultResizer;

impl Resizer for DefaultResizer {
    fn stretch(&self, clip: &Clip, canvas: FrameSize) -> ReelResult<Clip> {
        if !clip.size.is_known() {
            return Err(ReelError::segment(
                clip.index,
                "natural size unknown, cannot stretch",
            ));
        }
        Ok(clip.clone().with_op(ClipOp::Scale { size: canvas }))
    }
}

/// A clip at canvas size, with the policy that got it there.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub clip: Clip,
    pub policy: GeometryPolicy,

    /// Top-left of the picture content on the canvas.
    pub position: CanvasPosition,
}

/// Bring `clip` to exactly `canvas`.
pub fn normalize(clip: Clip, canvas: FrameSize, resizer: &dyn Resizer) -> Normalized {
    let natural = clip.size;

    if natural == canvas {
        return Normalized {
            clip,
            policy: GeometryPolicy::Passthrough,
            position: CanvasPosition::default(),
        };
    }

    if let (Some(source), Some(target)) = (natural.aspect_ratio(), canvas.aspect_ratio()) {
        if (source - target).abs() < ASPECT_TOLERANCE {
            return Normalized {
                clip: clip.with_op(ClipOp::Scale { size: canvas }),
                policy: GeometryPolicy::UniformScale,
                position: CanvasPosition::default(),
            };
        }
    }

    match resizer.stretch(&clip, canvas) {
        Ok(stretched) if stretched.size == canvas => Normalized {
            clip: stretched,
            policy: GeometryPolicy::Stretch,
            position: CanvasPosition::default(),
        },
        Ok(stretched) => {
            tracing::debug!(
                index = clip.index,
                width = stretched.size.width,
                height = stretched.size.height,
                "Resizer missed the canvas, letterboxing"
            );
            letterbox(clip, canvas)
        }
        Err(e) => {
            tracing::debug!(index = clip.index, reason = %e, "Stretch refused, letterboxing");
            letterbox(clip, canvas)
        }
    }
}

/// Fit inside `canvas` keeping aspect, centered on black.
pub fn letterbox(clip: Clip, canvas: FrameSize) -> Normalized {
    let content = fit_within(clip.size, canvas);
    let position = content
        .map(|c| CanvasPosition {
            x: ((canvas.width - c.width) / 2) as i32,
            y: ((canvas.height - c.height) / 2) as i32,
        })
        .unwrap_or_default();

    Normalized {
        clip: clip.with_op(ClipOp::Letterbox { canvas, content }),
        policy: GeometryPolicy::Letterbox,
        position,
    }
}

/// Largest proportional size of `natural` that fits `canvas`, in even pixels.
///
/// `None` when the natural size is unknown.
pub fn fit_within(natural: FrameSize, canvas: FrameSize) -> Option<FrameSize> {
    if !natural.is_known() {
        return None;
    }
    let scale = (canvas.width as f64 / natural.width as f64)
        .min(canvas.height as f64 / natural.height as f64);
    let even = |value: f64, limit: u32| ((value.round() as u32) & !1).clamp(2, limit);
    Some(FrameSize::new(
        even(natural.width as f64 * scale, canvas.width),
        even(natural.height as f64 * scale, canvas.height),
    ))
}

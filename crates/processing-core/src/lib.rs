//! Reelsmith processing core: timeline assembly.
//!
//! Turns a pool of source media into a prepared, canvas-sized clip list:
//! - **Segmenter:** Split sources into bounded-duration segments
//! - **Accumulator:** Select, order, and trim segments to the target duration
//! - **Geometry:** Normalize every clip to the output canvas
//! - **Transitions:** Attach fade/slide ramps
//! - **Prepare:** Run geometry and transitions in parallel, deterministically
//!
//! This crate does no media I/O. Probing goes through [`MediaProbe`]; the
//! output is a list of clip descriptions for the render engine.

pub mod accumulator;
pub mod geometry;
pub mod observer;
pub mod prepare;
pub mod segmenter;
pub mod transitions;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use accumulator::{accumulate, AccumulatorConfig};
pub use geometry::{normalize, DefaultResizer, GeometryPolicy, Normalized, Resizer};
pub use observer::{JobStage, PipelineObserver, RecordingObserver, TracingObserver};
pub use prepare::{prepare_clips, PrepareConfig, PreparedClip, PreparedSummary};
pub use segmenter::{segment_sources, MediaInfo, MediaProbe, SegmenterConfig};
pub use transitions::apply_transition;

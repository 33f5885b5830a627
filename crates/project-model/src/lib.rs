//! Reelsmith Project Model
//!
//! Defines the core data contracts for the media assembly pipeline:
//! - **Job:** The render job descriptor (canvas, modes, durations, inputs)
//! - **Segment:** Bounded spans of source media and the timeline they form
//! - **Clip:** A placed segment plus the frame operations that realize it
//! - **Cue:** Timed subtitle text
//!
//! Times are seconds as `f64`; frame sizes are pixels.

pub mod clip;
pub mod cue;
pub mod error;
pub mod job;
pub mod segment;

pub use clip::*;
pub use cue::*;
pub use error::*;
pub use job::*;
pub use segment::*;

//! Reelsmith Render Engine
//!
//! Drives ffmpeg to turn a prepared clip list into the finished video.
//!
//! # Pipeline Architecture
//!
//! ```text
//! clips ──► render (parallel, per batch) ──► concat batch ──► merge into assembled.mp4
//!                                                                   │
//! narration.mp3 ─────────────┐                                      │
//! bgm/*.mp3 (looped, faded) ─┼── amix ──────────────┐               │
//!                            │                      ├── Encode (H.264/AAC)
//! cues / subtitles.srt ──────┴── drawtext overlays ─┘               │
//!                                                                   ▼
//!                                                               output.mp4
//! ```
//!
//! Every intermediate lives in a [`JobScope`] work directory that is removed,
//! together with any still-running child process, when the job ends.

pub mod audio;
pub mod backend;
pub mod command;
pub mod compositor;
pub mod encoder;
pub mod filters;
pub mod pipeline;
pub mod probe;
pub mod resources;
pub mod scope;
pub mod subtitles;
pub mod text;

#[cfg(test)]
mod testing;

pub use backend::{FfmpegBackend, MediaBackend};
pub use command::find_tool;
pub use compositor::{compose, Composite, CompositorConfig};
pub use encoder::{run_final_encode, EncodeFailure, EncodePlan};
pub use pipeline::{render_job, JobPlan, JobStateMachine, Pipeline};
pub use probe::FfprobeProbe;
pub use resources::{EncoderLimiter, EncoderPermit, ResourceBudget};
pub use scope::JobScope;

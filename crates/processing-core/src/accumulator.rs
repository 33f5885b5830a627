//! Duration matching.
//!
//! Places segments on a [`Timeline`] until it reaches the target duration.
//! The boundary segment is trimmed to close the gap exactly, so the total
//! never overshoots the target beyond floating tolerance.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use reelsmith_common::{PipelineDefaults, ReelError, ReelResult};
use reelsmith_project_model::{ConcatMode, RenderJob, SourceSegment, Timeline, TransitionKind};

/// Remaining durations below this count as "target reached".
pub const DURATION_EPSILON: f64 = 1e-6;

/// Accumulation parameters.
#[derive(Debug, Clone)]
pub struct AccumulatorConfig {
    pub concat_mode: ConcatMode,

    /// Transition recorded on every placement; `Shuffle` is resolved later.
    pub transition: TransitionKind,

    /// Segments shorter than this never enter the pool.
    pub min_segment_duration: f64,

    pub max_segment_duration: f64,

    /// Safety cap on passes over the pool.
    pub max_iterations: usize,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            concat_mode: ConcatMode::Random,
            transition: TransitionKind::None,
            min_segment_duration: 1.5,
            max_segment_duration: 5.0,
            max_iterations: 1000,
        }
    }
}

impl AccumulatorConfig {
    pub fn from_job(job: &RenderJob, defaults: &PipelineDefaults) -> Self {
        Self {
            concat_mode: job.concat_mode,
            transition: job.transition,
            min_segment_duration: job.min_segment_duration,
            max_segment_duration: job.max_segment_duration,
            max_iterations: defaults.max_iterations,
        }
    }
}

/// Build a timeline of exactly `target` seconds from `pool`.
pub fn accumulate<R: Rng + ?Sized>(
    pool: Vec<SourceSegment>,
    target: f64,
    config: &AccumulatorConfig,
    rng: &mut R,
) -> ReelResult<Timeline> {
    if !target.is_finite() || target <= 0.0 {
        return Err(ReelError::invalid_job(format!(
            "target duration must be positive, got {target}"
        )));
    }

    let offered = pool.len();
    let mut pool: Vec<Arc<SourceSegment>> = pool
        .into_iter()
        .filter(|segment| segment.duration() >= config.min_segment_duration)
        .map(Arc::new)
        .collect();

    if pool.is_empty() {
        return Err(ReelError::InsufficientMaterial {
            min_secs: config.min_segment_duration,
        });
    }

    if config.concat_mode == ConcatMode::Random {
        pool.shuffle(rng);
    }

    let max_iterations = config.max_iterations.max(1);
    debug_assert!(!pool.is_empty() && max_iterations > 0);

    let mut timeline = Timeline::new();
    let mut passes = 0usize;

    'passes: while passes < max_iterations {
        passes += 1;
        let mut appended = false;

        for segment in &pool {
            let remaining = target - timeline.total_duration();
            if remaining < DURATION_EPSILON {
                break 'passes;
            }

            let trimmed = segment
                .duration()
                .min(config.max_segment_duration)
                .min(remaining);
            if trimmed <= 0.0 {
                continue;
            }

            timeline.push(Arc::clone(segment), trimmed, config.transition);
            appended = true;
        }

        if !appended {
            tracing::debug!(passes, "Segment pool exhausted");
            break;
        }
    }

    if timeline.is_empty() {
        return Err(ReelError::empty_timeline(
            "no segment could be placed on the timeline",
        ));
    }

    if timeline.total_duration() + DURATION_EPSILON < target {
        tracing::warn!(
            target,
            reached = timeline.total_duration(),
            passes,
            "Iteration cap reached before the target duration"
        );
    }

    tracing::info!(
        offered,
        usable = pool.len(),
        placed = timeline.len(),
        duration = timeline.total_duration(),
        "Timeline accumulated"
    );
    Ok(timeline)
}

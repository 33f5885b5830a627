//! Per-segment preparation: image zoom, geometry, then transition.
//!
//! Runs in parallel on a rayon pool bounded by the job's thread budget. Each
//! placement gets its own RNG seeded from the job RNG before any work starts,
//! so the result is independent of scheduling.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use reelsmith_common::{ReelError, ReelResult};
use reelsmith_project_model::{
    CanvasPosition, Clip, ClipOp, FrameSize, RenderJob, SegmentKind, Timeline, TransitionKind,
};
use serde::Serialize;

use crate::geometry::{normalize, GeometryPolicy, Resizer};
use crate::transitions::apply_transition;

/// Zoom gained per second of still-image screen time.
pub const IMAGE_ZOOM_RATE_PER_SEC: f64 = 0.03;

/// Preparation parameters shared read-only by all workers.
#[derive(Debug, Clone)]
pub struct PrepareConfig {
    pub canvas: FrameSize,
    pub transition_duration: f64,
    pub threads: usize,
}

impl PrepareConfig {
    pub fn from_job(job: &RenderJob) -> Self {
        Self {
            canvas: job.canvas().into(),
            transition_duration: job.transition_duration,
            threads: job.thread_budget,
        }
    }
}

/// A clip ready for the compositor.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedClip {
    pub clip: Clip,
    pub policy: GeometryPolicy,
    pub position: CanvasPosition,

    /// The transition actually applied, with `Shuffle` resolved.
    pub transition: TransitionKind,
}

/// Compact description of a prepared clip, for dry-run output.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedSummary {
    pub index: usize,
    pub source: String,
    pub start: f64,
    pub duration: f64,
    pub policy: GeometryPolicy,
    pub transition: TransitionKind,
}

impl PreparedClip {
    pub fn summary(&self) -> PreparedSummary {
        PreparedSummary {
            index: self.clip.index,
            source: self.clip.source.source_path().display().to_string(),
            start: self.clip.start,
            duration: self.clip.duration,
            policy: self.policy,
            transition: self.transition,
        }
    }
}

/// Prepare every placement of `timeline`, in timeline order.
///
/// Canvas positions are written back onto the timeline.
pub fn prepare_clips(
    timeline: &mut Timeline,
    config: &PrepareConfig,
    resizer: &dyn Resizer,
    rng: &mut StdRng,
) -> ReelResult<Vec<PreparedClip>> {
    let seeds: Vec<u64> = (0..timeline.len()).map(|_| rng.gen()).collect();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads.max(1))
        .thread_name(|i| format!("reelsmith-prepare-{i}"))
        .build()
        .map_err(|e| ReelError::Other(anyhow::anyhow!("failed to build worker pool: {e}")))?;

    let prepared: Vec<PreparedClip> = pool.install(|| {
        timeline
            .placements()
            .par_iter()
            .zip(seeds.par_iter())
            .enumerate()
            .map(|(index, (placed, &seed))| {
                let mut segment_rng = StdRng::seed_from_u64(seed);
                prepare_one(
                    Clip::from_placed(index, placed),
                    placed.transition,
                    config,
                    resizer,
                    &mut segment_rng,
                )
            })
            .collect()
    });

    for prepared_clip in &prepared {
        timeline.set_canvas_position(prepared_clip.clip.index, prepared_clip.position);
    }

    tracing::info!(
        clips = prepared.len(),
        letterboxed = prepared
            .iter()
            .filter(|p| p.policy == GeometryPolicy::Letterbox)
            .count(),
        threads = config.threads,
        "Clips prepared"
    );
    Ok(prepared)
}

fn prepare_one(
    clip: Clip,
    transition: TransitionKind,
    config: &PrepareConfig,
    resizer: &dyn Resizer,
    rng: &mut StdRng,
) -> PreparedClip {
    let clip = if clip.source.kind() == SegmentKind::Image {
        let rate = IMAGE_ZOOM_RATE_PER_SEC * clip.duration;
        clip.with_op(ClipOp::ZoomIn { rate })
    } else {
        clip
    };

    let normalized = normalize(clip, config.canvas, resizer);
    let (clip, applied) =
        apply_transition(normalized.clip, transition, config.transition_duration, rng);

    PreparedClip {
        clip,
        policy: normalized.policy,
        position: normalized.position,
        transition: applied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::DefaultResizer;
    use reelsmith_project_model::SourceSegment;
    use std::sync::Arc;

    fn timeline(transition: TransitionKind) -> Timeline {
        let mut timeline = Timeline::new();
        let sizes = [(1920, 1080), (1080, 1920), (640, 640), (0, 0), (4000, 3000)];
        for (i, (w, h)) in sizes.into_iter().enumerate() {
            let kind = if i == 2 {
                SegmentKind::Image
            } else {
                SegmentKind::Video
            };
            let segment = SourceSegment::new(
                format!("{i}.mp4"),
                0.0,
                4.0,
                FrameSize::new(w, h),
                30.0,
                kind,
            )
            .unwrap();
            timeline.push(Arc::new(segment), 4.0, transition);
        }
        timeline
    }

    fn config(threads: usize) -> PrepareConfig {
        PrepareConfig {
            canvas: FrameSize::new(1080, 1920),
            transition_duration: 1.0,
            threads,
        }
    }

    #[test]
    fn test_every_clip_reaches_canvas_in_order() {
        let mut timeline = timeline(TransitionKind::FadeOut);
        let mut rng = StdRng::seed_from_u64(5);
        let prepared = prepare_clips(&mut timeline, &config(3), &DefaultResizer, &mut rng).unwrap();

        assert_eq!(prepared.len(), 5);
        for (i, p) in prepared.iter().enumerate() {
            assert_eq!(p.clip.index, i);
            assert_eq!(p.clip.size, FrameSize::new(1080, 1920));
            assert_eq!(p.clip.duration, 4.0);
            assert_eq!(p.transition, TransitionKind::FadeOut);
        }
        assert_eq!(prepared[1].policy, GeometryPolicy::Passthrough);
        assert_eq!(prepared[3].policy, GeometryPolicy::Letterbox);
    }

    #[test]
    fn test_images_zoom_before_geometry() {
        let mut timeline = timeline(TransitionKind::None);
        let mut rng = StdRng::seed_from_u64(5);
        let prepared = prepare_clips(&mut timeline, &config(1), &DefaultResizer, &mut rng).unwrap();

        let ops = &prepared[2].clip.ops;
        assert!(matches!(ops.first(), Some(ClipOp::ZoomIn { rate }) if (*rate - 0.12).abs() < 1e-9));
        assert!(!prepared[0].clip.ops.iter().any(|op| matches!(op, ClipOp::ZoomIn { .. })));
    }

    #[test]
    fn test_result_independent_of_thread_count() {
        let run = |threads| {
            let mut timeline = timeline(TransitionKind::Shuffle);
            let mut rng = StdRng::seed_from_u64(99);
            prepare_clips(&mut timeline, &config(threads), &DefaultResizer, &mut rng).unwrap()
        };
        assert_eq!(run(1), run(4));
    }
}

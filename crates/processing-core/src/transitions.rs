//! Visual transitions.
//!
//! Every kind is a pure `(clip, duration, rng) -> clip` function; a single
//! `match` dispatches on [`TransitionKind`]. Transitions only add frame
//! operations and never change a clip's duration.

use rand::seq::SliceRandom;
use rand::Rng;
use reelsmith_project_model::{Clip, ClipOp, Edge, RampDirection, TransitionKind};

/// Apply `kind` to `clip`, returning the clip and the concrete kind applied.
///
/// Clips shorter than `duration` pass through untouched and report `None`.
pub fn apply_transition<R: Rng + ?Sized>(
    clip: Clip,
    kind: TransitionKind,
    duration: f64,
    rng: &mut R,
) -> (Clip, TransitionKind) {
    if kind == TransitionKind::None || duration <= 0.0 || clip.duration < duration {
        return (clip, TransitionKind::None);
    }

    match kind {
        TransitionKind::None => (clip, TransitionKind::None),
        TransitionKind::FadeIn => (fade(clip, RampDirection::In, duration), kind),
        TransitionKind::FadeOut => (fade(clip, RampDirection::Out, duration), kind),
        TransitionKind::SlideIn => (slide(clip, RampDirection::In, duration, rng), kind),
        TransitionKind::SlideOut => (slide(clip, RampDirection::Out, duration, rng), kind),
        TransitionKind::Shuffle => {
            let picked = resolve_shuffle(rng);
            apply_transition(clip, picked, duration, rng)
        }
    }
}

/// One of the four concrete kinds, uniformly.
pub fn resolve_shuffle<R: Rng + ?Sized>(rng: &mut R) -> TransitionKind {
    *TransitionKind::CONCRETE
        .choose(rng)
        .unwrap_or(&TransitionKind::FadeIn)
}

fn fade(clip: Clip, direction: RampDirection, duration: f64) -> Clip {
    clip.with_op(ClipOp::Fade {
        direction,
        duration,
    })
}

fn slide<R: Rng + ?Sized>(clip: Clip, direction: RampDirection, duration: f64, rng: &mut R) -> Clip {
    let edge = *Edge::ALL.choose(rng).unwrap_or(&Edge::Left);
    clip.with_op(ClipOp::Slide {
        direction,
        edge,
        duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use reelsmith_project_model::{
        FrameSize, SegmentKind, SourceSegment, Timeline,
    };
    use std::collections::HashSet;
    use std::sync::Arc;

    fn clip(duration: f64) -> Clip {
        let segment = SourceSegment::new(
            "a.mp4",
            0.0,
            5.0,
            FrameSize::new(1080, 1920),
            30.0,
            SegmentKind::Video,
        )
        .unwrap();
        let mut timeline = Timeline::new();
        timeline.push(Arc::new(segment), duration, TransitionKind::None);
        Clip::from_placed(0, &timeline.placements()[0])
    }

    #[test]
    fn test_fade_in_adds_ramp() {
        let mut rng = StdRng::seed_from_u64(7);
        let (clip, applied) = apply_transition(clip(3.0), TransitionKind::FadeIn, 1.0, &mut rng);
        assert_eq!(applied, TransitionKind::FadeIn);
        assert_eq!(
            clip.ops,
            vec![ClipOp::Fade {
                direction: RampDirection::In,
                duration: 1.0
            }]
        );
        assert_eq!(clip.duration, 3.0);
    }

    #[test]
    fn test_short_clip_bypasses() {
        let mut rng = StdRng::seed_from_u64(7);
        let (clip, applied) = apply_transition(clip(0.5), TransitionKind::SlideOut, 1.0, &mut rng);
        assert_eq!(applied, TransitionKind::None);
        assert!(clip.ops.is_empty());
    }

    #[test]
    fn test_slide_picks_an_edge() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut edges = HashSet::new();
        for _ in 0..64 {
            let (clip, _) = apply_transition(clip(2.0), TransitionKind::SlideIn, 1.0, &mut rng);
            match clip.ops.as_slice() {
                [ClipOp::Slide {
                    direction: RampDirection::In,
                    edge,
                    ..
                }] => {
                    edges.insert(*edge);
                }
                other => panic!("unexpected ops {other:?}"),
            }
        }
        assert_eq!(edges.len(), 4);
    }

    #[test]
    fn test_shuffle_resolves_to_concrete_kinds() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen = HashSet::new();
        for _ in 0..64 {
            let (clip, applied) =
                apply_transition(clip(2.0), TransitionKind::Shuffle, 1.0, &mut rng);
            assert!(TransitionKind::CONCRETE.contains(&applied));
            assert!(clip.has_transition());
            assert_eq!(clip.duration, 2.0);
            seen.insert(applied);
        }
        assert_eq!(seen.len(), 4);
    }
}

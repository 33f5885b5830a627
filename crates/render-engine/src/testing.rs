//! In-memory stand-ins for ffmpeg used by unit tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use reelsmith_common::{ReelError, ReelResult};
use reelsmith_processing_core::PipelineObserver;
use reelsmith_project_model::{
    Clip, FrameSize, SegmentKind, SourceSegment, Timeline, TransitionKind,
};

use crate::backend::MediaBackend;
use crate::encoder::{EncodeFailure, EncodePlan};
use crate::scope::JobScope;

/// `count` three-second clips from distinct sources, in timeline order.
pub(crate) fn clips(count: usize) -> Vec<Clip> {
    let mut timeline = Timeline::new();
    for i in 0..count {
        let segment = SourceSegment::new(
            format!("/media/source-{i}.mp4"),
            0.0,
            3.0,
            FrameSize::new(1080, 1920),
            30.0,
            SegmentKind::Video,
        )
        .unwrap();
        timeline.push(Arc::new(segment), 3.0, TransitionKind::None);
    }
    timeline
        .placements()
        .iter()
        .enumerate()
        .map(|(i, placed)| Clip::from_placed(i, placed))
        .collect()
}

/// Writes `clip-<index>` lines instead of video; concat joins file contents.
#[derive(Debug, Default)]
pub(crate) struct TextBackend {
    failing_clips: HashSet<usize>,
    fail_encode: bool,
    pub encoded: Mutex<Vec<EncodePlan>>,
}

impl TextBackend {
    pub fn failing_clips(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            failing_clips: indices.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn failing_encode() -> Self {
        Self {
            fail_encode: true,
            ..Self::default()
        }
    }
}

impl MediaBackend for TextBackend {
    fn render_clip(&self, clip: &Clip, output: &Path, _scope: &JobScope) -> ReelResult<()> {
        if self.failing_clips.contains(&clip.index) {
            std::fs::write(output, "partial")?;
            return Err(ReelError::segment(clip.index, "decoder error"));
        }
        std::fs::write(output, format!("clip-{}\n", clip.index))?;
        Ok(())
    }

    fn concat(&self, parts: &[PathBuf], output: &Path, _scope: &JobScope) -> ReelResult<()> {
        let mut joined = String::new();
        for part in parts {
            joined.push_str(&std::fs::read_to_string(part)?);
        }
        std::fs::write(output, joined)?;
        Ok(())
    }

    fn encode(
        &self,
        plan: &EncodePlan,
        _scope: &JobScope,
        observer: &dyn PipelineObserver,
    ) -> Result<(), EncodeFailure> {
        self.encoded
            .lock()
            .unwrap()
            .push(plan.clone());
        if self.fail_encode {
            std::fs::write(&plan.output, "truncated").map_err(ReelError::from)?;
            return Err(EncodeFailure::new(
                ReelError::encode("ffmpeg exited with exit status: 1"),
                "Invalid data found when processing input",
            ));
        }

        let video = std::fs::read_to_string(&plan.video).map_err(ReelError::from)?;
        observer.on_progress(0.5);
        std::fs::write(&plan.output, video).map_err(ReelError::from)?;
        observer.on_progress(1.0);
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "text"
    }
}

//! Batch compositor: renders clips a few at a time and folds each batch into
//! a running assembled file.
//!
//! At most one batch of intermediates exists on disk at any moment. Each batch
//! is concatenated, appended to the accumulated result, and its parts deleted
//! before the next batch starts. Clips inside a batch render in parallel;
//! output order always follows timeline order.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use reelsmith_common::{ReelError, ReelResult};
use reelsmith_processing_core::PipelineObserver;
use reelsmith_project_model::Clip;

use crate::backend::MediaBackend;
use crate::scope::JobScope;

/// Batching parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositorConfig {
    /// Clips per batch.
    pub batch_size: usize,

    /// Clips rendered concurrently inside a batch.
    pub threads: usize,
}

impl CompositorConfig {
    pub fn new(batch_size: usize, threads: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            threads: threads.max(1),
        }
    }
}

/// The assembled video.
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    pub path: PathBuf,

    /// Sum of the durations of the clips that made it in.
    pub duration: f64,

    pub clips_rendered: usize,
    pub clips_skipped: usize,
}

#[derive(Debug)]
struct RenderedPart {
    path: PathBuf,
    duration: f64,
}

/// Render `clips` in batches and assemble them in order.
///
/// A clip that fails to render is reported as [`ReelError::SegmentProcess`]
/// and left out. A batch that produces nothing, or cannot be joined, is
/// reported as [`ReelError::BatchAssembly`] and left out. Only when nothing at
/// all survives does this return [`ReelError::EmptyTimeline`].
pub fn compose(
    clips: &[Clip],
    backend: &dyn MediaBackend,
    scope: &JobScope,
    config: &CompositorConfig,
    observer: &dyn PipelineObserver,
) -> ReelResult<Composite> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .thread_name(|i| format!("reelsmith-render-{i}"))
        .build()
        .map_err(|e| ReelError::Other(anyhow::anyhow!("failed to build render pool: {e}")))?;

    let mut assembled: Option<RenderedPart> = None;
    let mut clips_rendered = 0;
    let mut clips_skipped = 0;

    for (batch_index, batch) in clips.chunks(config.batch_size).enumerate() {
        let rendered: Vec<Option<RenderedPart>> = pool.install(|| {
            batch
                .par_iter()
                .map(|clip| render_one(clip, backend, scope, observer))
                .collect()
        });
        let parts: Vec<RenderedPart> = rendered.into_iter().flatten().collect();
        clips_skipped += batch.len() - parts.len();

        if parts.is_empty() {
            observer.on_warning(&ReelError::batch(
                batch_index,
                format!("none of its {} clip(s) rendered", batch.len()),
            ));
            continue;
        }

        let part_count = parts.len();
        let Some(batch_part) = join_batch(batch_index, parts, backend, scope, observer) else {
            clips_skipped += part_count;
            continue;
        };

        assembled = match assembled.take() {
            None => {
                clips_rendered += part_count;
                Some(batch_part)
            }
            Some(previous) => {
                let merged_path = scope.intermediate(&format!("assembled-{batch_index:05}.mp4"));
                let inputs = [previous.path.clone(), batch_part.path.clone()];
                let merged = backend.concat(&inputs, &merged_path, scope);
                remove_quietly(&batch_part.path);
                match merged {
                    Ok(()) => {
                        remove_quietly(&previous.path);
                        clips_rendered += part_count;
                        Some(RenderedPart {
                            path: merged_path,
                            duration: previous.duration + batch_part.duration,
                        })
                    }
                    Err(err) => {
                        remove_quietly(&merged_path);
                        observer.on_warning(&ReelError::batch(
                            batch_index,
                            format!("merge into assembled video failed: {err}"),
                        ));
                        clips_skipped += part_count;
                        Some(previous)
                    }
                }
            }
        };

        tracing::debug!(
            batch = batch_index,
            parts = part_count,
            assembled_secs = assembled.as_ref().map(|a| a.duration).unwrap_or(0.0),
            "Batch assembled"
        );
    }

    let assembled = assembled.ok_or_else(|| {
        ReelError::empty_timeline(format!(
            "none of the {} clip(s) could be rendered and assembled",
            clips.len()
        ))
    })?;

    tracing::info!(
        clips_rendered,
        clips_skipped,
        duration_secs = assembled.duration,
        "Composite assembled"
    );
    Ok(Composite {
        path: assembled.path,
        duration: assembled.duration,
        clips_rendered,
        clips_skipped,
    })
}

fn render_one(
    clip: &Clip,
    backend: &dyn MediaBackend,
    scope: &JobScope,
    observer: &dyn PipelineObserver,
) -> Option<RenderedPart> {
    let path = scope.intermediate(&format!("seg-{:05}.mp4", clip.index));
    match backend.render_clip(clip, &path, scope) {
        Ok(()) => Some(RenderedPart {
            path,
            duration: clip.duration,
        }),
        Err(err) => {
            remove_quietly(&path);
            let warning = match err {
                err @ ReelError::SegmentProcess { .. } => err,
                other => ReelError::segment(clip.index, other.to_string()),
            };
            observer.on_warning(&warning);
            None
        }
    }
}

/// Concatenate one batch's parts into a single file, deleting the parts.
fn join_batch(
    batch_index: usize,
    parts: Vec<RenderedPart>,
    backend: &dyn MediaBackend,
    scope: &JobScope,
    observer: &dyn PipelineObserver,
) -> Option<RenderedPart> {
    if parts.len() == 1 {
        return parts.into_iter().next();
    }

    let batch_path = scope.intermediate(&format!("batch-{batch_index:05}.mp4"));
    let paths: Vec<PathBuf> = parts.iter().map(|part| part.path.clone()).collect();
    let result = backend.concat(&paths, &batch_path, scope);
    for path in &paths {
        remove_quietly(path);
    }

    match result {
        Ok(()) => Some(RenderedPart {
            path: batch_path,
            duration: parts.iter().map(|part| part.duration).sum(),
        }),
        Err(err) => {
            remove_quietly(&batch_path);
            observer.on_warning(&ReelError::batch(batch_index, format!("concat failed: {err}")));
            None
        }
    }
}

fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "Failed to remove intermediate"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{clips, TextBackend};
    use reelsmith_processing_core::RecordingObserver;

    /// Compose `count` clips and return the composite with its contents.
    fn assemble(
        backend: &TextBackend,
        count: usize,
        batch_size: usize,
    ) -> (ReelResult<(Composite, String)>, RecordingObserver) {
        let scope = JobScope::new().unwrap();
        let observer = RecordingObserver::new();
        let result = compose(
            &clips(count),
            backend,
            &scope,
            &CompositorConfig::new(batch_size, 3),
            &observer,
        )
        .map(|composite| {
            let text = std::fs::read_to_string(&composite.path).unwrap();
            (composite, text)
        });
        (result, observer)
    }

    #[test]
    fn test_batched_order_matches_unbatched() {
        let backend = TextBackend::default();
        let (batched, _) = assemble(&backend, 9, 3);
        let (single, _) = assemble(&backend, 9, 9);
        let (batched, text) = batched.unwrap();

        assert_eq!(text, single.unwrap().1);
        assert_eq!(
            text,
            "clip-0\nclip-1\nclip-2\nclip-3\nclip-4\nclip-5\nclip-6\nclip-7\nclip-8\n"
        );
        assert_eq!(batched.clips_rendered, 9);
        assert!((batched.duration - 27.0).abs() < 1e-9);
    }

    #[test]
    fn test_failed_clip_is_skipped_with_warning() {
        let backend = TextBackend::failing_clips([4]);
        let (result, observer) = assemble(&backend, 6, 3);
        let (composite, text) = result.unwrap();

        assert_eq!(
            text,
            "clip-0\nclip-1\nclip-2\nclip-3\nclip-5\n"
        );
        assert_eq!(composite.clips_skipped, 1);
        let warnings = observer.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Segment 4 failed"));
    }

    #[test]
    fn test_empty_batch_is_skipped() {
        let backend = TextBackend::failing_clips([3, 4, 5]);
        let (result, observer) = assemble(&backend, 9, 3);
        let (composite, text) = result.unwrap();

        assert_eq!(composite.clips_rendered, 6);
        assert_eq!(
            text,
            "clip-0\nclip-1\nclip-2\nclip-6\nclip-7\nclip-8\n"
        );
        assert!(observer
            .warnings()
            .iter()
            .any(|w| w.starts_with("Batch 1 failed")));
    }

    #[test]
    fn test_nothing_rendered_is_empty_timeline() {
        let backend = TextBackend::failing_clips(0..4);
        let (result, _) = assemble(&backend, 4, 3);
        assert!(matches!(result, Err(ReelError::EmptyTimeline { .. })));
    }

    #[test]
    fn test_intermediates_removed_as_batches_merge() {
        let backend = TextBackend::default();
        let scope = JobScope::new().unwrap();
        let composite = compose(
            &clips(7),
            &backend,
            &scope,
            &CompositorConfig::new(2, 2),
            &RecordingObserver::new(),
        )
        .unwrap();

        let remaining: Vec<PathBuf> = std::fs::read_dir(scope.work_dir())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(remaining, vec![composite.path]);
    }
}

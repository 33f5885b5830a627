//! End-to-end job execution.
//!
//! ```text
//! sources ─► segment ─► accumulate ─► normalize + transitions ─► batch compose ─► encode
//!                                                                                  ▲
//!                               narration + BGM + subtitle overlays ───────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use reelsmith_common::{AppConfig, ReelError, ReelResult};
use reelsmith_processing_core::{
    accumulate, prepare_clips, segment_sources, AccumulatorConfig, DefaultResizer, JobStage,
    MediaProbe, PipelineObserver, PrepareConfig, PreparedClip, PreparedSummary, Resizer,
    SegmenterConfig, TracingObserver,
};
use reelsmith_project_model::{
    load_srt, FrameSize, ModelError, RenderJob, SourceSegment, SubtitleCue, Timeline,
};
use serde::Serialize;

use crate::audio::{resolve_bgm, AudioMix, BgmTrack};
use crate::backend::{FfmpegBackend, MediaBackend};
use crate::compositor::{compose, CompositorConfig};
use crate::encoder::{run_final_encode, EncodePlan};
use crate::probe::FfprobeProbe;
use crate::resources::{EncoderLimiter, ResourceBudget};
use crate::scope::JobScope;
use crate::subtitles::{drawtext_filters, layout_cues};
use crate::text::measure_for;

/// Enforces the forward-only order of [`JobStage`]s.
///
/// Each non-terminal stage must follow the one before it. `Failed` can be
/// entered from anywhere that is not already terminal.
#[derive(Debug, Default, Clone)]
pub struct JobStateMachine {
    current: Option<JobStage>,
}

impl JobStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stage last entered, `None` before the job starts.
    pub fn current(&self) -> Option<JobStage> {
        self.current
    }

    pub fn advance(&mut self, next: JobStage) -> ReelResult<()> {
        let allowed = match (self.current, next) {
            (Some(current), _) if current.is_terminal() => false,
            (_, JobStage::Failed) => true,
            (None, JobStage::Segmenting) => true,
            (None, _) => false,
            (Some(current), next) => next.ordinal() == current.ordinal() + 1,
        };
        if !allowed {
            return Err(ReelError::Other(anyhow::anyhow!(
                "invalid stage transition {} -> {next}",
                self.current.map(JobStage::as_str).unwrap_or("start"),
            )));
        }
        self.current = Some(next);
        Ok(())
    }
}

/// Dry-run result: what a job would render, without touching the encoder.
#[derive(Debug, Clone, Serialize)]
pub struct JobPlan {
    pub target_duration: f64,
    pub canvas: FrameSize,
    pub segments_found: usize,
    pub timeline_duration: f64,
    pub clips: Vec<PreparedSummary>,
}

/// Where a pipeline gets its [`MediaProbe`] for each job.
enum ProbeSource {
    /// A fresh ffprobe bound to the job's process registry.
    Ffprobe(PathBuf),
    Shared(Arc<dyn MediaProbe>),
}

/// Runs render jobs with injected probe, backend, resizer, and observer.
pub struct Pipeline {
    config: AppConfig,
    probe: ProbeSource,
    backend: Arc<dyn MediaBackend>,
    resizer: Arc<dyn Resizer>,
    observer: Arc<dyn PipelineObserver>,
    limiter: EncoderLimiter,
}

impl Pipeline {
    /// Pipeline driving the configured ffmpeg and ffprobe binaries.
    pub fn new(config: AppConfig) -> Self {
        let backend = Arc::new(FfmpegBackend::new(
            config.encoder.clone(),
            config.resources.threads_per_process,
        ));
        let probe = ProbeSource::Ffprobe(config.encoder.ffprobe_path.clone());
        Self::assemble(config, probe, backend)
    }

    pub fn with_components(
        config: AppConfig,
        probe: Arc<dyn MediaProbe>,
        backend: Arc<dyn MediaBackend>,
    ) -> Self {
        Self::assemble(config, ProbeSource::Shared(probe), backend)
    }

    fn assemble(config: AppConfig, probe: ProbeSource, backend: Arc<dyn MediaBackend>) -> Self {
        let limiter = EncoderLimiter::new(ResourceBudget::from(&config.resources));
        Self {
            config,
            probe,
            backend,
            resizer: Arc::new(DefaultResizer),
            observer: Arc::new(TracingObserver),
            limiter,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_resizer(mut self, resizer: Arc<dyn Resizer>) -> Self {
        self.resizer = resizer;
        self
    }

    /// Share an encoder limiter with other pipelines.
    pub fn with_limiter(mut self, limiter: EncoderLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn limiter(&self) -> &EncoderLimiter {
        &self.limiter
    }

    /// Render `job` to its output path.
    ///
    /// Recoverable failures go to the observer; the first fatal one ends the
    /// job in [`JobStage::Failed`]. Intermediates and child processes are
    /// cleaned up either way.
    pub fn run(&self, job: &RenderJob) -> ReelResult<PathBuf> {
        let started = std::time::Instant::now();
        let mut stages = JobStateMachine::new();

        tracing::info!(
            output = %job.output_path.display(),
            sources = job.sources.len(),
            aspect = ?job.aspect,
            "Starting render job"
        );

        let result = self.execute(job, &mut stages);
        match &result {
            Ok(output) => tracing::info!(
                output = %output.display(),
                elapsed_secs = started.elapsed().as_secs_f64(),
                "Render job finished"
            ),
            Err(err) => {
                if stages.advance(JobStage::Failed).is_ok() {
                    self.observer.on_stage(JobStage::Failed);
                }
                tracing::error!(error = %err, "Render job failed");
            }
        }
        result
    }

    /// Segment, accumulate, and prepare `job` without rendering anything.
    pub fn plan(&self, job: &RenderJob) -> ReelResult<JobPlan> {
        job.validate().map_err(model_error)?;
        let mut rng = job_rng(job);
        let probe = self.job_probe(None);

        let target_duration = self.target_duration(job, probe.as_ref())?;
        let segments = self.segment(job, probe.as_ref())?;
        let segments_found = segments.len();
        let mut timeline = self.accumulate(job, segments, target_duration, &mut rng)?;
        let prepared = self.prepare(job, &mut timeline, &mut rng)?;

        Ok(JobPlan {
            target_duration,
            canvas: job.canvas().into(),
            segments_found,
            timeline_duration: timeline.total_duration(),
            clips: prepared.iter().map(PreparedClip::summary).collect(),
        })
    }

    fn execute(&self, job: &RenderJob, stages: &mut JobStateMachine) -> ReelResult<PathBuf> {
        job.validate().map_err(model_error)?;
        if !self.backend.is_available() {
            return Err(ReelError::ToolNotFound {
                tool: self.backend.name().to_string(),
            });
        }
        let _permit = self.limiter.try_acquire(self.backend.threads())?;
        let scope = JobScope::new()?;
        let probe = self.job_probe(Some(&scope));
        let mut rng = job_rng(job);

        self.enter(stages, JobStage::Segmenting)?;
        let target_duration = self.target_duration(job, probe.as_ref())?;
        let segments = self.segment(job, probe.as_ref())?;

        self.enter(stages, JobStage::Accumulating)?;
        let mut timeline = self.accumulate(job, segments, target_duration, &mut rng)?;

        self.enter(stages, JobStage::Normalizing)?;
        let prepared = self.prepare(job, &mut timeline, &mut rng)?;

        self.enter(stages, JobStage::Batching)?;
        let clips: Vec<_> = prepared.into_iter().map(|prepared| prepared.clip).collect();
        let composite = compose(
            &clips,
            self.backend.as_ref(),
            &scope,
            &CompositorConfig::new(self.config.pipeline.batch_size, job.thread_budget),
            self.observer.as_ref(),
        )?;

        self.enter(stages, JobStage::Encoding)?;
        let plan = self.encode_plan(job, composite.path, composite.duration, &scope, &mut rng)?;
        let output = run_final_encode(
            self.backend.as_ref(),
            &plan,
            &self.config.encoder,
            &scope,
            self.config.pipeline.write_debug_report,
            self.observer.as_ref(),
        )?;

        self.enter(stages, JobStage::Done)?;
        Ok(output)
    }

    fn enter(&self, stages: &mut JobStateMachine, stage: JobStage) -> ReelResult<()> {
        stages.advance(stage)?;
        self.observer.on_stage(stage);
        Ok(())
    }

    /// The probe for one job; ffprobe runs join `scope`'s registry when given.
    fn job_probe(&self, scope: Option<&JobScope>) -> Arc<dyn MediaProbe> {
        match &self.probe {
            ProbeSource::Shared(probe) => Arc::clone(probe),
            ProbeSource::Ffprobe(path) => {
                let probe = FfprobeProbe::new(path.clone());
                match scope {
                    Some(scope) => Arc::new(probe.with_registry(scope.registry_handle())),
                    None => Arc::new(probe),
                }
            }
        }
    }

    /// Explicit target, else the narration length, probing it if unknown.
    fn target_duration(&self, job: &RenderJob, probe: &dyn MediaProbe) -> ReelResult<f64> {
        if let Some(target) = job.target_duration.or(job.narration.duration_secs) {
            return Ok(target);
        }
        let info = probe.probe(&job.narration.path)?;
        info.duration
            .filter(|duration| *duration > 0.0)
            .ok_or_else(|| {
                ReelError::probe(format!(
                    "narration {} has no usable duration",
                    job.narration.path.display()
                ))
            })
    }

    fn segment(&self, job: &RenderJob, probe: &dyn MediaProbe) -> ReelResult<Vec<SourceSegment>> {
        let config = SegmenterConfig::from_job(job, &self.config.pipeline);
        segment_sources(
            &job.sources,
            probe,
            &config,
            self.observer.as_ref(),
        )
    }

    fn accumulate(
        &self,
        job: &RenderJob,
        segments: Vec<SourceSegment>,
        target_duration: f64,
        rng: &mut StdRng,
    ) -> ReelResult<Timeline> {
        let config = AccumulatorConfig::from_job(job, &self.config.pipeline);
        accumulate(segments, target_duration, &config, rng)
    }

    fn prepare(
        &self,
        job: &RenderJob,
        timeline: &mut Timeline,
        rng: &mut StdRng,
    ) -> ReelResult<Vec<PreparedClip>> {
        prepare_clips(
            timeline,
            &PrepareConfig::from_job(job),
            self.resizer.as_ref(),
            rng,
        )
    }

    fn encode_plan(
        &self,
        job: &RenderJob,
        video: PathBuf,
        duration: f64,
        scope: &JobScope,
        rng: &mut StdRng,
    ) -> ReelResult<EncodePlan> {
        let bgm = resolve_bgm(&job.bgm, self.config.pipeline.bgm_dir.as_deref(), rng).map(
            |path| BgmTrack {
                path,
                volume: job.bgm.volume,
                fade_out: self.config.pipeline.bgm_fade_out_secs,
            },
        );

        let cues = subtitle_cues(job)?;
        let video_filters = if cues.is_empty() {
            Vec::new()
        } else {
            let style = &job.subtitles.style;
            let measure = measure_for(style.font_path.as_deref(), style.font_size);
            let elements = layout_cues(&cues, job.canvas().into(), style, measure.as_ref());
            tracing::debug!(cues = cues.len(), overlays = elements.len(), "Subtitles laid out");
            drawtext_filters(
                &elements,
                style,
                measure.line_height(),
                &scope.intermediate("subtitles"),
            )?
        };

        Ok(EncodePlan {
            video,
            duration,
            audio: AudioMix {
                narration: job.narration.path.clone(),
                narration_volume: job.narration.volume,
                bgm,
            },
            video_filters,
            output: job.output_path.clone(),
        })
    }
}

/// Run `job` on the blocking thread pool.
pub async fn render_job(pipeline: Arc<Pipeline>, job: RenderJob) -> ReelResult<PathBuf> {
    tokio::task::spawn_blocking(move || pipeline.run(&job))
        .await
        .map_err(|e| ReelError::Other(anyhow::anyhow!("render task panicked: {e}")))?
}

/// Inline cues followed by cues from the SRT file, ordered by start time.
fn subtitle_cues(job: &RenderJob) -> ReelResult<Vec<SubtitleCue>> {
    if !job.subtitles.enabled {
        return Ok(Vec::new());
    }
    let mut cues = job.subtitles.cues.clone();
    if let Some(path) = &job.subtitles.srt_path {
        cues.extend(load_srt(path).map_err(model_error)?);
    }
    cues.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    Ok(cues)
}

fn job_rng(job: &RenderJob) -> StdRng {
    match job.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn model_error(err: ModelError) -> ReelError {
    ReelError::invalid_job(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TextBackend;
    use reelsmith_common::ResourceConfig;
    use reelsmith_processing_core::testing::TableProbe;
    use reelsmith_processing_core::RecordingObserver;
    use reelsmith_project_model::{ConcatMode, SourceMedia};

    fn probe() -> TableProbe {
        TableProbe::default()
            .with("/media/a.mp4", Some(5.0), 1920, 1080)
            .with("/media/b.mp4", Some(5.0), 1080, 1920)
            .with("/media/c.mp4", Some(5.0), 1920, 1080)
            .with("/media/voice.mp3", Some(12.0), 0, 0)
    }

    fn job(output: PathBuf) -> RenderJob {
        let mut job = RenderJob::new(
            output,
            ["a", "b", "c"]
                .iter()
                .map(|name| SourceMedia::new(format!("/media/{name}.mp4")))
                .collect(),
            "/media/voice.mp3",
        );
        job.concat_mode = ConcatMode::Sequential;
        job.seed = Some(7);
        job
    }

    fn pipeline(backend: Arc<TextBackend>, observer: Arc<RecordingObserver>) -> Pipeline {
        Pipeline::with_components(AppConfig::default(), Arc::new(probe()), backend)
            .with_observer(observer)
    }

    #[test]
    fn test_state_machine_is_forward_only() {
        let mut stages = JobStateMachine::new();
        assert!(stages.advance(JobStage::Accumulating).is_err());
        stages.advance(JobStage::Segmenting).unwrap();
        assert!(stages.advance(JobStage::Segmenting).is_err());
        stages.advance(JobStage::Accumulating).unwrap();
        assert!(stages.advance(JobStage::Batching).is_err());
        assert!(stages.advance(JobStage::Done).is_err());
        stages.advance(JobStage::Failed).unwrap();
        assert!(stages.advance(JobStage::Failed).is_err());
        assert_eq!(stages.current(), Some(JobStage::Failed));
    }

    #[test]
    fn test_done_only_after_encoding() {
        let mut stages = JobStateMachine::new();
        for stage in [
            JobStage::Segmenting,
            JobStage::Accumulating,
            JobStage::Normalizing,
            JobStage::Batching,
            JobStage::Encoding,
            JobStage::Done,
        ] {
            stages.advance(stage).unwrap();
        }
        assert!(stages.advance(JobStage::Failed).is_err());
    }

    #[test]
    fn test_run_assembles_in_timeline_order() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("final.mp4");
        let backend = Arc::new(TextBackend::default());
        let observer = Arc::new(RecordingObserver::new());

        let mut job = job(output.clone());
        job.subtitles.enabled = true;
        job.subtitles.cues = vec![SubtitleCue::new(0.0, 4.0, "hello there")];

        let result = pipeline(backend.clone(), observer.clone()).run(&job).unwrap();

        assert_eq!(result, output);
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "clip-0\nclip-1\nclip-2\n"
        );
        assert_eq!(
            observer.stages(),
            vec![
                JobStage::Segmenting,
                JobStage::Accumulating,
                JobStage::Normalizing,
                JobStage::Batching,
                JobStage::Encoding,
                JobStage::Done,
            ]
        );
        assert_eq!(observer.progress().last().copied(), Some(1.0));

        let encoded = backend.encoded.lock().unwrap();
        assert!((encoded[0].duration - 12.0).abs() < 1e-9);
        assert_eq!(encoded[0].video_filters.len(), 1);
        assert!(dir.path().join("final.mp4.ffmpeg-debug.txt").is_file());
    }

    #[test]
    fn test_encoder_failure_leaves_diagnostic_only() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path().join("final.mp4"));
        let observer = Arc::new(RecordingObserver::new());

        let err = pipeline(Arc::new(TextBackend::failing_encode()), observer.clone())
            .run(&job)
            .unwrap_err();

        let ReelError::Encode { diagnostic, .. } = err else {
            panic!("expected encode error, got {err:?}");
        };
        assert_eq!(diagnostic, Some(job.diagnostic_path()));
        assert!(!job.output_path.exists());

        let report = std::fs::read_to_string(job.diagnostic_path()).unwrap();
        assert!(report.contains("ffmpeg exited with exit status: 1"));
        assert!(report.contains("Invalid data found when processing input"));
        assert_eq!(observer.stages().last(), Some(&JobStage::Failed));
    }

    #[test]
    fn test_no_usable_media_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = job(dir.path().join("final.mp4"));
        job.sources = vec![SourceMedia::new("/media/missing.mp4")];
        let observer = Arc::new(RecordingObserver::new());

        let err = pipeline(Arc::new(TextBackend::default()), observer.clone())
            .run(&job)
            .unwrap_err();

        assert!(matches!(err, ReelError::NoUsableMedia { sources: 1 }));
        assert_eq!(observer.warnings().len(), 1);
        assert_eq!(
            observer.stages(),
            vec![JobStage::Segmenting, JobStage::Failed]
        );
    }

    #[test]
    fn test_rejects_job_when_encoders_busy() {
        let dir = tempfile::tempdir().unwrap();
        let mut resources = ResourceConfig::default();
        resources.max_processes = 1;
        let limiter = EncoderLimiter::new(ResourceBudget::from(&resources));
        let _held = limiter.try_acquire(1).unwrap();

        let observer = Arc::new(RecordingObserver::new());
        let err = pipeline(Arc::new(TextBackend::default()), observer.clone())
            .with_limiter(limiter)
            .run(&job(dir.path().join("final.mp4")))
            .unwrap_err();

        assert!(matches!(err, ReelError::CapacityExceeded { .. }));
        assert_eq!(observer.stages(), vec![JobStage::Failed]);
    }

    #[test]
    fn test_plan_matches_narration_length() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path().join("final.mp4"));
        let plan = pipeline(
            Arc::new(TextBackend::default()),
            Arc::new(RecordingObserver::new()),
        )
        .plan(&job)
        .unwrap();

        assert_eq!(plan.target_duration, 12.0);
        assert_eq!(plan.segments_found, 3);
        let durations: Vec<f64> = plan.clips.iter().map(|clip| clip.duration).collect();
        assert_eq!(durations, vec![5.0, 5.0, 2.0]);
        assert_eq!(plan.canvas, FrameSize::new(1080, 1920));
        assert!(!job.output_path.exists());
    }

    #[tokio::test]
    async fn test_render_job_runs_off_the_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path().join("final.mp4"));
        let pipeline = Arc::new(pipeline(
            Arc::new(TextBackend::default()),
            Arc::new(RecordingObserver::new()),
        ));

        let output = render_job(pipeline, job).await.unwrap();
        assert!(output.is_file());
    }
}

//! Render a job to video.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use reelsmith_common::{AppConfig, ReelError};
use reelsmith_processing_core::{JobStage, PipelineObserver};
use reelsmith_project_model::RenderJob;
use reelsmith_render_engine::{render_job, Pipeline};

/// Prints stages, skipped segments, and encode progress to the terminal.
struct ConsoleObserver;

impl PipelineObserver for ConsoleObserver {
    fn on_stage(&self, stage: JobStage) {
        println!("\n  Stage: {stage}");
    }

    fn on_warning(&self, warning: &ReelError) {
        println!("  [WARN] {warning}");
    }

    fn on_progress(&self, fraction: f64) {
        print!("\r  Progress: {:.1}%  ", fraction * 100.0);
        std::io::stdout().flush().ok();
    }
}

pub async fn run(
    config: AppConfig,
    job_path: PathBuf,
    output: Option<PathBuf>,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    println!("Rendering job: {}", job_path.display());

    let mut job = RenderJob::load(&job_path)
        .map_err(|e| anyhow::anyhow!("Failed to load job: {e}"))?;
    if let Some(output) = output {
        job.output_path = output;
    }
    if seed.is_some() {
        job.seed = seed;
    }

    let canvas = job.canvas();
    tracing::debug!(
        seed = ?job.seed,
        concat_mode = ?job.concat_mode,
        transition = job.transition.as_str(),
        "Loaded render job"
    );
    println!("  Output: {}", job.output_path.display());
    println!("  Canvas: {}x{}", canvas.width, canvas.height);
    println!("  Sources: {}", job.sources.len());

    let pipeline = Pipeline::new(config).with_observer(Arc::new(ConsoleObserver));
    match render_job(Arc::new(pipeline), job).await {
        Ok(path) => {
            println!("\nRender complete: {}", path.display());
            Ok(())
        }
        Err(ReelError::Encode {
            message,
            diagnostic: Some(diagnostic),
        }) => Err(anyhow::anyhow!(
            "Render failed: {message} (details in {})",
            diagnostic.display()
        )),
        Err(e) => Err(anyhow::anyhow!("Render failed: {e}")),
    }
}

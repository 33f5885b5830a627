//! Dry-run a job and print its timeline.

use std::path::PathBuf;

use reelsmith_common::AppConfig;
use reelsmith_project_model::RenderJob;
use reelsmith_render_engine::Pipeline;

pub fn run(config: AppConfig, job_path: PathBuf, json: bool) -> anyhow::Result<()> {
    let job = RenderJob::load(&job_path).map_err(|e| anyhow::anyhow!("Failed to load job: {e}"))?;
    let plan = Pipeline::new(config).plan(&job)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("Job plan: {}", job_path.display());
    println!("{}", "=".repeat(50));
    println!("  Canvas:          {}x{}", plan.canvas.width, plan.canvas.height);
    println!("  Target duration: {:.2}s", plan.target_duration);
    println!("  Segments found:  {}", plan.segments_found);
    println!("  Timeline:        {:.2}s in {} clips", plan.timeline_duration, plan.clips.len());
    println!();

    let mut position = 0.0;
    for clip in &plan.clips {
        println!(
            "  #{:<3} {:>7.2}s  +{:<5.2}s  {:<12} {:<10} {} @ {:.2}s",
            clip.index,
            position,
            clip.duration,
            format!("{:?}", clip.policy),
            clip.transition.as_str(),
            clip.source,
            clip.start,
        );
        position += clip.duration;
    }

    Ok(())
}

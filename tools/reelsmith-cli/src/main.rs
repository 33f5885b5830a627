//! Reelsmith CLI: render short-form videos from a job descriptor.
//!
//! Usage:
//!   reelsmith render <JOB>       Run the full pipeline
//!   reelsmith plan <JOB>         Show the timeline a job would render
//!   reelsmith check              Check for ffmpeg and ffprobe
//!   reelsmith budget             Estimate encoder RAM use

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reelsmith_common::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "reelsmith",
    about = "Assemble narrated short-form videos from stock media",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a job to its output file
    Render {
        /// Path to the job JSON
        job: PathBuf,

        /// Override the job's output path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the job's random seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Dry run: segment and accumulate without encoding
    Plan {
        /// Path to the job JSON
        job: PathBuf,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check for the external tools the pipeline needs
    Check,

    /// Estimate encoder RAM use against the configured limits
    Budget {
        /// Concurrent encoder processes
        #[arg(short, long, default_value = "3")]
        processes: usize,

        /// Threads per encoder process
        #[arg(short, long, default_value = "2")]
        threads: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    reelsmith_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Render { job, output, seed } => {
            commands::render::run(config, job, output, seed).await
        }
        Commands::Plan { job, json } => commands::plan::run(config, job, json),
        Commands::Check => commands::check::run(&config),
        Commands::Budget { processes, threads } => commands::budget::run(&config, processes, threads),
    }
}

//! Estimate encoder RAM use.

use reelsmith_common::AppConfig;
use reelsmith_render_engine::ResourceBudget;

pub fn run(config: &AppConfig, processes: usize, threads: usize) -> anyhow::Result<()> {
    let budget = ResourceBudget::from(&config.resources);

    println!("Encoder budget");
    println!("{}", "=".repeat(50));
    println!(
        "  Per process:   {} MiB ({} + {} x {} threads)",
        budget.estimate_process_mb(threads),
        budget.base_process_mb,
        budget.per_thread_mb,
        threads
    );
    println!(
        "  Total:         {} MiB for {} process(es), limit {} MiB",
        budget.estimated_total_mb(processes, threads),
        processes,
        budget.ram_limit_mb
    );
    println!(
        "  Max processes: {} at {} thread(s) (configured cap {})",
        budget.max_processes_for(threads),
        threads,
        budget.max_processes
    );
    println!();

    if budget.would_exceed(processes, threads) {
        println!("Verdict: EXCEEDS the configured limits");
    } else {
        println!("Verdict: within limits");
    }
    Ok(())
}

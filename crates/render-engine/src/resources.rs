//! Encoder process and RAM budgeting shared across concurrent jobs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use reelsmith_common::{ReelError, ReelResult, ResourceConfig};
use serde::Serialize;

/// Static RAM and process limits for encoder subprocesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceBudget {
    pub max_processes: usize,
    pub ram_limit_mb: u64,
    pub base_process_mb: u64,
    pub per_thread_mb: u64,
}

impl From<&ResourceConfig> for ResourceBudget {
    fn from(config: &ResourceConfig) -> Self {
        Self {
            max_processes: config.max_processes,
            ram_limit_mb: config.ram_limit_mb,
            base_process_mb: config.base_process_mb,
            per_thread_mb: config.per_thread_mb,
        }
    }
}

impl ResourceBudget {
    /// Estimated RAM of one encoder process using `threads` threads.
    pub fn estimate_process_mb(&self, threads: usize) -> u64 {
        self.base_process_mb + self.per_thread_mb * threads as u64
    }

    pub fn estimated_total_mb(&self, processes: usize, threads: usize) -> u64 {
        self.estimate_process_mb(threads) * processes as u64
    }

    /// Whether `processes` encoders of `threads` threads each break a limit.
    pub fn would_exceed(&self, processes: usize, threads: usize) -> bool {
        processes > self.max_processes
            || self.estimated_total_mb(processes, threads) > self.ram_limit_mb
    }

    /// Most encoders of `threads` threads that fit both limits.
    pub fn max_processes_for(&self, threads: usize) -> usize {
        let per_process = self.estimate_process_mb(threads).max(1);
        let by_ram = (self.ram_limit_mb / per_process) as usize;
        by_ram.min(self.max_processes)
    }
}

/// Counts running encoders across jobs.
///
/// Clones share the same counter.
#[derive(Debug, Clone)]
pub struct EncoderLimiter {
    budget: ResourceBudget,
    active: Arc<AtomicUsize>,
}

impl EncoderLimiter {
    pub fn new(budget: ResourceBudget) -> Self {
        Self {
            budget,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn budget(&self) -> &ResourceBudget {
        &self.budget
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Reserve a slot for one more encoder, or fail with `CapacityExceeded`.
    pub fn try_acquire(&self, threads: usize) -> ReelResult<EncoderPermit> {
        let mut current = self.active.load(Ordering::SeqCst);
        loop {
            if self.budget.would_exceed(current + 1, threads) {
                return Err(ReelError::capacity(format!(
                    "{} encoder(s) running; one more at {} thread(s) needs ~{} MiB of {} MiB (max {} processes)",
                    current,
                    threads,
                    self.budget.estimated_total_mb(current + 1, threads),
                    self.budget.ram_limit_mb,
                    self.budget.max_processes,
                )));
            }
            match self.active.compare_exchange(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    tracing::debug!(active = current + 1, threads, "Encoder permit acquired");
                    return Ok(EncoderPermit {
                        active: Arc::clone(&self.active),
                    });
                }
                Err(actual) => current = actual,
            }
        }
    }
}

/// Releases its encoder slot on drop.
#[derive(Debug)]
pub struct EncoderPermit {
    active: Arc<AtomicUsize>,
}

impl Drop for EncoderPermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

//! Scheduler configuration.

use serde::{Deserialize, Serialize};

// =============================================================================
// Configuration Constants
// =============================================================================

/// Default scheduler name, used as the worker thread prefix.
pub const DEFAULT_SCHEDULER_NAME: &str = "terrain";

/// Upper bound for the CPU-derived default worker count.
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// Default worker count: available cores, capped at [`DEFAULT_MAX_WORKERS`].
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(DEFAULT_MAX_WORKERS)
}

// =============================================================================
// Scheduler Configuration
// =============================================================================

/// Configuration for a [`JobScheduler`](super::JobScheduler).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Name used for worker threads and log fields.
    pub name: String,

    /// Number of worker threads.
    ///
    /// Zero selects manual mode: jobs stay queued until the owner drains
    /// them with `run_pending()` or `run_next()`.
    pub workers: usize,
}

impl SchedulerConfig {
    /// Manual-mode configuration (no worker threads).
    pub fn manual() -> Self {
        Self {
            workers: 0,
            ..Self::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn is_manual(&self) -> bool {
        self.workers == 0
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SCHEDULER_NAME.to_string(),
            workers: default_worker_count(),
        }
    }
}

//! Tuning knobs for the engine and its scheduler.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ceiling on one run segment, checked between steps. `None` = no limit.
    pub max_run_duration: Option<Duration>,
    /// How often the scheduler looks for due `waiting` executions.
    pub scheduler_poll_interval: Duration,
    /// Most executions the scheduler resumes per tick.
    pub scheduler_batch_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_run_duration: None,
            scheduler_poll_interval: Duration::from_millis(1000),
            scheduler_batch_size: 50,
        }
    }
}

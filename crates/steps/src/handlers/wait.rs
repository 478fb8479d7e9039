//! `wait`: delay the rest of the run.
//!
//! Short delays sleep in process. Anything longer suspends the run with a
//! resume timestamp; the scheduler picks it up again when it is due, so no
//! worker is held for the duration.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::{ExecutionContext, StepError, StepHandler, StepOutcome, Suspend};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WaitConfig {
    #[serde(default)]
    pub delay_ms: u64,
}

pub struct WaitHandler {
    inline_max: Duration,
}

impl WaitHandler {
    pub fn new(inline_max: Duration) -> Self {
        Self { inline_max }
    }
}

#[async_trait]
impl StepHandler for WaitHandler {
    const STEP_TYPE: &'static str = "wait";
    type Config = WaitConfig;

    async fn execute(
        &self,
        config: &WaitConfig,
        _ctx: &ExecutionContext,
    ) -> Result<StepOutcome, StepError> {
        let delay = Duration::from_millis(config.delay_ms);

        if delay <= self.inline_max {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            return Ok(StepOutcome::success(format!("Waited {}ms", config.delay_ms)));
        }

        let Some(resume_at) = i64::try_from(config.delay_ms)
            .ok()
            .and_then(chrono::Duration::try_milliseconds)
            .and_then(|delay| Utc::now().checked_add_signed(delay))
        else {
            return Ok(StepOutcome::failure(format!(
                "Wait of {}ms is out of range",
                config.delay_ms
            )));
        };

        Ok(StepOutcome::suspended(
            format!("Waiting {}ms, resuming at {}", config.delay_ms, resume_at.to_rfc3339()),
            Suspend::Until { resume_at },
        ))
    }
}

//! Resume scheduler: re-enters runs parked on a timed wait once they are due.
//!
//! Each tick claims a batch of due executions (a claim moves them to
//! `running`, so concurrent schedulers never resume the same one twice) and
//! resumes them concurrently.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{WorkflowEngine, WorkflowRunResult};
use crate::store::StoreError;

/// `tokio::time::interval` rejects a zero period.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct Scheduler {
    engine: Arc<WorkflowEngine>,
    poll_interval: Duration,
    batch_size: u32,
}

impl Scheduler {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        let config = engine.config().clone();
        if config.scheduler_poll_interval < MIN_POLL_INTERVAL || config.scheduler_batch_size == 0 {
            warn!(
                interval = ?config.scheduler_poll_interval,
                batch = config.scheduler_batch_size,
                "scheduler tuning out of range, clamping"
            );
        }
        Self {
            engine,
            poll_interval: config.scheduler_poll_interval.max(MIN_POLL_INTERVAL),
            batch_size: config.scheduler_batch_size.max(1),
        }
    }

    /// Claim and resume every execution due at `now`, up to the batch size.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Vec<WorkflowRunResult>, StoreError> {
        let due = self.engine.store().claim_due(now, self.batch_size).await?;
        if due.is_empty() {
            return Ok(Vec::new());
        }
        debug!("resuming {} due execution(s)", due.len());

        let handles = due.into_iter().map(|execution| {
            let engine = Arc::clone(&self.engine);
            let execution_id = execution.id;
            (execution_id, tokio::spawn(async move { engine.resume(execution).await }))
        });
        let (ids, handles): (Vec<_>, Vec<_>) = handles.unzip();

        let mut results = Vec::with_capacity(ids.len());
        for (execution_id, joined) in ids.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(result) => results.push(result),
                Err(join_error) => {
                    error!(execution_id = %execution_id, error = %join_error, "resume task aborted")
                }
            }
        }
        Ok(results)
    }

    /// Poll until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        info!(interval = ?self.poll_interval, batch = self.batch_size, "scheduler started");

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    if let Err(err) = self.tick(Utc::now()).await {
                        warn!(error = %err, "scheduler tick failed");
                    }
                }
            }
        }

        info!("scheduler stopped");
    }
}

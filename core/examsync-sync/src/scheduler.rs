//! Periodic triggers driven by explicit state.
//!
//! The host owns a [`SchedulerState`] and calls [`Scheduler::tick`] from
//! whatever timer it has. The state carries the re-entrancy flag, so there is
//! no process-global timer handle.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::SyncResult;

/// Work run by the scheduler.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn run(&self, now: DateTime<Utc>) -> SyncResult<()>;
}

/// Caller-owned scheduling state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerState {
    /// Set while a job is executing.
    pub running: bool,
    /// Start of the last attempt, successful or not.
    pub last_run: Option<DateTime<Utc>>,
}

/// What a tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A previous run has not cleared the flag.
    AlreadyRunning,
    /// The interval has not elapsed since `last_run`.
    NotDue { next_due: DateTime<Utc> },
    Completed,
    /// The job failed with this error code.
    Failed(&'static str),
}

/// Runs one job at a fixed interval.
pub struct Scheduler {
    interval: Duration,
    job: Arc<dyn ScheduledJob>,
}

impl Scheduler {
    pub fn new(interval: std::time::Duration, job: Arc<dyn ScheduledJob>) -> Self {
        Self {
            interval: Duration::from_std(interval).unwrap_or(Duration::MAX),
            job,
        }
    }

    /// When the job is next due, given the state.
    #[must_use]
    pub fn next_due(&self, state: &SchedulerState) -> Option<DateTime<Utc>> {
        state
            .last_run
            .map(|last| last.checked_add_signed(self.interval).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    /// Whether a tick at `now` would run the job.
    #[must_use]
    pub fn is_due(&self, state: &SchedulerState, now: DateTime<Utc>) -> bool {
        !state.running && self.next_due(state).is_none_or(|due| now >= due)
    }

    /// Runs the job if it is due and not already running.
    pub async fn tick(&self, state: &mut SchedulerState, now: DateTime<Utc>) -> TickOutcome {
        if state.running {
            debug!("Skipping {}: previous run still in progress", self.job.name());
            return TickOutcome::AlreadyRunning;
        }
        if let Some(next_due) = self.next_due(state) {
            if now < next_due {
                return TickOutcome::NotDue { next_due };
            }
        }

        state.running = true;
        state.last_run = Some(now);
        let result = self.job.run(now).await;
        state.running = false;

        match result {
            Ok(()) => {
                info!("Scheduled job {} completed", self.job.name());
                TickOutcome::Completed
            }
            Err(e) => {
                warn!("Scheduled job {} failed: {}", self.job.name(), e);
                TickOutcome::Failed(e.code())
            }
        }
    }
}

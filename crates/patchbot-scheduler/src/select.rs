//! Choosing which submission to build next.

use chrono::{DateTime, Duration, Utc};
use derive_more::Display;
use patchbot_config::SchedulerConfig;
use patchbot_core::SubmissionKey;
use patchbot_db::{BranchRepo, SubmissionRepo};
use std::sync::Arc;
use tracing::debug;

use crate::SchedulerResult;

/// Outcome of one selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Decision {
    /// Too many pushed branches are still being built downstream.
    #[display("rate limited ({in_flight} in flight, budget {budget})")]
    RateLimited { in_flight: i64, budget: u32 },
    /// A new patch was posted and has no branch yet.
    #[display("new patch for {_0}")]
    NewPatch(SubmissionKey),
    /// Periodic rebuild against the moving baseline.
    #[display("bitrot check for {_0}")]
    Bitrot(SubmissionKey),
    /// Nothing stale, and bitrot rebuilds are on schedule.
    #[display("nothing to do")]
    Idle,
}

impl Decision {
    pub fn key(&self) -> Option<SubmissionKey> {
        match self {
            Decision::NewPatch(key) | Decision::Bitrot(key) => Some(*key),
            Decision::RateLimited { .. } | Decision::Idle => None,
        }
    }
}

/// Pure selection over the store; never writes.
pub struct Scheduler {
    submissions: Arc<dyn SubmissionRepo>,
    branches: Arc<dyn BranchRepo>,
    concurrency: u32,
    cycle_hours: f64,
}

impl Scheduler {
    pub fn new(
        config: &SchedulerConfig,
        submissions: Arc<dyn SubmissionRepo>,
        branches: Arc<dyn BranchRepo>,
    ) -> Self {
        Self {
            submissions,
            branches,
            concurrency: config.concurrency,
            cycle_hours: config.cycle_hours,
        }
    }

    /// Rate gate, then freshness, then bitrot.
    pub async fn decide(&self, now: DateTime<Utc>) -> SchedulerResult<Decision> {
        let in_flight = self.branches.count_in_flight().await?;
        if in_flight >= i64::from(self.concurrency) {
            return Ok(Decision::RateLimited {
                in_flight,
                budget: self.concurrency,
            });
        }

        if let Some(key) = self.submissions.oldest_stale().await? {
            return Ok(Decision::NewPatch(key));
        }

        let tracked = self.submissions.count_tracked().await?;
        let target_per_hour = tracked as f64 / self.cycle_hours;
        let built_last_hour = self
            .submissions
            .count_built_since(now - Duration::hours(1))
            .await?;
        debug!(tracked, target_per_hour, built_last_hour, "Bitrot rate");

        if (built_last_hour as f64) < target_per_hour {
            if let Some(key) = self.submissions.least_recently_built().await? {
                return Ok(Decision::Bitrot(key));
            }
        }

        Ok(Decision::Idle)
    }

    /// The submission that most deserves a fresh branch, if any.
    pub async fn select_next(&self, now: DateTime<Utc>) -> SchedulerResult<Option<SubmissionKey>> {
        Ok(self.decide(now).await?.key())
    }
}

//! One scheduler tick: select, claim, build, record.

use chrono::{DateTime, Utc};
use patchbot_config::SchedulerConfig;
use patchbot_core::branch::BranchStatus;
use patchbot_core::{AttemptError, Submission, SubmissionKey};
use patchbot_db::{BranchRepo, NewBranch, SubmissionRepo};
use patchbot_git::{Pipeline, Published};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::select::{Decision, Scheduler};
use crate::SchedulerResult;

/// What a tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was selected.
    Skipped(Decision),
    /// Another worker claimed the selected submission first.
    Contended(SubmissionKey),
    Published {
        key: SubmissionKey,
        published: Published,
    },
    Failed {
        key: SubmissionKey,
        error: AttemptError,
    },
}

impl std::fmt::Display for TickOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TickOutcome::Skipped(decision) => write!(f, "{}", decision),
            TickOutcome::Contended(key) => write!(f, "{} was claimed by another worker", key),
            TickOutcome::Published { key, published } if published.pushed => {
                write!(f, "{} pushed as {}", key, published.branch)
            }
            TickOutcome::Published { key, published } => {
                write!(f, "{} built as {} (not pushed)", key, published.branch)
            }
            TickOutcome::Failed { key, error } => write!(f, "{} failed: {}", key, error),
        }
    }
}

/// Runs ticks against a store and a pipeline.
pub struct TickRunner {
    scheduler: Scheduler,
    submissions: Arc<dyn SubmissionRepo>,
    branches: Arc<dyn BranchRepo>,
    pipeline: Arc<dyn Pipeline>,
    worker_id: String,
    claim_timeout: Duration,
}

impl TickRunner {
    pub fn new(
        config: &SchedulerConfig,
        submissions: Arc<dyn SubmissionRepo>,
        branches: Arc<dyn BranchRepo>,
        pipeline: Arc<dyn Pipeline>,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            scheduler: Scheduler::new(config, submissions.clone(), branches.clone()),
            submissions,
            branches,
            pipeline,
            worker_id: worker_id.into(),
            claim_timeout: config.claim_timeout,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Run one tick. Attempt failures are returned as
    /// [`TickOutcome::Failed`]; only store errors are `Err`.
    pub async fn tick(&self) -> SchedulerResult<TickOutcome> {
        let now = Utc::now();
        let claim_cutoff = chrono::Duration::from_std(self.claim_timeout)
            .map(|timeout| now - timeout)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let released = self.submissions.release_stale_claims(claim_cutoff).await?;
        if released > 0 {
            warn!(released, "Released abandoned claims");
        }

        let decision = self.scheduler.decide(now).await?;
        let Some(key) = decision.key() else {
            info!(decision = %decision, "Nothing selected");
            return Ok(TickOutcome::Skipped(decision));
        };

        if !self.submissions.claim(key, &self.worker_id, now).await? {
            info!(key = %key, "Submission already claimed");
            return Ok(TickOutcome::Contended(key));
        }

        info!(key = %key, decision = %decision, "Building branch");
        let submission = self.submissions.get(key).await?;
        let result = self.pipeline.run(&submission).await;
        self.record(&submission, result).await
    }

    async fn record(
        &self,
        submission: &Submission,
        result: Result<Published, AttemptError>,
    ) -> SchedulerResult<TickOutcome> {
        let key = submission.key;
        let now = Utc::now();

        match result {
            Ok(published) => {
                if submission.last_message_id.as_deref() != Some(published.message_id.as_str()) {
                    // The stored id is overwritten below; this is the case
                    // where that hides a message the listing reported.
                    warn!(
                        key = %key,
                        stored = ?submission.last_message_id,
                        resolved = %published.message_id,
                        "Resolved message differs from the stored one"
                    );
                }

                self.submissions
                    .record_success(key, &published.message_id, &published.baseline_commit, now)
                    .await?;
                let status = if published.pushed {
                    BranchStatus::Testing
                } else {
                    BranchStatus::Local
                };
                self.branches
                    .insert(
                        NewBranch {
                            key,
                            status,
                            message_id: Some(published.message_id.clone()),
                            commit_id: Some(published.baseline_commit.clone()),
                            error_kind: None,
                        },
                        now,
                    )
                    .await?;
                Ok(TickOutcome::Published { key, published })
            }
            Err(error) => {
                self.submissions.record_failure(key, now).await?;
                self.branches
                    .insert(
                        NewBranch {
                            key,
                            status: BranchStatus::ApplyFailed,
                            message_id: None,
                            commit_id: None,
                            error_kind: Some(error.kind().to_string()),
                        },
                        now,
                    )
                    .await?;
                Ok(TickOutcome::Failed { key, error })
            }
        }
    }
}

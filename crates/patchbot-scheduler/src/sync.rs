//! Listing sync: refresh submissions from the tracking app.

use patchbot_core::resolver::{SubmissionLister, ThreadResolver};
use patchbot_core::{AttemptError, CommitfestId, SubmissionKey};
use patchbot_db::SubmissionRepo;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::SchedulerResult;

/// Counts from one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub commitfest_id: CommitfestId,
    /// Rows on the listing page.
    pub listed: usize,
    /// Rows that were new or had a different last email time.
    pub changed: usize,
    /// Changed active rows whose newest patch message was recorded.
    pub resolved: usize,
    /// Changed active rows that could not be resolved this time.
    pub unresolved: usize,
}

pub struct ListingSync {
    lister: Arc<dyn SubmissionLister>,
    resolver: Arc<dyn ThreadResolver>,
    submissions: Arc<dyn SubmissionRepo>,
}

impl ListingSync {
    pub fn new(
        lister: Arc<dyn SubmissionLister>,
        resolver: Arc<dyn ThreadResolver>,
        submissions: Arc<dyn SubmissionRepo>,
    ) -> Self {
        Self {
            lister,
            resolver,
            submissions,
        }
    }

    /// Scrape one commitfest (the current one by default) and upsert it.
    ///
    /// Build state (`last_branch_*`) is never touched here.
    pub async fn sync(&self, commitfest_id: Option<CommitfestId>) -> SchedulerResult<SyncReport> {
        let commitfest_id = match commitfest_id {
            Some(id) => id,
            None => self.lister.current_commitfest().await?,
        };

        let listing = self.lister.list_submissions(commitfest_id).await?;
        let changed = self
            .submissions
            .upsert_listing(commitfest_id, &listing)
            .await?;

        let mut report = SyncReport {
            commitfest_id,
            listed: listing.len(),
            changed: changed.len(),
            resolved: 0,
            unresolved: 0,
        };

        for key in changed {
            let submission = self.submissions.get(key).await?;
            if !submission.status.is_active() {
                continue;
            }

            match self.latest_message_id(key).await {
                Ok(Some(message_id)) => {
                    debug!(key = %key, message_id = %message_id, "Newest patch message");
                    self.submissions.set_last_message_id(key, &message_id).await?;
                    report.resolved += 1;
                }
                Ok(None) => {
                    debug!(key = %key, "No patch message yet");
                    report.unresolved += 1;
                }
                Err(e) => {
                    warn!(key = %key, kind = e.kind(), error = %e, "Could not resolve submission");
                    report.unresolved += 1;
                }
            }
        }

        info!(
            commitfest_id = %commitfest_id,
            listed = report.listed,
            changed = report.changed,
            resolved = report.resolved,
            unresolved = report.unresolved,
            "Listing synced"
        );
        Ok(report)
    }

    async fn latest_message_id(&self, key: SubmissionKey) -> Result<Option<String>, AttemptError> {
        let Some(thread_url) = self.resolver.thread_url(&key).await? else {
            return Ok(None);
        };
        Ok(self
            .resolver
            .latest_patch_message(&thread_url)
            .await?
            .map(|message| message.message_id))
    }
}

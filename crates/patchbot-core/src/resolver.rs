//! Collaborators that locate and download patches.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{AttemptError, CommitfestId, SubmissionKey, SubmissionListing};

/// The newest message in a thread that carries patch attachments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchMessage {
    pub message_id: String,
    /// Absolute attachment URLs, in the order the archive lists them.
    pub attachments: Vec<String>,
}

/// Resolves a submission to its mail thread and newest patch message.
#[async_trait]
pub trait ThreadResolver: Send + Sync {
    /// Canonical thread URL, or `None` if the submission has no thread
    /// with attachments.
    async fn thread_url(&self, key: &SubmissionKey) -> Result<Option<String>, AttemptError>;

    /// Newest message in the thread that has patch attachments.
    async fn latest_patch_message(
        &self,
        thread_url: &str,
    ) -> Result<Option<PatchMessage>, AttemptError>;
}

/// Downloads attachments byte for byte.
#[async_trait]
pub trait PatchSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, AttemptError>;
}

/// Reads submission listings from the tracking app.
#[async_trait]
pub trait SubmissionLister: Send + Sync {
    /// The commitfest currently open or in progress.
    async fn current_commitfest(&self) -> crate::Result<CommitfestId>;

    async fn list_submissions(
        &self,
        commitfest_id: CommitfestId,
    ) -> crate::Result<Vec<SubmissionListing>>;
}

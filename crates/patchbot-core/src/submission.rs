//! Submission records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{SubmissionId, SubmissionKey};

/// Review status of a submission, as shown by the tracking app.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubmissionStatus {
    NeedsReview,
    WaitingOnAuthor,
    ReadyForCommitter,
    Committed,
    ReturnedWithFeedback,
    Rejected,
    Withdrawn,
    MovedToNextCommitfest,
    /// Any label the tracking app introduces later.
    Other(String),
}

impl SubmissionStatus {
    /// Labels of the statuses eligible for scheduling.
    pub const ACTIVE: [&'static str; 3] = ["Needs review", "Waiting on Author", "Ready for Committer"];

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SubmissionStatus::NeedsReview
                | SubmissionStatus::WaitingOnAuthor
                | SubmissionStatus::ReadyForCommitter
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            SubmissionStatus::NeedsReview => "Needs review",
            SubmissionStatus::WaitingOnAuthor => "Waiting on Author",
            SubmissionStatus::ReadyForCommitter => "Ready for Committer",
            SubmissionStatus::Committed => "Committed",
            SubmissionStatus::ReturnedWithFeedback => "Returned with feedback",
            SubmissionStatus::Rejected => "Rejected",
            SubmissionStatus::Withdrawn => "Withdrawn",
            SubmissionStatus::MovedToNextCommitfest => "Moved to next CF",
            SubmissionStatus::Other(label) => label,
        }
    }
}

impl From<&str> for SubmissionStatus {
    fn from(label: &str) -> Self {
        match label.trim() {
            "Needs review" => SubmissionStatus::NeedsReview,
            "Waiting on Author" => SubmissionStatus::WaitingOnAuthor,
            "Ready for Committer" => SubmissionStatus::ReadyForCommitter,
            "Committed" => SubmissionStatus::Committed,
            // The app has used both capitalizations over the years.
            "Returned with feedback" | "Returned with Feedback" => {
                SubmissionStatus::ReturnedWithFeedback
            }
            "Rejected" => SubmissionStatus::Rejected,
            "Withdrawn" => SubmissionStatus::Withdrawn,
            "Moved to next CF" => SubmissionStatus::MovedToNextCommitfest,
            other => SubmissionStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for SubmissionStatus {
    fn from(label: String) -> Self {
        SubmissionStatus::from(label.as_str())
    }
}

impl From<SubmissionStatus> for String {
    fn from(status: SubmissionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One author of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub username: String,
    pub display_name: String,
}

impl Author {
    pub fn new(username: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            display_name: display_name.into(),
        }
    }
}

/// Render authors as `Display Name (username), ...` in listing order.
pub fn format_authors(authors: &[Author]) -> String {
    authors
        .iter()
        .map(|a| format!("{} ({})", a.display_name, a.username))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A submission and its last-processed state.
///
/// Absent timestamps and message ids mean "never observed"; there is no
/// separate sentinel for "unknown".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub key: SubmissionKey,
    pub title: String,
    pub status: SubmissionStatus,
    pub authors: Vec<Author>,
    /// Freshness proxy: time of the newest email in the submission's threads.
    pub last_email_time: Option<DateTime<Utc>>,
    /// Newest message with a patch attachment, as last seen.
    pub last_message_id: Option<String>,
    /// Message that produced the currently published branch.
    pub last_branch_message_id: Option<String>,
    /// Upstream baseline commit the branch was built from.
    pub last_branch_commit_id: Option<String>,
    /// Time of the most recent build attempt, successful or not.
    pub last_branch_time: Option<DateTime<Utc>>,
}

impl Submission {
    pub fn new(key: SubmissionKey, title: impl Into<String>, status: SubmissionStatus) -> Self {
        Self {
            key,
            title: title.into(),
            status,
            authors: Vec::new(),
            last_email_time: None,
            last_message_id: None,
            last_branch_message_id: None,
            last_branch_commit_id: None,
            last_branch_time: None,
        }
    }

    /// A new patch has been seen that no published branch reflects yet.
    pub fn is_stale(&self) -> bool {
        match &self.last_message_id {
            Some(message_id) => self.last_branch_message_id.as_ref() != Some(message_id),
            None => false,
        }
    }

    /// Active and has ever carried a patch; the population the bitrot
    /// throughput target is computed over.
    pub fn is_tracked(&self) -> bool {
        self.status.is_active() && self.last_message_id.is_some()
    }

    pub fn is_eligible_for_rebuild(&self) -> bool {
        self.is_tracked() && !self.is_stale()
    }
}

/// One row of a commitfest listing, as produced by the scraper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionListing {
    pub submission_id: SubmissionId,
    pub title: String,
    pub status: SubmissionStatus,
    pub authors: Vec<Author>,
    pub last_email_time: Option<DateTime<Utc>>,
}

//! Submission identifiers.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Numeric id of a commitfest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[display("{_0}")]
pub struct CommitfestId(pub i32);

/// Numeric id of a submission, unique within the whole tracking app.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[display("{_0}")]
pub struct SubmissionId(pub i32);

/// Composite identity of one submission in one commitfest.
///
/// Ordering is primary-key order (commitfest first), which is also the
/// tie-break used by the scheduler.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[display("{commitfest_id}/{submission_id}")]
pub struct SubmissionKey {
    pub commitfest_id: CommitfestId,
    pub submission_id: SubmissionId,
}

impl SubmissionKey {
    pub fn new(commitfest_id: i32, submission_id: i32) -> Self {
        Self {
            commitfest_id: CommitfestId(commitfest_id),
            submission_id: SubmissionId(submission_id),
        }
    }

    /// Name of the git branch published for this submission.
    pub fn branch_name(&self) -> String {
        format!("commitfest/{}/{}", self.commitfest_id, self.submission_id)
    }
}

impl std::str::FromStr for SubmissionKey {
    type Err = Error;

    /// Parses `"<commitfest_id>/<submission_id>"`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || Error::InvalidInput(format!("expected <commitfest>/<submission>, got {s:?}"));
        let (cf, sub) = s.split_once('/').ok_or_else(invalid)?;
        let cf = cf.trim().parse().map_err(|_| invalid())?;
        let sub = sub.trim().parse().map_err(|_| invalid())?;
        Ok(Self::new(cf, sub))
    }
}

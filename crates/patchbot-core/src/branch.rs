//! Tracking states of published branches.

use serde::{Deserialize, Serialize};

use crate::Error;

/// State of one row in the branch tracking table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BranchStatus {
    /// Pushed; downstream CI has not reported yet. Counts as in flight.
    Testing,
    /// Downstream CI reported success.
    Success,
    /// Downstream CI reported failure.
    Failure,
    /// The patch set could not be turned into a branch.
    ApplyFailed,
    /// Built but not pushed because no remote is configured.
    Local,
    /// A newer branch for the same submission was pushed over it.
    Superseded,
}

impl BranchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BranchStatus::Testing => "testing",
            BranchStatus::Success => "success",
            BranchStatus::Failure => "failure",
            BranchStatus::ApplyFailed => "apply-failed",
            BranchStatus::Local => "local",
            BranchStatus::Superseded => "superseded",
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, BranchStatus::Testing)
    }
}

impl std::fmt::Display for BranchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BranchStatus {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "testing" => Ok(BranchStatus::Testing),
            "success" => Ok(BranchStatus::Success),
            "failure" => Ok(BranchStatus::Failure),
            "apply-failed" => Ok(BranchStatus::ApplyFailed),
            "local" => Ok(BranchStatus::Local),
            "superseded" => Ok(BranchStatus::Superseded),
            other => Err(Error::InvalidInput(format!("unknown branch status: {other}"))),
        }
    }
}

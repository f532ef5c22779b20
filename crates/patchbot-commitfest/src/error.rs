//! Commitfest client errors.

use patchbot_core::AttemptError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommitfestError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("parse error: {0}")]
    Parse(String),
}

pub type CommitfestResult<T> = std::result::Result<T, CommitfestError>;

impl CommitfestError {
    pub fn request(url: &str, err: reqwest::Error) -> Self {
        CommitfestError::Request {
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    fn url(&self) -> Option<&str> {
        match self {
            CommitfestError::Request { url, .. } | CommitfestError::Status { url, .. } => {
                Some(url)
            }
            CommitfestError::Parse(_) => None,
        }
    }
}

impl From<CommitfestError> for patchbot_core::Error {
    fn from(err: CommitfestError) -> Self {
        patchbot_core::Error::Internal(err.to_string())
    }
}

impl From<CommitfestError> for AttemptError {
    fn from(err: CommitfestError) -> Self {
        AttemptError::Fetch {
            url: err.url().unwrap_or_default().to_string(),
            message: err.to_string(),
        }
    }
}

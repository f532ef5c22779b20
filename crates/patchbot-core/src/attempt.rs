//! Failure taxonomy for one build attempt.
//!
//! Every variant is scoped to a single attempt: it is logged and recorded,
//! and the submission is retried on a later tick.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    #[error("no mail thread could be resolved for the submission")]
    NoThread,

    #[error("the thread has no message with patch attachments")]
    NoAttachments,

    #[error("archive attachment combined with other attachments ({count} total)")]
    AmbiguousAttachments { count: usize },

    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("failed to extract {file}: {message}")]
    Extract { file: String, message: String },

    #[error("patch {index} ({file}) does not apply: {message}")]
    Apply {
        index: usize,
        file: String,
        message: String,
    },

    #[error("push failed: {message}")]
    Push { message: String },

    #[error("workspace error: {message}")]
    Workspace { message: String },
}

impl AttemptError {
    /// Stable short name, used in logs and in the branch table.
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptError::NoThread => "no-thread",
            AttemptError::NoAttachments => "no-attachments",
            AttemptError::AmbiguousAttachments { .. } => "ambiguous-attachments",
            AttemptError::Fetch { .. } => "fetch",
            AttemptError::Extract { .. } => "extract",
            AttemptError::Apply { .. } => "apply",
            AttemptError::Push { .. } => "push",
            AttemptError::Workspace { .. } => "workspace",
        }
    }

    pub fn workspace(message: impl std::fmt::Display) -> Self {
        AttemptError::Workspace {
            message: message.to_string(),
        }
    }
}

impl From<std::io::Error> for AttemptError {
    fn from(err: std::io::Error) -> Self {
        AttemptError::workspace(err)
    }
}

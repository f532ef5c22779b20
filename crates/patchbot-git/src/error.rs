//! Git errors.

use patchbot_core::AttemptError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("`git {command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("unexpected output from `git {command}`: {output:?}")]
    Output { command: String, output: String },
}

pub type GitResult<T> = std::result::Result<T, GitError>;

impl From<GitError> for AttemptError {
    fn from(err: GitError) -> Self {
        AttemptError::workspace(err)
    }
}

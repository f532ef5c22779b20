//! Scheduler errors.
//!
//! Attempt failures are outcomes, not errors; only the store and the
//! listing source can fail a tick or a sync.

use patchbot_db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("store error: {0}")]
    Store(#[from] DbError),

    #[error("listing error: {0}")]
    Listing(#[from] patchbot_core::Error),
}

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

//! Submission scheduling for patchbot.
//!
//! Each tick picks at most one submission, builds its branch through the
//! patch pipeline and records the outcome. Selection prefers submissions
//! with a new patch (oldest email first) and otherwise rebuilds for bitrot
//! at a rate that covers every tracked submission once per cycle.

pub mod error;
pub mod select;
pub mod sync;
pub mod tick;
pub mod worker;

pub use error::{SchedulerError, SchedulerResult};
pub use select::{Decision, Scheduler};
pub use sync::{ListingSync, SyncReport};
pub use tick::{TickOutcome, TickRunner};
pub use worker::Worker;

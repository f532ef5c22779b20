//! Repository traits and implementations.

pub mod branch;
pub mod memory;
pub mod submission;

pub use branch::{BranchRecord, BranchRepo, NewBranch, PgBranchRepo};
pub use memory::MemoryStore;
pub use submission::{PgSubmissionRepo, SubmissionRecord, SubmissionRepo};

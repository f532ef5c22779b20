//! Core domain types and traits for patchbot.
//!
//! This crate contains:
//! - Submission identifiers and records
//! - Branch naming and tracking states
//! - The attempt error taxonomy shared by every pipeline stage
//! - Attachment classification rules
//! - Collaborator traits for thread resolution and patch download

pub mod attachment;
pub mod attempt;
pub mod branch;
pub mod error;
pub mod id;
pub mod resolver;
pub mod submission;

pub use attempt::AttemptError;
pub use error::{Error, Result};
pub use id::{CommitfestId, SubmissionId, SubmissionKey};
pub use submission::{Author, Submission, SubmissionListing, SubmissionStatus};

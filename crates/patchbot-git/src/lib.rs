//! Turning a submission's latest patch set into a published git branch.
//!
//! This crate contains:
//! - A thin wrapper over the `git` command line
//! - The per-submission working directory and its append-only log
//! - Attachment download, archive extraction and patch ordering
//! - Raw diff / mailbox patch application
//! - The provenance commit and force-push
//! - [`PatchPipeline`], which chains all of the above

pub mod apply;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod git;
pub mod pipeline;
pub mod publish;
pub mod workdir;

pub use error::{GitError, GitResult};
pub use git::{GitOutput, GitRepo};
pub use pipeline::{AttemptState, PatchPipeline, Pipeline, Published};
pub use publish::BranchPublisher;
pub use workdir::{AttemptLog, WorkDir};

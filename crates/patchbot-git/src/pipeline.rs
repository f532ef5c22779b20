//! Patch pipeline: one build attempt for one submission.
//!
//! An attempt walks through [`AttemptState`] from `Resolving` to either
//! `Done` or `Failed`. There are no retries inside an attempt; a failed
//! submission is simply picked again on a later tick.

use async_trait::async_trait;
use chrono::Utc;
use patchbot_config::PatchbotConfig;
use patchbot_core::attachment::check_attachment_set;
use patchbot_core::resolver::{PatchMessage, PatchSource, ThreadResolver};
use patchbot_core::{AttemptError, Submission};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::apply::apply_patches;
use crate::extract::{collect_patches, extract};
use crate::fetch::{FetchedFile, fetch_attachments};
use crate::workdir::{AttemptLog, WorkDir};
use crate::{BranchPublisher, GitRepo};

/// A branch that was built, committed and (if a remote is set) pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub branch: String,
    /// Message the patches were taken from.
    pub message_id: String,
    /// Upstream commit the branch was built on.
    pub baseline_commit: String,
    /// Number of patch files applied.
    pub patches: usize,
    pub pushed: bool,
}

/// State of one build attempt.
#[derive(Debug, Clone)]
pub enum AttemptState {
    Resolving,
    Fetching {
        message: PatchMessage,
    },
    Extracting {
        message: PatchMessage,
        files: Vec<FetchedFile>,
    },
    Ordering {
        message: PatchMessage,
    },
    Applying {
        message: PatchMessage,
        patches: Vec<PathBuf>,
    },
    Committing {
        message: PatchMessage,
        baseline_commit: String,
        patches: usize,
    },
    Done(Published),
    Failed(AttemptError),
}

impl AttemptState {
    pub fn name(&self) -> &'static str {
        match self {
            AttemptState::Resolving => "resolving",
            AttemptState::Fetching { .. } => "fetching",
            AttemptState::Extracting { .. } => "extracting",
            AttemptState::Ordering { .. } => "ordering",
            AttemptState::Applying { .. } => "applying",
            AttemptState::Committing { .. } => "committing",
            AttemptState::Done(_) => "done",
            AttemptState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Done(_) | AttemptState::Failed(_))
    }
}

/// Runs one build attempt for a submission.
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn run(&self, submission: &Submission) -> Result<Published, AttemptError>;
}

/// The git-backed pipeline.
///
/// It owns the upstream checkout, which is mutated in place, so attempts
/// must not overlap.
pub struct PatchPipeline {
    resolver: Arc<dyn ThreadResolver>,
    source: Arc<dyn PatchSource>,
    repo: GitRepo,
    publisher: BranchPublisher,
    patches_root: PathBuf,
    baseline_branch: String,
    pull: bool,
}

impl PatchPipeline {
    pub fn new(
        config: &PatchbotConfig,
        resolver: Arc<dyn ThreadResolver>,
        source: Arc<dyn PatchSource>,
    ) -> Self {
        Self {
            resolver,
            source,
            repo: GitRepo::new(&config.git.repo),
            publisher: BranchPublisher::new(config),
            patches_root: config.paths.patches.clone(),
            baseline_branch: config.git.baseline_branch.clone(),
            pull: config.git.pull,
        }
    }

    async fn resolve(&self, submission: &Submission) -> Result<PatchMessage, AttemptError> {
        let thread_url = self
            .resolver
            .thread_url(&submission.key)
            .await?
            .ok_or(AttemptError::NoThread)?;
        debug!(thread_url = %thread_url, "Resolved thread");

        let message = self
            .resolver
            .latest_patch_message(&thread_url)
            .await?
            .ok_or(AttemptError::NoAttachments)?;
        check_attachment_set(&message.attachments)?;
        Ok(message)
    }

    /// Advance the attempt by one state.
    async fn step(
        &self,
        state: AttemptState,
        submission: &Submission,
        workdir: &WorkDir,
        log: &mut AttemptLog,
    ) -> Result<AttemptState, AttemptError> {
        let next = match state {
            AttemptState::Resolving => {
                let message = self.resolve(submission).await?;
                log.line(&format!(
                    "message {} with {} attachment(s)",
                    message.message_id,
                    message.attachments.len()
                ))
                .await?;
                AttemptState::Fetching { message }
            }
            AttemptState::Fetching { message } => {
                let files = fetch_attachments(
                    self.source.as_ref(),
                    &message.attachments,
                    &workdir.files_dir(),
                )
                .await?;
                for file in &files {
                    log.artifact(&file.name, &file.digest).await?;
                }
                AttemptState::Extracting { message, files }
            }
            AttemptState::Extracting { message, files } => {
                for file in &files {
                    extract(file, &workdir.files_dir()).await?;
                }
                AttemptState::Ordering { message }
            }
            AttemptState::Ordering { message } => {
                let patches = collect_patches(&workdir.files_dir()).await?;
                if patches.is_empty() {
                    return Err(AttemptError::NoAttachments);
                }
                AttemptState::Applying { message, patches }
            }
            AttemptState::Applying { message, patches } => {
                let baseline_commit = self
                    .repo
                    .reset_to_baseline(&self.baseline_branch, self.pull)
                    .await?;
                log.header(&baseline_commit, Utc::now()).await?;
                self.repo
                    .checkout_fresh_branch(&submission.key.branch_name())
                    .await?;

                let applied = apply_patches(&self.repo, workdir, &patches, log).await?;
                AttemptState::Committing {
                    message,
                    baseline_commit,
                    patches: applied.len(),
                }
            }
            AttemptState::Committing {
                message,
                baseline_commit,
                patches,
            } => {
                self.publisher
                    .commit_provenance(
                        &self.repo,
                        workdir,
                        submission,
                        &message.message_id,
                        &baseline_commit,
                    )
                    .await?;

                let branch = submission.key.branch_name();
                let pushed = self.publisher.push(&self.repo, &branch, log).await?;
                AttemptState::Done(Published {
                    branch,
                    message_id: message.message_id,
                    baseline_commit,
                    patches,
                    pushed,
                })
            }
            terminal @ (AttemptState::Done(_) | AttemptState::Failed(_)) => terminal,
        };
        Ok(next)
    }

    async fn drive(
        &self,
        submission: &Submission,
        workdir: &WorkDir,
        log: &mut AttemptLog,
    ) -> Result<Published, AttemptError> {
        let mut state = AttemptState::Resolving;
        loop {
            state = match state {
                AttemptState::Done(published) => return Ok(published),
                AttemptState::Failed(e) => return Err(e),
                current => {
                    debug!(key = %submission.key, state = current.name(), "Attempt step");
                    self.step(current, submission, workdir, log)
                        .await
                        .unwrap_or_else(AttemptState::Failed)
                }
            };
        }
    }
}

#[async_trait]
impl Pipeline for PatchPipeline {
    async fn run(&self, submission: &Submission) -> Result<Published, AttemptError> {
        let workdir = WorkDir::new(&self.patches_root, &submission.key)?;
        workdir.prepare().await?;
        let mut log = workdir.open_log().await?;
        log.line(&format!(
            "=== Attempt for {} started at {} ===",
            submission.key,
            Utc::now().to_rfc3339()
        ))
        .await?;

        let result = self.drive(submission, &workdir, &mut log).await;

        // The outcome line is best effort; the attempt's result stands.
        let summary = match &result {
            Ok(published) if published.pushed => format!("=== Pushed {} ===", published.branch),
            Ok(published) => format!("=== Built {} (not pushed) ===", published.branch),
            Err(e) => format!("=== Failed ({}): {} ===", e.kind(), e),
        };
        if let Err(e) = log.line(&summary).await {
            warn!(error = %e, "Could not write attempt log");
        }

        match &result {
            Ok(published) => info!(
                key = %submission.key,
                branch = %published.branch,
                message_id = %published.message_id,
                patches = published.patches,
                pushed = published.pushed,
                "Attempt succeeded"
            ),
            Err(e) => warn!(key = %submission.key, kind = e.kind(), error = %e, "Attempt failed"),
        }
        result
    }
}

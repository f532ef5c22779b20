//! Provenance commit and branch push.

use patchbot_config::{CommitfestConfig, PatchbotConfig, ProvenanceContext};
use patchbot_core::submission::format_authors;
use patchbot_core::{AttemptError, Submission};
use tracing::info;

use crate::workdir::{AttemptLog, WorkDir};
use crate::GitRepo;

/// Finishes a branch whose patches all applied.
#[derive(Debug, Clone)]
pub struct BranchPublisher {
    commitfest: CommitfestConfig,
    template: String,
    baseline_branch: String,
    remote: Option<String>,
    ssh_command: String,
}

impl BranchPublisher {
    pub fn new(config: &PatchbotConfig) -> Self {
        Self {
            commitfest: config.commitfest.clone(),
            template: config.provenance_template.clone(),
            baseline_branch: config.git.baseline_branch.clone(),
            remote: config.git.remote.clone(),
            ssh_command: config.git.ssh_command.clone(),
        }
    }

    /// Remote branches are pushed to, if any.
    pub fn remote(&self) -> Option<&str> {
        self.remote.as_deref()
    }

    pub fn provenance_message(
        &self,
        submission: &Submission,
        message_id: &str,
        baseline_commit: &str,
    ) -> String {
        let ctx = ProvenanceContext {
            commitfest_id: submission.key.commitfest_id.to_string(),
            submission_id: submission.key.submission_id.to_string(),
            submission_title: submission.title.clone(),
            submission_url: self.commitfest.submission_url(&submission.key),
            message_id: message_id.to_string(),
            message_url: self.commitfest.message_url(message_id),
            authors: format_authors(&submission.authors),
            base_commit: baseline_commit.to_string(),
            base_branch: self.baseline_branch.clone(),
        };
        ctx.render(&self.template)
    }

    /// Commit everything staged, plus the provenance message, on top of the
    /// applied patches. The commit is created even when nothing is staged.
    pub async fn commit_provenance(
        &self,
        repo: &GitRepo,
        workdir: &WorkDir,
        submission: &Submission,
        message_id: &str,
        baseline_commit: &str,
    ) -> Result<(), AttemptError> {
        let message = self.provenance_message(submission, message_id, baseline_commit);
        let path = workdir.provenance_path();
        tokio::fs::write(&path, message).await?;
        repo.commit_allow_empty(&path).await?;
        Ok(())
    }

    /// Force-push the branch. Returns false without doing anything when no
    /// remote is configured.
    pub async fn push(
        &self,
        repo: &GitRepo,
        branch: &str,
        log: &mut AttemptLog,
    ) -> Result<bool, AttemptError> {
        let Some(remote) = self.remote.as_deref() else {
            return Ok(false);
        };

        info!(branch = %branch, remote = %remote, "Pushing branch");
        let output = repo.force_push(remote, branch, &self.ssh_command).await?;
        log.command(&output).await?;
        if !output.success {
            return Err(AttemptError::Push {
                message: output.combined().trim().to_string(),
            });
        }
        Ok(true)
    }
}

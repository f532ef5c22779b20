//! Git command wrapper.
//!
//! Every operation runs the `git` binary in the checkout. Commands whose
//! failure is an expected outcome (applying a patch, pushing) return the
//! raw [`GitOutput`]; the rest fail with [`GitError::Command`].

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info};

use crate::{GitError, GitResult};

/// Captured result of one git invocation.
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub success: bool,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    fn from_output(output: Output) -> Self {
        Self {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }

    /// stdout followed by stderr, as a terminal would show them.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }
}

/// What `git mailinfo` found in a patch file.
#[derive(Debug, Clone)]
pub struct MailInfo {
    /// Header summary printed by mailinfo (author, subject, date).
    pub headers: String,
    /// Size of the extracted commit message.
    pub message_len: u64,
}

impl MailInfo {
    /// No headers and no message: a plain diff, not a `format-patch` mail.
    pub fn is_raw_diff(&self) -> bool {
        self.headers.trim().is_empty() && self.message_len == 0
    }
}

/// A local git checkout.
#[derive(Debug, Clone)]
pub struct GitRepo {
    path: PathBuf,
}

impl GitRepo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    async fn output(mut cmd: Command) -> GitResult<GitOutput> {
        let output = cmd.output().await?;
        Ok(GitOutput::from_output(output))
    }

    /// Run a command and return its output whatever the exit status.
    pub async fn run<I, S>(&self, args: I) -> GitResult<GitOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Self::output(self.command(args)).await
    }

    /// Run a command that is expected to succeed; returns its stdout.
    pub async fn check(&self, args: &[&str]) -> GitResult<String> {
        debug!(repo = %self.path.display(), args = ?args, "git");
        let output = self.run(args).await?;
        if !output.success {
            return Err(GitError::Command {
                command: args.join(" "),
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    /// Full id of the commit checked out.
    pub async fn head_commit(&self) -> GitResult<String> {
        let stdout = self.check(&["rev-parse", "HEAD"]).await?;
        let commit = stdout.trim();
        if commit.len() < 40 || !commit.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(GitError::Output {
                command: "rev-parse HEAD".to_string(),
                output: stdout,
            });
        }
        Ok(commit.to_string())
    }

    /// Throw away whatever the previous attempt left behind and check out
    /// the tip of `baseline`, pulling it first if asked to.
    ///
    /// Returns the baseline commit id.
    pub async fn reset_to_baseline(&self, baseline: &str, pull: bool) -> GitResult<String> {
        // Only fails when no am session is in progress.
        self.run(["am", "--abort"]).await?;
        self.check(&["reset", "-q", "--hard"]).await?;
        self.check(&["clean", "-q", "-fdx"]).await?;
        self.check(&["checkout", "-q", "-f", baseline]).await?;
        if pull {
            self.check(&["pull", "-q", "--ff-only"]).await?;
        }

        let commit = self.head_commit().await?;
        info!(baseline = %baseline, commit = %commit, "Reset checkout to baseline");
        Ok(commit)
    }

    /// Create or reset `branch` at the current commit and check it out.
    pub async fn checkout_fresh_branch(&self, branch: &str) -> GitResult<()> {
        self.check(&["checkout", "-q", "-f", "-B", branch]).await?;
        Ok(())
    }

    /// Split a patch file with `git mailinfo`, writing the commit message to
    /// `msg` and the diff to `patch`.
    pub async fn mailinfo(&self, file: &Path, msg: &Path, patch: &Path) -> GitResult<MailInfo> {
        let input = tokio::fs::File::open(file).await?.into_std().await;
        let mut cmd = self.command([OsStr::new("mailinfo"), msg.as_os_str(), patch.as_os_str()]);
        cmd.stdin(Stdio::from(input));
        let output = Self::output(cmd).await?;
        if !output.success {
            return Err(GitError::Command {
                command: "mailinfo".to_string(),
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            });
        }

        let message_len = tokio::fs::metadata(msg).await?.len();
        Ok(MailInfo {
            headers: output.stdout,
            message_len,
        })
    }

    /// Apply a plain diff to the index and worktree without committing.
    pub async fn apply_to_index(&self, patch: &Path) -> GitResult<GitOutput> {
        self.run([OsStr::new("apply"), OsStr::new("--index"), patch.as_os_str()])
            .await
    }

    /// Apply a mailbox patch as one commit, keeping its author and message.
    pub async fn apply_mailbox(&self, file: &Path) -> GitResult<GitOutput> {
        self.run([
            OsStr::new("am"),
            OsStr::new("--patch-format=mbox"),
            file.as_os_str(),
        ])
        .await
    }

    /// Give up on a failed `git am`, leaving the branch at the last commit
    /// that applied.
    pub async fn abort_mailbox(&self) -> GitResult<()> {
        self.run(["am", "--abort"]).await?;
        Ok(())
    }

    /// Commit the index with the message in `message_file`, even if nothing
    /// changed.
    pub async fn commit_allow_empty(&self, message_file: &Path) -> GitResult<()> {
        let output = self
            .run([
                OsStr::new("commit"),
                OsStr::new("--allow-empty"),
                OsStr::new("-q"),
                OsStr::new("-F"),
                message_file.as_os_str(),
            ])
            .await?;
        if !output.success {
            let stderr = output.combined().trim().to_string();
            return Err(GitError::Command {
                command: "commit --allow-empty".to_string(),
                status: output.status,
                stderr,
            });
        }
        Ok(())
    }

    /// Force-push `branch` to `remote`.
    pub async fn force_push(
        &self,
        remote: &str,
        branch: &str,
        ssh_command: &str,
    ) -> GitResult<GitOutput> {
        let mut cmd = self.command(["push", "-q", "-f", remote, branch]);
        cmd.env("GIT_SSH_COMMAND", ssh_command);
        Self::output(cmd).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_diff_classification() {
        let raw = MailInfo {
            headers: "\n".to_string(),
            message_len: 0,
        };
        assert!(raw.is_raw_diff());

        let mail = MailInfo {
            headers: "Author: Jane Doe\nEmail: jane@example.org\nSubject: Fix it\n\n".to_string(),
            message_len: 12,
        };
        assert!(!mail.is_raw_diff());

        let headers_only = MailInfo {
            headers: "Subject: Fix it\n".to_string(),
            message_len: 0,
        };
        assert!(!headers_only.is_raw_diff());
    }

    #[test]
    fn test_combined_output() {
        let output = GitOutput {
            success: false,
            status: "exit status: 1".to_string(),
            stdout: "Applying: Fix it".to_string(),
            stderr: "error: patch failed\n".to_string(),
        };
        assert_eq!(output.combined(), "Applying: Fix it\nerror: patch failed\n");
    }

    async fn empty_repo(dir: &Path) -> GitRepo {
        let repo = GitRepo::new(dir);
        repo.check(&["init", "-q"]).await.unwrap();
        repo.check(&["config", "user.name", "Patch Bot"]).await.unwrap();
        repo.check(&["config", "user.email", "bot@example.org"])
            .await
            .unwrap();
        repo
    }

    #[tokio::test]
    async fn test_commit_allow_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = empty_repo(tmp.path()).await;
        let message = tmp.path().join("msg");
        std::fs::write(&message, "Provenance\n").unwrap();

        repo.commit_allow_empty(&message).await.unwrap();

        let subject = repo.check(&["log", "-1", "--format=%s"]).await.unwrap();
        assert_eq!(subject.trim(), "Provenance");
    }

    #[tokio::test]
    async fn test_commit_allow_empty_reports_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = empty_repo(tmp.path()).await;

        let err = repo
            .commit_allow_empty(&tmp.path().join("no-such-message"))
            .await
            .unwrap_err();
        match err {
            GitError::Command {
                command, stderr, ..
            } => {
                assert_eq!(command, "commit --allow-empty");
                assert!(!stderr.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

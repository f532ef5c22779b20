//! Per-submission working directory.
//!
//! Layout under the patches root:
//!
//! ```text
//! <commitfest_id>/<submission_id>/
//!     patch.log         append-only, one section per attempt
//!     files/            downloads and extracted patches, wiped per attempt
//!     msg, patch        scratch output of `git mailinfo`
//!     provenance.txt    message of the last provenance commit
//! ```

use chrono::{DateTime, Utc};
use patchbot_core::SubmissionKey;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::GitOutput;

#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    /// The root is made absolute against the process working directory:
    /// git runs inside the checkout and is handed paths under it.
    pub fn new(patches_root: &Path, key: &SubmissionKey) -> std::io::Result<Self> {
        Ok(Self {
            root: std::path::absolute(patches_root)?
                .join(key.commitfest_id.to_string())
                .join(key.submission_id.to_string()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join("patch.log")
    }

    pub fn message_path(&self) -> PathBuf {
        self.root.join("msg")
    }

    pub fn patch_path(&self) -> PathBuf {
        self.root.join("patch")
    }

    pub fn provenance_path(&self) -> PathBuf {
        self.root.join("provenance.txt")
    }

    /// Create the directory and empty `files/`. The log is kept.
    pub async fn prepare(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let files = self.files_dir();
        match tokio::fs::remove_dir_all(&files).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        tokio::fs::create_dir_all(&files).await
    }

    pub async fn open_log(&self) -> std::io::Result<AttemptLog> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
            .await?;
        Ok(AttemptLog { file })
    }
}

/// Writer for one attempt's section of `patch.log`.
pub struct AttemptLog {
    file: File,
}

impl AttemptLog {
    pub async fn line(&mut self, text: &str) -> std::io::Result<()> {
        self.file.write_all(text.as_bytes()).await?;
        if !text.ends_with('\n') {
            self.file.write_all(b"\n").await?;
        }
        self.file.flush().await
    }

    pub async fn header(&mut self, baseline_commit: &str, at: DateTime<Utc>) -> std::io::Result<()> {
        self.line(&format!(
            "=== Applying patches on top of commit {} at {} ===",
            baseline_commit,
            at.to_rfc3339()
        ))
        .await
    }

    pub async fn artifact(&mut self, name: &str, digest: &str) -> std::io::Result<()> {
        self.line(&format!("fetched {} sha256:{}", name, digest)).await
    }

    pub async fn command(&mut self, output: &GitOutput) -> std::io::Result<()> {
        let text = output.combined();
        if text.is_empty() {
            return Ok(());
        }
        self.line(&text).await
    }
}

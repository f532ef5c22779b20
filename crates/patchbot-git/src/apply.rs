//! Applying an ordered patch list to the checked-out branch.

use derive_more::Display;
use patchbot_core::AttemptError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::workdir::{AttemptLog, WorkDir};
use crate::{GitOutput, GitRepo};

/// How a patch file was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PatchKind {
    /// Plain diff staged in the index; committed later by the provenance
    /// commit.
    #[display("raw diff")]
    RawDiff,
    /// `format-patch` mail applied as its own commit.
    #[display("mailbox")]
    Mailbox,
}

#[derive(Debug, Clone)]
pub struct AppliedPatch {
    pub file: String,
    pub kind: PatchKind,
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Last non-empty line of the command output, which is where git puts the
/// reason.
fn failure_reason(output: &GitOutput) -> String {
    output
        .combined()
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or(&output.status)
        .to_string()
}

/// Apply `patches` in order, stopping at the first one that fails.
///
/// On failure the branch holds exactly the commits of the patches before
/// the failing one; an interrupted `git am` is aborted.
pub async fn apply_patches(
    repo: &GitRepo,
    workdir: &WorkDir,
    patches: &[PathBuf],
    log: &mut AttemptLog,
) -> Result<Vec<AppliedPatch>, AttemptError> {
    let mut applied = Vec::with_capacity(patches.len());

    for (index, path) in patches.iter().enumerate() {
        let file = display_name(path);
        let apply_error = |message: String| AttemptError::Apply {
            index,
            file: file.clone(),
            message,
        };

        let info = repo
            .mailinfo(path, &workdir.message_path(), &workdir.patch_path())
            .await
            .map_err(|e| apply_error(e.to_string()))?;

        let kind = if info.is_raw_diff() {
            PatchKind::RawDiff
        } else {
            PatchKind::Mailbox
        };
        log.line(&format!("--- {} ({})", file, kind)).await?;

        let output = match kind {
            PatchKind::RawDiff => repo.apply_to_index(&workdir.patch_path()).await,
            PatchKind::Mailbox => repo.apply_mailbox(path).await,
        }
        .map_err(|e| apply_error(e.to_string()))?;
        log.command(&output).await?;

        if !output.success {
            warn!(file = %file, index, kind = %kind, "Patch does not apply");
            if kind == PatchKind::Mailbox {
                repo.abort_mailbox().await?;
            }
            return Err(apply_error(failure_reason(&output)));
        }

        debug!(file = %file, kind = %kind, "Applied patch");
        applied.push(AppliedPatch { file, kind });
    }

    Ok(applied)
}

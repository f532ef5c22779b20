//! Archive extraction and patch discovery.

use patchbot_core::AttemptError;
use patchbot_core::attachment::{ArchiveFormat, is_patch_file};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::fetch::FetchedFile;

fn extract_command(format: ArchiveFormat, name: &str) -> Command {
    let (program, args): (&str, &[&str]) = match format {
        ArchiveFormat::TarGz => ("tar", &["xzf"]),
        ArchiveFormat::TarBz2 => ("tar", &["xjf"]),
        ArchiveFormat::Zip => ("unzip", &["-o", "-q"]),
        ArchiveFormat::Gzip => ("gunzip", &["-f"]),
    };
    let mut cmd = Command::new(program);
    cmd.args(args).arg(name);
    cmd
}

/// Decompress `file` inside `dir` if it is an archive. Plain files are left
/// alone.
pub async fn extract(file: &FetchedFile, dir: &Path) -> Result<(), AttemptError> {
    let Some(format) = ArchiveFormat::from_name(&file.name) else {
        return Ok(());
    };

    debug!(file = %file.name, format = ?format, "Extracting");
    let output = extract_command(format, &file.name)
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| AttemptError::Extract {
            file: file.name.clone(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(AttemptError::Extract {
            file: file.name.clone(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// All `.patch` and `.diff` files under `dir`, sorted by file name.
///
/// Hidden files and directories are skipped. Senders number their patches
/// (`0001-`, `0002-`, ...), so the name order is the application order.
pub async fn collect_patches(dir: &Path) -> Result<Vec<PathBuf>, AttemptError> {
    let mut patches = Vec::new();
    walk(dir, &mut patches).await?;
    patches.sort_by(|a, b| a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b)));
    Ok(patches)
}

#[async_recursion::async_recursion]
async fn walk(dir: &Path, patches: &mut Vec<PathBuf>) -> Result<(), AttemptError> {
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if file_name.starts_with('.') {
            continue;
        }

        let file_type = entry.file_type().await?;
        if file_type.is_dir() {
            walk(&path, patches).await?;
        } else if file_type.is_file() && is_patch_file(&file_name) {
            patches.push(path);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_sorts_by_name_across_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        tokio::fs::create_dir_all(root.join("v3")).await.unwrap();
        tokio::fs::create_dir_all(root.join(".hidden")).await.unwrap();
        for path in [
            "0002-b.patch",
            "v3/0001-a.patch",
            "v3/0003-c.diff",
            "README",
            ".hidden/0000-x.patch",
            "notes.patch.orig",
        ] {
            tokio::fs::write(root.join(path), b"").await.unwrap();
        }

        let patches = collect_patches(root).await.unwrap();
        let names: Vec<_> = patches
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["0001-a.patch", "0002-b.patch", "0003-c.diff"]);
    }

    #[tokio::test]
    async fn test_plain_patch_is_not_extracted() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("0001-a.patch");
        tokio::fs::write(&path, b"diff").await.unwrap();
        let file = FetchedFile {
            url: "https://a.org/0001-a.patch".to_string(),
            name: "0001-a.patch".to_string(),
            path,
            digest: String::new(),
        };
        extract(&file, tmp.path()).await.unwrap();
        assert!(tmp.path().join("0001-a.patch").exists());
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_an_extract_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("v1.tar.gz");
        tokio::fs::write(&path, b"not a tarball").await.unwrap();
        let file = FetchedFile {
            url: "https://a.org/v1.tar.gz".to_string(),
            name: "v1.tar.gz".to_string(),
            path,
            digest: String::new(),
        };
        let err = extract(&file, tmp.path()).await.unwrap_err();
        assert_eq!(err.kind(), "extract");
    }
}

//! Attachment classification.
//!
//! Names are matched case-sensitively on their suffix, the way the mail
//! archive presents them.

use crate::AttemptError;

/// Compression or archive format recognized by file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    TarBz2,
    Zip,
    /// A single gzip-compressed file such as `foo.patch.gz`.
    Gzip,
}

impl ArchiveFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if name.ends_with(".tar.bz2") {
            Some(ArchiveFormat::TarBz2)
        } else if name.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if name.ends_with(".gz") {
            Some(ArchiveFormat::Gzip)
        } else {
            None
        }
    }

    /// Whether the archive can hold more than one patch file.
    pub fn is_multi_file(&self) -> bool {
        !matches!(self, ArchiveFormat::Gzip)
    }
}

/// Whether a file name denotes a patch to apply.
pub fn is_patch_file(name: &str) -> bool {
    name.ends_with(".patch") || name.ends_with(".diff")
}

/// Last path segment of an attachment URL, ignoring query and fragment.
pub fn attachment_file_name(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next()?;
    if name.is_empty() || name.starts_with('.') {
        None
    } else {
        Some(name)
    }
}

/// Validate the attachment set chosen for one message.
///
/// A multi-file archive can only be combined with nothing else: there is
/// no way to know how its contents should be ordered against loose patches.
pub fn check_attachment_set(attachments: &[String]) -> Result<(), AttemptError> {
    if attachments.is_empty() {
        return Err(AttemptError::NoAttachments);
    }

    let has_archive = attachments.iter().any(|url| {
        attachment_file_name(url)
            .and_then(ArchiveFormat::from_name)
            .is_some_and(|format| format.is_multi_file())
    });

    if has_archive && attachments.len() > 1 {
        return Err(AttemptError::AmbiguousAttachments {
            count: attachments.len(),
        });
    }

    Ok(())
}

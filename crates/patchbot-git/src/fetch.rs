//! Attachment download.

use patchbot_core::AttemptError;
use patchbot_core::attachment::attachment_file_name;
use patchbot_core::resolver::PatchSource;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One downloaded attachment.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub url: String,
    pub name: String,
    pub path: PathBuf,
    /// Hex SHA-256 of the bytes as downloaded.
    pub digest: String,
}

/// Local file name for an attachment URL.
pub fn local_name(url: &str) -> Result<&str, AttemptError> {
    attachment_file_name(url)
        .filter(|name| !name.contains(['/', '\\']))
        .ok_or_else(|| AttemptError::Fetch {
            url: url.to_string(),
            message: "attachment URL has no usable file name".to_string(),
        })
}

/// Download every attachment into `dir`, byte for byte, in order.
pub async fn fetch_attachments(
    source: &dyn PatchSource,
    urls: &[String],
    dir: &Path,
) -> Result<Vec<FetchedFile>, AttemptError> {
    let mut fetched = Vec::with_capacity(urls.len());

    for url in urls {
        let name = local_name(url)?.to_string();
        let body = source.fetch(url).await?;
        let path = dir.join(&name);
        tokio::fs::write(&path, &body).await?;

        let digest = hex::encode(Sha256::digest(&body));
        debug!(url = %url, bytes = body.len(), "Fetched attachment");
        fetched.push(FetchedFile {
            url: url.clone(),
            name,
            path,
            digest,
        });
    }

    Ok(fetched)
}

//! HTTP client for the Commitfest app and mail archive.

use async_trait::async_trait;
use bytes::Bytes;
use patchbot_config::{CommitfestConfig, HttpConfig};
use patchbot_core::resolver::{PatchMessage, PatchSource, SubmissionLister, ThreadResolver};
use patchbot_core::{AttemptError, CommitfestId, SubmissionKey, SubmissionListing};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::scrape;
use crate::{CommitfestError, CommitfestResult};

/// Scraping client.
///
/// Every request sleeps the configured pace first, so a tick that resolves,
/// lists and downloads stays slow enough for the public sites.
pub struct CommitfestClient {
    client: reqwest::Client,
    config: CommitfestConfig,
    pace: Duration,
}

impl CommitfestClient {
    pub fn new(http: &HttpConfig, config: CommitfestConfig) -> CommitfestResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(http.user_agent.clone())
            .timeout(http.timeout)
            .build()
            .map_err(|e| CommitfestError::Request {
                url: config.url.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            config,
            pace: http.pace,
        })
    }

    async fn get(&self, url: &str) -> CommitfestResult<reqwest::Response> {
        if !self.pace.is_zero() {
            tokio::time::sleep(self.pace).await;
        }
        debug!(url = %url, "Fetching");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CommitfestError::request(url, e))?;

        if !response.status().is_success() {
            return Err(CommitfestError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(response)
    }

    async fn get_text(&self, url: &str) -> CommitfestResult<String> {
        self.get(url)
            .await?
            .text()
            .await
            .map_err(|e| CommitfestError::request(url, e))
    }

    /// Make an archive link absolute.
    fn archive_link(&self, href: &str) -> CommitfestResult<String> {
        let base = Url::parse(&self.config.archive_url)
            .map_err(|e| CommitfestError::Parse(format!("archive url: {}", e)))?;
        let joined = base
            .join(href)
            .map_err(|e| CommitfestError::Parse(format!("attachment link {}: {}", href, e)))?;
        Ok(joined.to_string())
    }
}

#[async_trait]
impl ThreadResolver for CommitfestClient {
    async fn thread_url(&self, key: &SubmissionKey) -> Result<Option<String>, AttemptError> {
        let page = self.get_text(&self.config.submission_url(key)).await?;
        Ok(scrape::parse_latest_thread(&page).map(|id| self.config.thread_url(&id)))
    }

    async fn latest_patch_message(
        &self,
        thread_url: &str,
    ) -> Result<Option<PatchMessage>, AttemptError> {
        let page = self.get_text(thread_url).await?;
        let Some(mut message) = scrape::parse_latest_patch_message(&page) else {
            return Ok(None);
        };

        message.attachments = message
            .attachments
            .iter()
            .map(|href| self.archive_link(href))
            .collect::<CommitfestResult<_>>()?;

        debug!(
            message_id = %message.message_id,
            attachments = message.attachments.len(),
            "Resolved latest patch message"
        );
        Ok(Some(message))
    }
}

#[async_trait]
impl PatchSource for CommitfestClient {
    async fn fetch(&self, url: &str) -> Result<Bytes, AttemptError> {
        let body = self
            .get(url)
            .await?
            .bytes()
            .await
            .map_err(|e| CommitfestError::request(url, e))?;
        Ok(body)
    }
}

#[async_trait]
impl SubmissionLister for CommitfestClient {
    async fn current_commitfest(&self) -> patchbot_core::Result<CommitfestId> {
        let page = self.get_text(&self.config.url).await?;
        let id = scrape::parse_current_commitfest(&page).ok_or_else(|| {
            patchbot_core::Error::NotFound("no open or in-progress commitfest".to_string())
        })?;
        info!(commitfest_id = %id, "Current commitfest");
        Ok(id)
    }

    async fn list_submissions(
        &self,
        commitfest_id: CommitfestId,
    ) -> patchbot_core::Result<Vec<SubmissionListing>> {
        let url = format!("{}/{}/", self.config.url.trim_end_matches('/'), commitfest_id);
        let page = self.get_text(&url).await?;
        let listings = scrape::parse_listing(&page);
        info!(
            commitfest_id = %commitfest_id,
            submissions = listings.len(),
            "Scraped commitfest listing"
        );
        Ok(listings)
    }
}

//! CLI command implementations.

pub mod branch;
pub mod schedule;

use anyhow::{Context, Result};
use patchbot_commitfest::CommitfestClient;
use patchbot_config::{PatchbotConfig, load_config};
use patchbot_core::CommitfestId;
use patchbot_db::{PgBranchRepo, PgPool, PgSubmissionRepo, create_pool, run_migrations};
use patchbot_scheduler::ListingSync;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Loaded configuration plus the resolved database URL.
pub struct App {
    pub config: PatchbotConfig,
    database_url: Option<String>,
}

impl App {
    pub fn load(path: &Path, database_url: Option<String>) -> Result<Self> {
        let config = if path.exists() {
            load_config(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?
        } else {
            warn!(path = %path.display(), "Config file not found, using defaults");
            PatchbotConfig::default()
        };
        let database_url = database_url.or_else(|| config.database_url.clone());
        Ok(Self {
            config,
            database_url,
        })
    }

    pub async fn pool(&self) -> Result<PgPool> {
        let url = self
            .database_url
            .as_deref()
            .context("No database configured; set DATABASE_URL or database.url")?;
        info!("Connecting to database...");
        let pool = create_pool(url)
            .await
            .context("Failed to connect to database")?;
        Ok(pool)
    }

    pub fn commitfest(&self) -> Result<Arc<CommitfestClient>> {
        let client = CommitfestClient::new(&self.config.http, self.config.commitfest.clone())
            .context("Failed to build HTTP client")?;
        Ok(Arc::new(client))
    }

    pub async fn repos(&self) -> Result<(Arc<PgSubmissionRepo>, Arc<PgBranchRepo>)> {
        let pool = self.pool().await?;
        Ok((
            Arc::new(PgSubmissionRepo::new(pool.clone())),
            Arc::new(PgBranchRepo::new(pool)),
        ))
    }
}

/// Scrape a commitfest listing into the store.
pub async fn sync(app: &App, commitfest: Option<i32>) -> Result<()> {
    let (submissions, _) = app.repos().await?;
    let client = app.commitfest()?;
    let sync = ListingSync::new(client.clone(), client, submissions);

    let report = sync
        .sync(commitfest.map(CommitfestId))
        .await
        .context("Listing sync failed")?;
    println!(
        "Commitfest {}: {} listed, {} changed, {} resolved, {} unresolved",
        report.commitfest_id, report.listed, report.changed, report.resolved, report.unresolved
    );
    Ok(())
}

pub async fn migrate(app: &App) -> Result<()> {
    let pool = app.pool().await?;
    run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;
    println!("Migrations applied");
    Ok(())
}

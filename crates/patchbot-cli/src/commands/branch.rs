//! Branch tracking commands.

use anyhow::{Context, Result};
use chrono::Utc;
use patchbot_core::branch::BranchStatus;
use patchbot_db::BranchRepo;

use super::App;

pub async fn list(app: &App, limit: i64, json: bool) -> Result<()> {
    let (_, branches) = app.repos().await?;
    let records = branches
        .list_recent(limit)
        .await
        .context("Failed to list branches")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No branches recorded");
        return Ok(());
    }
    for record in records {
        println!(
            "{}  {:<22}  {:<12}  {}  {}",
            record.id,
            record.name,
            record.status,
            record.created_at.format("%Y-%m-%d %H:%M"),
            record
                .error_kind
                .as_deref()
                .or(record.commit_id.as_deref())
                .unwrap_or("-"),
        );
    }
    Ok(())
}

/// Only CI results can be reported from outside.
pub async fn set_status(app: &App, id: uuid::Uuid, status: &str) -> Result<()> {
    let status: BranchStatus = status.parse()?;
    if !matches!(
        status,
        BranchStatus::Testing | BranchStatus::Success | BranchStatus::Failure
    ) {
        anyhow::bail!("Status must be one of testing, success, failure");
    }

    let (_, branches) = app.repos().await?;
    let record = branches
        .set_status(id, status, Utc::now())
        .await
        .with_context(|| format!("Failed to update branch {}", id))?;
    println!("{} is now {}", record.name, record.status);
    Ok(())
}

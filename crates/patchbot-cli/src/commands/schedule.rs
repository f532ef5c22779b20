//! Scheduler commands.

use anyhow::{Context, Result};
use chrono::Utc;
use patchbot_git::PatchPipeline;
use patchbot_scheduler::{Scheduler, TickOutcome, TickRunner, Worker};
use std::sync::Arc;
use tracing::warn;

use super::App;

fn resolve_worker_id(given: Option<String>) -> String {
    given.unwrap_or_else(|| format!("patchbot-{}", uuid::Uuid::now_v7()))
}

async fn runner(app: &App, worker_id: &str) -> Result<TickRunner> {
    let (submissions, branches) = app.repos().await?;
    let client = app.commitfest()?;
    let pipeline = PatchPipeline::new(&app.config, client.clone(), client);

    Ok(TickRunner::new(
        &app.config.scheduler,
        submissions,
        branches,
        Arc::new(pipeline),
        worker_id,
    ))
}

/// Run one tick and print what it did.
pub async fn tick(app: &App, worker_id: Option<String>) -> Result<()> {
    let runner = runner(app, &resolve_worker_id(worker_id)).await?;
    let outcome = runner.tick().await.context("Tick failed")?;
    println!("{}", outcome);

    if let TickOutcome::Failed { .. } = outcome {
        anyhow::bail!("Attempt failed");
    }
    Ok(())
}

/// Tick until Ctrl-C.
pub async fn run(app: &App, worker_id: Option<String>) -> Result<()> {
    let id = resolve_worker_id(worker_id);
    let runner = runner(app, &id).await?;
    let worker = Worker::new(id, Arc::new(runner), app.config.scheduler.tick_interval);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let ticks = worker.run_until(shutdown).await;
    println!("Stopped after {} tick(s)", ticks);
    Ok(())
}

/// Print the scheduler's choice without claiming anything.
pub async fn select(app: &App) -> Result<()> {
    let (submissions, branches) = app.repos().await?;
    let scheduler = Scheduler::new(&app.config.scheduler, submissions, branches);
    let decision = scheduler
        .decide(Utc::now())
        .await
        .context("Selection failed")?;
    println!("{}", decision);
    Ok(())
}

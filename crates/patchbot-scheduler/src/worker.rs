//! Worker that runs ticks until shut down.

use crate::tick::TickRunner;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// A worker that ticks on a fixed interval.
pub struct Worker {
    id: String,
    runner: Arc<TickRunner>,
    interval: Duration,
}

impl Worker {
    pub fn new(id: impl Into<String>, runner: Arc<TickRunner>, interval: Duration) -> Self {
        Self {
            id: id.into(),
            runner,
            interval,
        }
    }

    /// Run the worker loop until `shutdown` resolves. A tick in progress is
    /// always finished first. Returns the number of ticks run.
    pub async fn run_until<F>(&self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        info!(worker_id = %self.id, interval = ?self.interval, "Starting worker");
        tokio::pin!(shutdown);
        let mut ticks = 0;

        loop {
            match self.runner.tick().await {
                Ok(outcome) => info!(worker_id = %self.id, outcome = %outcome, "Tick finished"),
                Err(e) => warn!(worker_id = %self.id, error = %e, "Tick failed"),
            }
            ticks += 1;

            tokio::select! {
                _ = &mut shutdown => break,
                _ = sleep(self.interval) => {}
            }
        }

        info!(worker_id = %self.id, ticks, "Worker stopped");
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use patchbot_config::SchedulerConfig;
    use patchbot_core::{AttemptError, Submission};
    use patchbot_db::MemoryStore;
    use patchbot_git::{Pipeline, Published};

    struct NeverRuns;

    #[async_trait]
    impl Pipeline for NeverRuns {
        async fn run(&self, _submission: &Submission) -> Result<Published, AttemptError> {
            Err(AttemptError::NoThread)
        }
    }

    fn worker(interval: Duration) -> Worker {
        let store = Arc::new(MemoryStore::new());
        let runner = TickRunner::new(
            &SchedulerConfig::default(),
            store.clone(),
            store,
            Arc::new(NeverRuns),
            "worker-1",
        );
        Worker::new("worker-1", Arc::new(runner), interval)
    }

    #[tokio::test]
    async fn test_shutdown_after_first_tick() {
        let ticks = worker(Duration::from_secs(3600))
            .run_until(std::future::ready(()))
            .await;
        assert_eq!(ticks, 1);
    }

    #[tokio::test]
    async fn test_ticks_on_interval() {
        let shutdown = sleep(Duration::from_millis(250));
        let ticks = worker(Duration::from_millis(20)).run_until(shutdown).await;
        assert!(ticks >= 2, "only {ticks} tick(s)");
    }
}

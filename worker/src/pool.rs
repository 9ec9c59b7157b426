//! Worker pool.
//!
//! Each worker claims the oldest due job, runs it to completion and claims
//! again. Idle workers sleep for the poll interval. Shutdown is checked only
//! between jobs, so an attempt is never cut off mid-lookup.

use censo_scheduler::{JobQueue, QueueError};
use censo_validator::ValidationOrchestrator;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// A fixed number of workers pulling from one queue.
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    orchestrator: Arc<ValidationOrchestrator>,
    size: usize,
    poll_interval: Duration,
}

impl WorkerPool {
    /// Create a pool of `size` workers (at least one).
    pub fn new(
        queue: Arc<dyn JobQueue>,
        orchestrator: Arc<ValidationOrchestrator>,
        size: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            orchestrator,
            size: size.max(1),
            poll_interval,
        }
    }

    /// Run until `shutdown` is cancelled and every worker has finished its
    /// current job.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut workers = JoinSet::new();

        for worker_id in 0..self.size {
            let worker = Worker {
                id: worker_id,
                queue: self.queue.clone(),
                orchestrator: self.orchestrator.clone(),
                poll_interval: self.poll_interval,
            };
            workers.spawn(worker.run(shutdown.clone()));
        }
        tracing::info!(workers = self.size, "Worker pool started");

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                tracing::error!("Worker task panicked: {}", e);
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

struct Worker {
    id: usize,
    queue: Arc<dyn JobQueue>,
    orchestrator: Arc<ValidationOrchestrator>,
    poll_interval: Duration,
}

impl Worker {
    async fn run(self, shutdown: CancellationToken) {
        while !shutdown.is_cancelled() {
            let worked = match self.process_next().await {
                Ok(worked) => worked,
                Err(e) => {
                    tracing::error!(worker = self.id, "Job queue error: {}", e);
                    false
                }
            };

            if !worked {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }
        tracing::debug!(worker = self.id, "Worker exiting");
    }

    /// Claim and run one due job. Returns false when nothing was due.
    async fn process_next(&self) -> Result<bool, QueueError> {
        let Some(job) = self.queue.claim_next_due(Utc::now()).await? else {
            return Ok(false);
        };

        tracing::debug!(worker = self.id, job_id = job.id, name = %job.name, "Claimed job");

        match self.orchestrator.handle_job(&job).await {
            Ok(report) => {
                tracing::debug!(worker = self.id, job_id = job.id, ?report, "Job done");
                self.queue.complete(job.id).await?;
            }
            Err(e) => {
                tracing::error!(worker = self.id, job_id = job.id, "Job failed: {}", e);
                self.queue.fail(job.id, &e.to_string()).await?;
            }
        }

        Ok(true)
    }
}

/// Worker orchestrator
///
/// Polls the email job queue and runs the workflow step for each claimed
/// job.
///
/// # Architecture
///
/// ```text
/// Orchestrator
///   ├─> JobQueue: claim due jobs
///   ├─> User lookup: skip deleted and banned accounts
///   ├─> StepRegistry: step for the job kind
///   ├─> WorkflowStep: send (or skip) the email
///   └─> JobQueue: done, retry or failed
/// ```
///
/// # Concurrency
///
/// Jobs of one batch run concurrently. A batch always finishes before the
/// loop checks for shutdown, so cancellation never interrupts a send.
///
/// # Example
///
/// ```no_run
/// use keystone_worker::orchestrator::{Orchestrator, OrchestratorConfig};
/// use keystone_worker::queue::{JobQueue, RetryPolicy};
/// use keystone_worker::steps::{StepContext, StepRegistry};
/// use keystone_shared::email::LogEmailSender;
/// use sqlx::PgPool;
/// use std::sync::Arc;
///
/// # async fn example(pool: PgPool) -> anyhow::Result<()> {
/// let orchestrator = Orchestrator::new(
///     JobQueue::new(pool.clone(), RetryPolicy::default()),
///     StepRegistry::onboarding(),
///     StepContext::new(pool, Arc::new(LogEmailSender), "https://app.example.com"),
///     OrchestratorConfig::default(),
/// );
///
/// orchestrator.run().await?;
/// # Ok(())
/// # }
/// ```

use crate::queue::{FailureOutcome, JobQueue, QueueError};
use crate::steps::{StepContext, StepOutcome, StepRegistry};
use futures::future::join_all;
use keystone_shared::models::{email_job::EmailJob, user::User};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Worker orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Wait between polls when the queue is empty
    pub poll_interval: Duration,

    /// Jobs claimed per batch
    pub batch_size: usize,

    /// Wait after a failed claim before polling again
    pub error_backoff: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            error_backoff: Duration::from_secs(10),
        }
    }
}

/// How one claimed job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Sent,
    Skipped(&'static str),
    Retrying,
    Failed,
}

pub struct Orchestrator {
    queue: JobQueue,
    steps: StepRegistry,
    ctx: StepContext,
    config: OrchestratorConfig,
    shutdown_token: CancellationToken,
}

impl Orchestrator {
    pub fn new(queue: JobQueue, steps: StepRegistry, ctx: StepContext, config: OrchestratorConfig) -> Self {
        Self {
            queue,
            steps,
            ctx,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Gets shutdown token
    ///
    /// Used to signal graceful shutdown from external handlers.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Runs the worker loop until the shutdown token is cancelled.
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(
            batch_size = self.config.batch_size,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Worker orchestrator starting"
        );

        while !self.shutdown_token.is_cancelled() {
            let wait = match self.run_once().await {
                Ok(0) => self.config.poll_interval,
                // A full batch means more jobs are probably due
                Ok(_) => Duration::ZERO,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim email jobs");
                    self.config.error_backoff
                }
            };

            if wait.is_zero() {
                continue;
            }

            tokio::select! {
                _ = self.shutdown_token.cancelled() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }

        tracing::info!("Worker orchestrator shut down");
        Ok(())
    }

    /// Claims one batch and processes it. Returns the number of jobs handled.
    pub async fn run_once(&self) -> Result<usize, QueueError> {
        let jobs = self.queue.claim(self.config.batch_size).await?;
        let count = jobs.len();

        join_all(jobs.into_iter().map(|job| self.process(job))).await;

        Ok(count)
    }

    /// Runs the step for one claimed job and records the result.
    pub async fn process(&self, job: EmailJob) -> JobOutcome {
        let outcome = match self.execute(&job).await {
            Ok(StepOutcome::Sent) => self.complete(&job, JobOutcome::Sent).await,
            Ok(StepOutcome::Skipped(reason)) => self.complete(&job, JobOutcome::Skipped(reason)).await,
            Err(error) => match self.queue.fail(&job, &error).await {
                Ok(FailureOutcome::Retry { .. }) => JobOutcome::Retrying,
                Ok(FailureOutcome::GiveUp) => JobOutcome::Failed,
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to record job failure");
                    JobOutcome::Failed
                }
            },
        };

        tracing::info!(
            job_id = %job.id,
            kind = job.kind.as_str(),
            user_id = %job.user_id,
            outcome = ?outcome,
            "Email job processed"
        );

        outcome
    }

    async fn execute(&self, job: &EmailJob) -> Result<StepOutcome, String> {
        let user = match User::find_by_id(&self.ctx.db, job.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return Ok(StepOutcome::Skipped("user no longer exists")),
            Err(e) => return Err(format!("Failed to load user: {}", e)),
        };

        if user.banned {
            return Ok(StepOutcome::Skipped("user is banned"));
        }

        let step = self
            .steps
            .get(job.kind)
            .ok_or_else(|| format!("No workflow step for {} jobs", job.kind.as_str()))?;

        step.run(&self.ctx, &user).await.map_err(|e| e.to_string())
    }

    async fn complete(&self, job: &EmailJob, outcome: JobOutcome) -> JobOutcome {
        if let Err(e) = self.queue.complete(job).await {
            tracing::error!(job_id = %job.id, error = %e, "Failed to mark job done");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orchestrator_config_default() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.error_backoff, Duration::from_secs(10));
    }
}

/// Email job queue
///
/// Wraps the `email_jobs` table with the worker's retry policy.
///
/// # Lifecycle
///
/// ```text
/// pending ──claim──> running ──ok──────> done
///                       │
///                       └──error──> pending (run_at + retry delay)
///                                   failed  (after max attempts)
/// ```
///
/// Claiming increments `attempts` and uses `FOR UPDATE SKIP LOCKED`, so
/// several workers can share the table. Jobs left `running` by a crashed
/// worker are claimed again once they go stale.
///
/// # Example
///
/// ```no_run
/// use keystone_worker::queue::{JobQueue, RetryPolicy};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let queue = JobQueue::new(pool, RetryPolicy::default());
///
/// for job in queue.claim(10).await? {
///     println!("Claimed {} job {}", job.kind.as_str(), job.id);
///     queue.complete(&job).await?;
/// }
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use keystone_shared::models::email_job::{EmailJob, JobStatus};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

/// Running jobs untouched for this long belong to a dead worker
const STALE_AFTER_MINUTES: i64 = 15;

/// Error messages stored on jobs are cut to this many characters
const MAX_ERROR_CHARS: usize = 1000;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The job was no longer `running` (another worker finished it)
    #[error("Job not running: {0}")]
    NotRunning(Uuid),
}

/// How failed jobs are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: i32,
    pub retry_delay: chrono::Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: chrono::Duration::minutes(5),
        }
    }
}

/// What happened to a job whose step failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Retry { run_at: DateTime<Utc> },
    GiveUp,
}

impl RetryPolicy {
    /// Decides the fate of a job that failed on its `attempts`-th try.
    pub fn after_failure(&self, attempts: i32, now: DateTime<Utc>) -> FailureOutcome {
        if attempts >= self.max_attempts {
            FailureOutcome::GiveUp
        } else {
            FailureOutcome::Retry {
                run_at: now + self.retry_delay,
            }
        }
    }
}

fn truncate_error(error: &str) -> String {
    error.chars().take(MAX_ERROR_CHARS).collect()
}

/// Email job queue
#[derive(Debug, Clone)]
pub struct JobQueue {
    db: PgPool,
    policy: RetryPolicy,
}

impl JobQueue {
    pub fn new(db: PgPool, policy: RetryPolicy) -> Self {
        Self { db, policy }
    }

    pub fn db(&self) -> &PgPool {
        &self.db
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Claims up to `limit` due jobs.
    pub async fn claim(&self, limit: usize) -> Result<Vec<EmailJob>, QueueError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let stale_after = chrono::Duration::minutes(STALE_AFTER_MINUTES);

        let abandoned = EmailJob::fail_exhausted_stale(
            &self.db,
            stale_after,
            self.policy.max_attempts,
            "Worker stopped during the last attempt",
        )
        .await?;
        if abandoned > 0 {
            tracing::error!(count = abandoned, "Failed stale email jobs with no attempts left");
        }

        let jobs = EmailJob::claim_due(&self.db, limit, stale_after, self.policy.max_attempts).await?;

        if !jobs.is_empty() {
            tracing::info!(count = jobs.len(), "Claimed email jobs");
        }

        Ok(jobs)
    }

    pub async fn complete(&self, job: &EmailJob) -> Result<(), QueueError> {
        if !EmailJob::mark_done(&self.db, job.id).await? {
            return Err(QueueError::NotRunning(job.id));
        }

        tracing::debug!(job_id = %job.id, kind = job.kind.as_str(), "Email job done");
        Ok(())
    }

    /// Records a failed attempt, rescheduling or giving up per the policy.
    pub async fn fail(&self, job: &EmailJob, error: &str) -> Result<FailureOutcome, QueueError> {
        let error = truncate_error(error);
        let outcome = self.policy.after_failure(job.attempts, Utc::now());

        let updated = match outcome {
            FailureOutcome::Retry { run_at } => {
                tracing::warn!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    run_at = %run_at,
                    error = %error,
                    "Email job failed, retrying"
                );
                EmailJob::reschedule(&self.db, job.id, run_at, &error).await?
            }
            FailureOutcome::GiveUp => {
                tracing::error!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    error = %error,
                    "Email job failed permanently"
                );
                EmailJob::mark_failed(&self.db, job.id, &error).await?
            }
        };

        if !updated {
            return Err(QueueError::NotRunning(job.id));
        }

        Ok(outcome)
    }

    pub async fn pending_count(&self) -> Result<i64, QueueError> {
        Ok(EmailJob::count_by_status(&self.db, JobStatus::Pending).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_until_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            retry_delay: chrono::Duration::minutes(10),
        };
        let now = Utc::now();

        assert_eq!(
            policy.after_failure(1, now),
            FailureOutcome::Retry {
                run_at: now + chrono::Duration::minutes(10)
            }
        );
        assert!(matches!(policy.after_failure(2, now), FailureOutcome::Retry { .. }));
        assert_eq!(policy.after_failure(3, now), FailureOutcome::GiveUp);
        assert_eq!(policy.after_failure(7, now), FailureOutcome::GiveUp);
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.after_failure(1, Utc::now()), FailureOutcome::GiveUp);
    }

    #[test]
    fn test_error_truncated() {
        let long = "x".repeat(MAX_ERROR_CHARS + 50);
        assert_eq!(truncate_error(&long).len(), MAX_ERROR_CHARS);
        assert_eq!(truncate_error("smtp timeout"), "smtp timeout");
    }
}

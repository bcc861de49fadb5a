//! Onboarding email jobs
//!
//! The API enqueues jobs at registration; `keystone-worker` claims due jobs
//! and runs the matching workflow step. Claiming uses
//! `FOR UPDATE SKIP LOCKED`, so several workers can poll the same table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const JOB_COLUMNS: &str =
    "id, user_id, kind, status, run_at, attempts, last_error, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "email_job_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EmailJobKind {
    Welcome,
    FollowUp,
}

impl EmailJobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailJobKind::Welcome => "welcome",
            EmailJobKind::FollowUp => "follow_up",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmailJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: EmailJobKind,
    pub status: JobStatus,
    pub run_at: DateTime<Utc>,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmailJob {
    /// Schedules a job for `run_at`.
    pub async fn enqueue(
        pool: &PgPool,
        user_id: Uuid,
        kind: EmailJobKind,
        run_at: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO email_jobs (user_id, kind, run_at) VALUES ($1, $2, $3) RETURNING {}",
            JOB_COLUMNS
        );

        sqlx::query_as::<_, EmailJob>(&query)
            .bind(user_id)
            .bind(kind)
            .bind(run_at)
            .fetch_one(pool)
            .await
    }

    pub async fn find(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM email_jobs WHERE id = $1", JOB_COLUMNS);

        sqlx::query_as::<_, EmailJob>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM email_jobs WHERE user_id = $1 ORDER BY run_at ASC",
            JOB_COLUMNS
        );

        sqlx::query_as::<_, EmailJob>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Atomically moves up to `limit` due jobs to `running`.
    ///
    /// Jobs stuck in `running` for longer than `stale_after` (a crashed
    /// worker) are claimed again while they have attempts left.
    pub async fn claim_due(
        pool: &PgPool,
        limit: i64,
        stale_after: chrono::Duration,
        max_attempts: i32,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            r#"
            WITH due AS (
                SELECT id FROM email_jobs
                WHERE (status = 'pending' AND run_at <= NOW())
                   OR (status = 'running' AND updated_at < $2 AND attempts < $3)
                ORDER BY run_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE email_jobs
            SET status = 'running', attempts = attempts + 1, updated_at = NOW()
            FROM due
            WHERE email_jobs.id = due.id
            RETURNING {}
            "#,
            JOB_COLUMNS
                .split(", ")
                .map(|c| format!("email_jobs.{}", c))
                .collect::<Vec<_>>()
                .join(", ")
        );

        sqlx::query_as::<_, EmailJob>(&query)
            .bind(limit)
            .bind(Utc::now() - stale_after)
            .bind(max_attempts)
            .fetch_all(pool)
            .await
    }

    /// Fails stale `running` jobs that have used up their attempts.
    pub async fn fail_exhausted_stale(
        pool: &PgPool,
        stale_after: chrono::Duration,
        max_attempts: i32,
        error: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE email_jobs SET status = 'failed', last_error = $3, updated_at = NOW() \
             WHERE status = 'running' AND updated_at < $1 AND attempts >= $2",
        )
        .bind(Utc::now() - stale_after)
        .bind(max_attempts)
        .bind(error)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn mark_done(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE email_jobs SET status = 'done', last_error = NULL, updated_at = NOW() \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Puts a failed job back in the queue for another attempt at `run_at`.
    pub async fn reschedule(
        pool: &PgPool,
        id: Uuid,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE email_jobs SET status = 'pending', run_at = $2, last_error = $3, updated_at = NOW() \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .bind(run_at)
        .bind(error)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Gives up on a job.
    pub async fn mark_failed(pool: &PgPool, id: Uuid, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE email_jobs SET status = 'failed', last_error = $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_by_status(pool: &PgPool, status: JobStatus) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM email_jobs WHERE status = $1")
            .bind(status)
            .fetch_one(pool)
            .await
    }
}

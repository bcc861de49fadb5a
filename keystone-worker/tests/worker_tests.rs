//! Email job processing against PostgreSQL
//!
//! These tests need `DATABASE_URL` and return early without it. Jobs for
//! `process` are scheduled in the future and moved to `running` by hand, so
//! a concurrent claim never picks them up.

use chrono::{Duration, Utc};
use keystone_shared::{
    db::{
        migrations::run_migrations,
        pool::{create_pool, DatabaseConfig},
    },
    email::MemoryEmailSender,
    models::{
        email_job::{EmailJob, EmailJobKind, JobStatus},
        organization::{CreateOrganization, Organization},
        project::{CreateProject, Project},
        user::{CreateUser, User},
    },
};
use keystone_worker::{
    orchestrator::{JobOutcome, Orchestrator, OrchestratorConfig},
    queue::{JobQueue, RetryPolicy},
    steps::{StepContext, StepRegistry},
};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = create_pool(DatabaseConfig {
        max_connections: 5,
        ..DatabaseConfig::with_url(url)
    })
    .await
    .expect("connect to test database");
    run_migrations(&pool).await.expect("run migrations");
    Some(pool)
}

fn orchestrator(pool: &PgPool, mailer: Arc<MemoryEmailSender>, policy: RetryPolicy) -> Orchestrator {
    Orchestrator::new(
        JobQueue::new(pool.clone(), policy),
        StepRegistry::onboarding(),
        StepContext::new(pool.clone(), mailer, "https://app.example.com"),
        OrchestratorConfig::default(),
    )
}

async fn create_user(pool: &PgPool) -> User {
    User::create(
        pool,
        CreateUser {
            email: format!("worker-{}@example.com", Uuid::new_v4()),
            password_hash: "unused".to_string(),
            name: Some("Noor".to_string()),
        },
    )
    .await
    .expect("create user")
}

/// Moves a job to `running` the way a claim does.
async fn mark_running(pool: &PgPool, id: Uuid) -> EmailJob {
    sqlx::query_as::<_, EmailJob>(
        "UPDATE email_jobs SET status = 'running', attempts = attempts + 1, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING id, user_id, kind, status, run_at, attempts, last_error, created_at, updated_at",
    )
    .bind(id)
    .fetch_one(pool)
    .await
    .expect("claim job")
}

/// Enqueues a job far in the future and marks it claimed.
async fn claimed_job(pool: &PgPool, user_id: Uuid, kind: EmailJobKind) -> EmailJob {
    let job = EmailJob::enqueue(pool, user_id, kind, Utc::now() + Duration::days(365))
        .await
        .expect("enqueue job");

    mark_running(pool, job.id).await
}

async fn reload(pool: &PgPool, id: Uuid) -> EmailJob {
    EmailJob::find(pool, id).await.unwrap().expect("job exists")
}

#[tokio::test]
async fn test_welcome_job_sends_and_completes() {
    let Some(pool) = test_pool().await else { return };
    let mailer = Arc::new(MemoryEmailSender::new());
    let worker = orchestrator(&pool, mailer.clone(), RetryPolicy::default());

    let user = create_user(&pool).await;
    let job = claimed_job(&pool, user.id, EmailJobKind::Welcome).await;

    assert_eq!(worker.process(job.clone()).await, JobOutcome::Sent);

    assert_eq!(mailer.sent_to(&user.email).len(), 1);
    assert_eq!(reload(&pool, job.id).await.status, JobStatus::Done);
}

#[tokio::test]
async fn test_follow_up_skipped_once_user_has_a_project() {
    let Some(pool) = test_pool().await else { return };
    let mailer = Arc::new(MemoryEmailSender::new());
    let worker = orchestrator(&pool, mailer.clone(), RetryPolicy::default());

    let user = create_user(&pool).await;
    let org = Organization::create(
        &pool,
        CreateOrganization {
            name: "Noor's team".to_string(),
            slug: format!("noor-{}", Uuid::new_v4().simple()),
            logo_url: None,
        },
    )
    .await
    .unwrap();
    Project::create(
        &pool,
        CreateProject {
            organization_id: org.id,
            name: "First".to_string(),
            slug: "first".to_string(),
            description: None,
            created_by: user.id,
        },
    )
    .await
    .unwrap();

    let job = claimed_job(&pool, user.id, EmailJobKind::FollowUp).await;

    assert!(matches!(worker.process(job.clone()).await, JobOutcome::Skipped(_)));
    assert!(mailer.sent_to(&user.email).is_empty());
    assert_eq!(reload(&pool, job.id).await.status, JobStatus::Done);
}

#[tokio::test]
async fn test_follow_up_sent_without_projects() {
    let Some(pool) = test_pool().await else { return };
    let mailer = Arc::new(MemoryEmailSender::new());
    let worker = orchestrator(&pool, mailer.clone(), RetryPolicy::default());

    let user = create_user(&pool).await;
    let job = claimed_job(&pool, user.id, EmailJobKind::FollowUp).await;

    assert_eq!(worker.process(job).await, JobOutcome::Sent);
    assert_eq!(mailer.sent_to(&user.email).len(), 1);
}

#[tokio::test]
async fn test_banned_user_job_completes_silently() {
    let Some(pool) = test_pool().await else { return };
    let mailer = Arc::new(MemoryEmailSender::new());
    let worker = orchestrator(&pool, mailer.clone(), RetryPolicy::default());

    let user = create_user(&pool).await;
    User::set_banned(&pool, user.id, true, Some("spam".to_string())).await.unwrap();
    let job = claimed_job(&pool, user.id, EmailJobKind::Welcome).await;

    assert!(matches!(worker.process(job.clone()).await, JobOutcome::Skipped(_)));
    assert!(mailer.sent_to(&user.email).is_empty());
    assert_eq!(reload(&pool, job.id).await.status, JobStatus::Done);
}

#[tokio::test]
async fn test_delivery_failure_retries_then_gives_up() {
    let Some(pool) = test_pool().await else { return };
    let mailer = Arc::new(MemoryEmailSender::new());
    mailer.set_failing(true);
    let policy = RetryPolicy {
        max_attempts: 2,
        retry_delay: Duration::minutes(10),
    };
    let worker = orchestrator(&pool, mailer.clone(), policy);

    let user = create_user(&pool).await;
    let job = claimed_job(&pool, user.id, EmailJobKind::Welcome).await;

    let before = Utc::now();
    assert_eq!(worker.process(job.clone()).await, JobOutcome::Retrying);

    let retried = reload(&pool, job.id).await;
    assert_eq!(retried.status, JobStatus::Pending);
    assert!(retried.run_at >= before + Duration::minutes(10));
    assert!(retried.last_error.is_some());

    let second = mark_running(&pool, job.id).await;
    assert_eq!(second.attempts, 2);
    assert_eq!(worker.process(second).await, JobOutcome::Failed);

    let failed = reload(&pool, job.id).await;
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.last_error.is_some());
}

#[tokio::test]
async fn test_claim_takes_due_jobs_only() {
    let Some(pool) = test_pool().await else { return };
    let queue = JobQueue::new(pool.clone(), RetryPolicy::default());

    let user = create_user(&pool).await;
    let due = EmailJob::enqueue(&pool, user.id, EmailJobKind::Welcome, Utc::now() - Duration::seconds(1))
        .await
        .unwrap();
    let later = EmailJob::enqueue(&pool, user.id, EmailJobKind::FollowUp, Utc::now() + Duration::days(3))
        .await
        .unwrap();

    let claimed = queue.claim(1000).await.unwrap();

    // Another test's claim may take `due` first; either way it is running
    assert!(!claimed.iter().any(|j| j.id == later.id));
    assert_eq!(reload(&pool, due.id).await.status, JobStatus::Running);
    assert_eq!(reload(&pool, later.id).await.status, JobStatus::Pending);
}

/// Leaves a job `running` with `attempts` as if its worker died long ago.
async fn abandoned_job(pool: &PgPool, user_id: Uuid, attempts: i32) -> EmailJob {
    let job = EmailJob::enqueue(pool, user_id, EmailJobKind::Welcome, Utc::now() - Duration::hours(1))
        .await
        .expect("enqueue job");

    sqlx::query_as::<_, EmailJob>(
        "UPDATE email_jobs SET status = 'running', attempts = $2, updated_at = NOW() - INTERVAL '1 hour' \
         WHERE id = $1 \
         RETURNING id, user_id, kind, status, run_at, attempts, last_error, created_at, updated_at",
    )
    .bind(job.id)
    .bind(attempts)
    .fetch_one(pool)
    .await
    .expect("abandon job")
}

#[tokio::test]
async fn test_stale_jobs_reclaimed_only_with_attempts_left() {
    let Some(pool) = test_pool().await else { return };
    let queue = JobQueue::new(
        pool.clone(),
        RetryPolicy {
            max_attempts: 3,
            retry_delay: Duration::minutes(5),
        },
    );

    let user = create_user(&pool).await;
    let retryable = abandoned_job(&pool, user.id, 1).await;
    let exhausted = abandoned_job(&pool, user.id, 3).await;

    let claimed = queue.claim(1000).await.unwrap();
    assert!(!claimed.iter().any(|j| j.id == exhausted.id));

    let reclaimed = reload(&pool, retryable.id).await;
    assert_eq!(reclaimed.status, JobStatus::Running);
    assert_eq!(reclaimed.attempts, 2);

    let failed = reload(&pool, exhausted.id).await;
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.last_error.is_some());
}

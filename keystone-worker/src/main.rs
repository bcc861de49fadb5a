//! # Keystone Worker
//!
//! Sends the welcome and follow-up emails queued by the API.
//!
//! ## Architecture
//!
//! The worker:
//! - Polls `email_jobs` for due jobs, claiming them with `SKIP LOCKED`
//! - Runs the workflow step for each job kind
//! - Reschedules failed jobs until their attempts run out
//! - Finishes the batch in flight on SIGINT or SIGTERM
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p keystone-worker
//! ```

use keystone_shared::{
    db::{
        migrations::run_migrations,
        pool::{close_pool, create_pool},
    },
    email,
};
use keystone_worker::{
    config::WorkerConfig,
    orchestrator::Orchestrator,
    queue::JobQueue,
    steps::{StepContext, StepRegistry},
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "keystone_worker=debug,keystone_shared=info".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Cancels `token` on the first SIGINT or SIGTERM.
async fn watch_signals(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, finishing current batch...");
    token.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Keystone Worker v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = WorkerConfig::from_env()?;

    let pool = create_pool(config.database.clone()).await?;
    run_migrations(&pool).await?;

    let mailer = email::from_config(&config.email)?;
    tracing::info!(provider = mailer.name(), "Email sender ready");

    let orchestrator = Orchestrator::new(
        JobQueue::new(pool.clone(), config.retry),
        StepRegistry::onboarding(),
        StepContext::new(pool.clone(), mailer, config.app_url.clone()),
        config.orchestrator.clone(),
    );

    tokio::spawn(watch_signals(orchestrator.shutdown_token()));

    orchestrator.run().await?;

    close_pool(pool).await;
    tracing::info!("Worker stopped");

    Ok(())
}

//! Processed payment-provider events
//!
//! Providers deliver webhooks at least once. Recording the event id under a
//! primary key makes handling idempotent: a redelivery inserts nothing.

use sqlx::PgPool;

pub struct BillingEventLog;

impl BillingEventLog {
    /// Records an event id. Returns `false` if it was already processed.
    pub async fn record(
        pool: &PgPool,
        provider_event_id: &str,
        event_type: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO billing_events (provider_event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (provider_event_id) DO NOTHING
            "#,
        )
        .bind(provider_event_id)
        .bind(event_type)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Forgets an event so a failed handler can process the redelivery.
    pub async fn forget(pool: &PgPool, provider_event_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM billing_events WHERE provider_event_id = $1")
            .bind(provider_event_id)
            .execute(pool)
            .await?;

        Ok(())
    }
}

//! Organization subscriptions
//!
//! At most one row per organization. The payment provider owns the
//! lifecycle; this table mirrors the latest state reported by its webhooks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const SUBSCRIPTION_COLUMNS: &str = "id, organization_id, plan_id, status, provider_customer_id, \
     provider_subscription_id, current_period_end, cancel_at_period_end, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
    Incomplete,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
        }
    }

    /// Maps the provider's status string. Unknown values become `Incomplete`.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "trialing" => SubscriptionStatus::Trialing,
            "active" => SubscriptionStatus::Active,
            "past_due" | "unpaid" => SubscriptionStatus::PastDue,
            "canceled" | "incomplete_expired" => SubscriptionStatus::Canceled,
            _ => SubscriptionStatus::Incomplete,
        }
    }

    /// Whether the subscription still grants its plan's limits.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Trialing | SubscriptionStatus::Active | SubscriptionStatus::PastDue
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    pub provider_customer_id: Option<String>,
    pub provider_subscription_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpsertSubscription {
    pub organization_id: Uuid,
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    pub provider_customer_id: Option<String>,
    pub provider_subscription_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
}

impl Subscription {
    pub async fn find_by_organization(
        pool: &PgPool,
        organization_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM subscriptions WHERE organization_id = $1",
            SUBSCRIPTION_COLUMNS
        );

        sqlx::query_as::<_, Subscription>(&query)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_provider_subscription(
        pool: &PgPool,
        provider_subscription_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM subscriptions WHERE provider_subscription_id = $1",
            SUBSCRIPTION_COLUMNS
        );

        sqlx::query_as::<_, Subscription>(&query)
            .bind(provider_subscription_id)
            .fetch_optional(pool)
            .await
    }

    /// Inserts or replaces the organization's subscription. Provider ids
    /// already on file are kept when the new values are `None`.
    pub async fn upsert_for_organization(
        pool: &PgPool,
        data: UpsertSubscription,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO subscriptions (organization_id, plan_id, status, provider_customer_id,
                                       provider_subscription_id, current_period_end, cancel_at_period_end)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (organization_id) DO UPDATE
            SET plan_id = EXCLUDED.plan_id,
                status = EXCLUDED.status,
                provider_customer_id = COALESCE(EXCLUDED.provider_customer_id, subscriptions.provider_customer_id),
                provider_subscription_id = COALESCE(EXCLUDED.provider_subscription_id, subscriptions.provider_subscription_id),
                current_period_end = COALESCE(EXCLUDED.current_period_end, subscriptions.current_period_end),
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                updated_at = NOW()
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        );

        sqlx::query_as::<_, Subscription>(&query)
            .bind(data.organization_id)
            .bind(data.plan_id)
            .bind(data.status)
            .bind(data.provider_customer_id)
            .bind(data.provider_subscription_id)
            .bind(data.current_period_end)
            .bind(data.cancel_at_period_end)
            .fetch_one(pool)
            .await
    }

    pub async fn update_status(
        pool: &PgPool,
        id: Uuid,
        status: SubscriptionStatus,
        cancel_at_period_end: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE subscriptions SET status = $2, cancel_at_period_end = $3, updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            SUBSCRIPTION_COLUMNS
        );

        sqlx::query_as::<_, Subscription>(&query)
            .bind(id)
            .bind(status)
            .bind(cancel_at_period_end)
            .fetch_optional(pool)
            .await
    }

    /// Subscriptions that still grant access (trialing, active, past due)
    pub async fn count_active(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM subscriptions WHERE status IN ('trialing', 'active', 'past_due')",
        )
        .fetch_one(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_provider() {
        assert_eq!(SubscriptionStatus::from_provider("active"), SubscriptionStatus::Active);
        assert_eq!(SubscriptionStatus::from_provider("unpaid"), SubscriptionStatus::PastDue);
        assert_eq!(
            SubscriptionStatus::from_provider("incomplete_expired"),
            SubscriptionStatus::Canceled
        );
        assert_eq!(
            SubscriptionStatus::from_provider("paused"),
            SubscriptionStatus::Incomplete
        );
    }

    #[test]
    fn test_is_live() {
        assert!(SubscriptionStatus::Active.is_live());
        assert!(SubscriptionStatus::PastDue.is_live());
        assert!(!SubscriptionStatus::Canceled.is_live());
        assert!(!SubscriptionStatus::Incomplete.is_live());
    }
}

//! Subscription plans
//!
//! Plans are seeded by migration. `max_*` limits of `None` mean unlimited.
//! Organizations without a subscription row are on [`FREE_PLAN_SLUG`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

pub const FREE_PLAN_SLUG: &str = "free";

const PLAN_COLUMNS: &str = "id, slug, name, price_cents, currency, billing_interval, \
     provider_price_id, max_projects, max_members, max_storage_bytes, active, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "billing_interval", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Month,
    Year,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
    pub billing_interval: BillingInterval,
    /// Price identifier at the payment provider; `None` for free plans
    pub provider_price_id: Option<String>,
    pub max_projects: Option<i32>,
    pub max_members: Option<i32>,
    pub max_storage_bytes: Option<i64>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn is_free(&self) -> bool {
        self.price_cents == 0
    }

    pub async fn list_active(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM plans WHERE active ORDER BY price_cents ASC",
            PLAN_COLUMNS
        );

        sqlx::query_as::<_, Plan>(&query).fetch_all(pool).await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM plans WHERE id = $1", PLAN_COLUMNS);

        sqlx::query_as::<_, Plan>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM plans WHERE slug = $1", PLAN_COLUMNS);

        sqlx::query_as::<_, Plan>(&query)
            .bind(slug)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_provider_price(
        pool: &PgPool,
        provider_price_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM plans WHERE provider_price_id = $1",
            PLAN_COLUMNS
        );

        sqlx::query_as::<_, Plan>(&query)
            .bind(provider_price_id)
            .fetch_optional(pool)
            .await
    }

    /// Plan currently governing an organization: the plan of a live
    /// subscription, otherwise the free plan.
    pub async fn for_organization(
        pool: &PgPool,
        organization_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM plans WHERE id = COALESCE(\
                (SELECT plan_id FROM subscriptions \
                 WHERE organization_id = $1 AND status IN ('trialing', 'active', 'past_due')), \
                (SELECT id FROM plans WHERE slug = $2))",
            PLAN_COLUMNS
        );

        sqlx::query_as::<_, Plan>(&query)
            .bind(organization_id)
            .bind(FREE_PLAN_SLUG)
            .fetch_one(pool)
            .await
    }
}

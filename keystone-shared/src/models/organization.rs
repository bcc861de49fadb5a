//! Organization model (tenant)
//!
//! An organization groups users through [`crate::models::membership`]. Every
//! project, file, subscription and invitation hangs off exactly one
//! organization and is removed with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::membership::MembershipRole;

const ORG_COLUMNS: &str = "id, name, slug, logo_url, created_at, updated_at";

/// Organization
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Organization {
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// URL-safe unique identifier
    pub slug: String,

    pub logo_url: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// An organization as seen by one of its members
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrganizationWithRole {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub logo_url: Option<String>,
    pub role: MembershipRole,
    pub created_at: DateTime<Utc>,
}

/// Back-office listing row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrganizationSummary {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub member_count: i64,
    pub project_count: i64,
    pub plan_slug: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrganization {
    pub name: String,
    pub slug: String,
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateOrganization {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub logo_url: Option<Option<String>>,
}

/// Derives a slug from a display name: lowercase ASCII alphanumerics joined
/// by single hyphens.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug.truncate(48);
    slug.trim_end_matches('-').to_string()
}

/// Checks that a slug is 2-48 characters of `[a-z0-9-]` without leading,
/// trailing or doubled hyphens.
pub fn is_valid_slug(slug: &str) -> bool {
    let len_ok = (2..=48).contains(&slug.len());
    let chars_ok = slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    len_ok
        && chars_ok
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
}

impl Organization {
    pub async fn create(pool: &PgPool, data: CreateOrganization) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO organizations (name, slug, logo_url) VALUES ($1, $2, $3) RETURNING {}",
            ORG_COLUMNS
        );

        sqlx::query_as::<_, Organization>(&query)
            .bind(data.name)
            .bind(data.slug)
            .bind(data.logo_url)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM organizations WHERE id = $1", ORG_COLUMNS);

        sqlx::query_as::<_, Organization>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM organizations WHERE slug = $1", ORG_COLUMNS);

        sqlx::query_as::<_, Organization>(&query)
            .bind(slug)
            .fetch_optional(pool)
            .await
    }

    pub async fn slug_exists(pool: &PgPool, slug: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM organizations WHERE slug = $1)")
            .bind(slug)
            .fetch_one(pool)
            .await
    }

    /// Returns `base` if free, otherwise the first free `base-N`.
    pub async fn available_slug(pool: &PgPool, base: &str) -> Result<String, sqlx::Error> {
        let base = if base.len() < 2 { "org" } else { base };

        if !Self::slug_exists(pool, base).await? {
            return Ok(base.to_string());
        }

        let mut n = 2;
        loop {
            let candidate = format!("{}-{}", base, n);
            if !Self::slug_exists(pool, &candidate).await? {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateOrganization,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE organizations SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.slug.is_some() {
            bind_count += 1;
            query.push_str(&format!(", slug = ${}", bind_count));
        }
        if data.logo_url.is_some() {
            bind_count += 1;
            query.push_str(&format!(", logo_url = ${}", bind_count));
        }

        query.push_str(&format!(" WHERE id = $1 RETURNING {}", ORG_COLUMNS));

        let mut q = sqlx::query_as::<_, Organization>(&query).bind(id);

        if let Some(name) = data.name {
            q = q.bind(name);
        }
        if let Some(slug) = data.slug {
            q = q.bind(slug);
        }
        if let Some(logo_url) = data.logo_url {
            q = q.bind(logo_url);
        }

        q.fetch_optional(pool).await
    }

    /// Deletes an organization and everything scoped to it.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Organizations the user belongs to, oldest membership first.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<OrganizationWithRole>, sqlx::Error> {
        sqlx::query_as::<_, OrganizationWithRole>(
            r#"
            SELECT o.id, o.name, o.slug, o.logo_url, m.role, o.created_at
            FROM organizations o
            JOIN memberships m ON m.organization_id = o.id
            WHERE m.user_id = $1
            ORDER BY m.created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Back-office listing with member and project counts.
    pub async fn list(
        pool: &PgPool,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<OrganizationSummary>, sqlx::Error> {
        sqlx::query_as::<_, OrganizationSummary>(
            r#"
            SELECT o.id, o.name, o.slug,
                   (SELECT COUNT(*) FROM memberships m WHERE m.organization_id = o.id) AS member_count,
                   (SELECT COUNT(*) FROM projects p WHERE p.organization_id = o.id) AS project_count,
                   (SELECT pl.slug FROM subscriptions s JOIN plans pl ON pl.id = s.plan_id
                     WHERE s.organization_id = o.id) AS plan_slug,
                   o.created_at
            FROM organizations o
            WHERE ($1::text IS NULL OR o.name ILIKE $1 OR o.slug ILIKE $1)
            ORDER BY o.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(search.map(super::user::like_pattern))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn count(pool: &PgPool, search: Option<&str>) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM organizations \
             WHERE ($1::text IS NULL OR name ILIKE $1 OR slug ILIKE $1)",
        )
        .bind(search.map(super::user::like_pattern))
        .fetch_one(pool)
        .await
    }
}

//! Project model
//!
//! Projects belong to one organization. Slugs are unique per organization
//! (`projects_organization_slug_key`), so two tenants may both own `website`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const PROJECT_COLUMNS: &str =
    "id, organization_id, name, slug, description, created_by, archived, created_at, updated_at";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    /// `None` once the creator's account is deleted
    pub created_by: Option<Uuid>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProject {
    pub organization_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<Option<String>>,
    pub archived: Option<bool>,
}

impl UpdateProject {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.slug.is_none()
            && self.description.is_none()
            && self.archived.is_none()
    }
}

impl Project {
    pub async fn create(pool: &PgPool, data: CreateProject) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO projects (organization_id, name, slug, description, created_by) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            PROJECT_COLUMNS
        );

        sqlx::query_as::<_, Project>(&query)
            .bind(data.organization_id)
            .bind(data.name)
            .bind(data.slug)
            .bind(data.description)
            .bind(data.created_by)
            .fetch_one(pool)
            .await
    }

    /// Looks up a project inside an organization. A project id from another
    /// tenant yields `None`.
    pub async fn find(
        pool: &PgPool,
        organization_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM projects WHERE id = $1 AND organization_id = $2",
            PROJECT_COLUMNS
        );

        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn update(
        pool: &PgPool,
        organization_id: Uuid,
        id: Uuid,
        data: UpdateProject,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE projects SET updated_at = NOW()");
        let mut bind_count = 2;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.slug.is_some() {
            bind_count += 1;
            query.push_str(&format!(", slug = ${}", bind_count));
        }
        if data.description.is_some() {
            bind_count += 1;
            query.push_str(&format!(", description = ${}", bind_count));
        }
        if data.archived.is_some() {
            bind_count += 1;
            query.push_str(&format!(", archived = ${}", bind_count));
        }

        query.push_str(&format!(
            " WHERE id = $1 AND organization_id = $2 RETURNING {}",
            PROJECT_COLUMNS
        ));

        let mut q = sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .bind(organization_id);

        if let Some(name) = data.name {
            q = q.bind(name);
        }
        if let Some(slug) = data.slug {
            q = q.bind(slug);
        }
        if let Some(description) = data.description {
            q = q.bind(description);
        }
        if let Some(archived) = data.archived {
            q = q.bind(archived);
        }

        q.fetch_optional(pool).await
    }

    /// Deletes a project and its tasks.
    pub async fn delete(pool: &PgPool, organization_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(organization_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Projects in an organization, most recently updated first. Archived
    /// projects are hidden unless `include_archived` is set.
    pub async fn list(
        pool: &PgPool,
        organization_id: Uuid,
        include_archived: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM projects \
             WHERE organization_id = $1 AND ($2 OR NOT archived) \
             ORDER BY updated_at DESC LIMIT $3 OFFSET $4",
            PROJECT_COLUMNS
        );

        sqlx::query_as::<_, Project>(&query)
            .bind(organization_id)
            .bind(include_archived)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    pub async fn count(
        pool: &PgPool,
        organization_id: Uuid,
        include_archived: bool,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM projects WHERE organization_id = $1 AND ($2 OR NOT archived)",
        )
        .bind(organization_id)
        .bind(include_archived)
        .fetch_one(pool)
        .await
    }

    /// Every project in the organization, archived included. Plan limits
    /// count archived projects too.
    pub async fn count_by_organization(
        pool: &PgPool,
        organization_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        Self::count(pool, organization_id, true).await
    }

    /// Projects created by the user across all organizations.
    pub async fn count_by_creator(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE created_by = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
    }

    pub async fn count_all(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM projects")
            .fetch_one(pool)
            .await
    }
}

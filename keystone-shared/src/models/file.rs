//! Uploaded file metadata
//!
//! The bytes live in the storage provider under `storage_key`; this table is
//! the index used for listing, authorization and quota accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const FILE_COLUMNS: &str =
    "id, organization_id, uploaded_by, storage_key, file_name, content_type, size_bytes, created_at";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredFile {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub uploaded_by: Option<Uuid>,
    #[serde(skip_serializing)]
    pub storage_key: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateStoredFile {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub uploaded_by: Uuid,
    pub storage_key: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
}

impl StoredFile {
    /// Records an upload. The id is generated by the caller because it is
    /// part of the storage key written before this row.
    pub async fn create(pool: &PgPool, data: CreateStoredFile) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO files (id, organization_id, uploaded_by, storage_key, file_name, content_type, size_bytes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            FILE_COLUMNS
        );

        sqlx::query_as::<_, StoredFile>(&query)
            .bind(data.id)
            .bind(data.organization_id)
            .bind(data.uploaded_by)
            .bind(data.storage_key)
            .bind(data.file_name)
            .bind(data.content_type)
            .bind(data.size_bytes)
            .fetch_one(pool)
            .await
    }

    pub async fn find(
        pool: &PgPool,
        organization_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM files WHERE id = $1 AND organization_id = $2",
            FILE_COLUMNS
        );

        sqlx::query_as::<_, StoredFile>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_by_organization(
        pool: &PgPool,
        organization_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM files WHERE organization_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            FILE_COLUMNS
        );

        sqlx::query_as::<_, StoredFile>(&query)
            .bind(organization_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    pub async fn count_by_organization(
        pool: &PgPool,
        organization_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE organization_id = $1")
            .bind(organization_id)
            .fetch_one(pool)
            .await
    }

    /// Bytes stored by an organization.
    pub async fn total_bytes_by_organization(
        pool: &PgPool,
        organization_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COALESCE(SUM(size_bytes), 0)::BIGINT FROM files WHERE organization_id = $1",
        )
        .bind(organization_id)
        .fetch_one(pool)
        .await
    }

    /// Storage keys of every file in an organization, collected before the
    /// organization is deleted so the objects can be removed too.
    pub async fn storage_keys_by_organization(
        pool: &PgPool,
        organization_id: Uuid,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT storage_key FROM files WHERE organization_id = $1")
            .bind(organization_id)
            .fetch_all(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, organization_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM files WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(organization_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn total_bytes(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COALESCE(SUM(size_bytes), 0)::BIGINT FROM files")
            .fetch_one(pool)
            .await
    }
}

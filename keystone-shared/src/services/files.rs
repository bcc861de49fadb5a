//! File uploads
//!
//! Bytes go to the configured [`StorageAdapter`](crate::storage::StorageAdapter)
//! under `{organization}/{file}/{name}`; metadata goes to the `files` table.
//! The object is written first, so a failed insert leaves an orphan that we
//! remove right away.

use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use super::{intercept, ServiceContext, ServiceError, ServiceResult};
use crate::{
    auth::authorization::{require_permission, require_resource_access, OrgActor, ResourcePermission},
    config::UploadConfig,
    limits,
    models::file::{CreateStoredFile, StoredFile},
    pagination::{PageParams, Paginated},
    storage::{object_key, sanitize_file_name},
};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// An upload as received from the client
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub file: StoredFile,
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StorageUsage {
    pub used_bytes: i64,
    pub file_count: i64,
}

/// Checks size and media type. Returns the content type to store.
fn check_upload(config: &UploadConfig, upload: &FileUpload) -> ServiceResult<String> {
    if upload.data.is_empty() {
        return Err(ServiceError::invalid("file", "File is empty"));
    }
    if upload.data.len() > config.max_bytes {
        return Err(ServiceError::invalid(
            "file",
            format!("File exceeds the {} byte limit", config.max_bytes),
        ));
    }

    let content_type = upload
        .content_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_ascii_lowercase();

    if !config.is_allowed(&content_type) {
        return Err(ServiceError::invalid(
            "content_type",
            format!("File type {} is not allowed", content_type),
        ));
    }

    Ok(content_type)
}

async fn load(ctx: &ServiceContext, actor: &OrgActor, file_id: Uuid) -> ServiceResult<StoredFile> {
    StoredFile::find(&ctx.db, actor.organization_id, file_id)
        .await?
        .ok_or(ServiceError::NotFound("File"))
}

pub async fn upload(ctx: &ServiceContext, actor: &OrgActor, upload: FileUpload) -> ServiceResult<StoredFile> {
    intercept("files.upload", async move {
        require_permission(actor, ResourcePermission::Write)?;
        let content_type = check_upload(&ctx.settings.upload, &upload)?;

        let size_bytes = upload.data.len() as i64;
        limits::check_storage_limit(&ctx.db, actor.organization_id, size_bytes).await?;

        let file_id = Uuid::new_v4();
        let file_name = sanitize_file_name(&upload.file_name);
        let storage_key = object_key(actor.organization_id, file_id, &file_name);

        ctx.storage
            .upload(&storage_key, upload.data, &content_type)
            .await?;

        let created = StoredFile::create(
            &ctx.db,
            CreateStoredFile {
                id: file_id,
                organization_id: actor.organization_id,
                uploaded_by: actor.user_id,
                storage_key: storage_key.clone(),
                file_name,
                content_type,
                size_bytes,
            },
        )
        .await;

        match created {
            Ok(file) => {
                tracing::info!(
                    file_id = %file.id,
                    organization_id = %file.organization_id,
                    size_bytes,
                    backend = ctx.storage.name(),
                    "File uploaded"
                );
                Ok(file)
            }
            Err(e) => {
                if let Err(cleanup) = ctx.storage.delete(&storage_key).await {
                    tracing::error!(key = %storage_key, error = %cleanup, "Failed to remove orphaned object");
                }
                Err(e.into())
            }
        }
    })
    .await
}

pub async fn download(ctx: &ServiceContext, actor: &OrgActor, file_id: Uuid) -> ServiceResult<DownloadedFile> {
    intercept("files.download", async move {
        require_permission(actor, ResourcePermission::Read)?;
        let file = load(ctx, actor, file_id).await?;
        let data = ctx.storage.download(&file.storage_key).await?;

        Ok(DownloadedFile { file, data })
    })
    .await
}

pub async fn delete(ctx: &ServiceContext, actor: &OrgActor, file_id: Uuid) -> ServiceResult<()> {
    intercept("files.delete", async move {
        let file = load(ctx, actor, file_id).await?;
        require_resource_access(actor, file.uploaded_by)?;

        if !StoredFile::delete(&ctx.db, actor.organization_id, file.id).await? {
            return Err(ServiceError::NotFound("File"));
        }
        if let Err(e) = ctx.storage.delete(&file.storage_key).await {
            tracing::warn!(key = %file.storage_key, error = %e, "Failed to delete stored object");
        }
        Ok(())
    })
    .await
}

pub async fn list(
    ctx: &ServiceContext,
    actor: &OrgActor,
    page: PageParams,
) -> ServiceResult<Paginated<StoredFile>> {
    intercept("files.list", async move {
        require_permission(actor, ResourcePermission::Read)?;

        let items =
            StoredFile::list_by_organization(&ctx.db, actor.organization_id, page.limit(), page.offset())
                .await?;
        let total = StoredFile::count_by_organization(&ctx.db, actor.organization_id).await?;

        Ok(Paginated::new(items, page, total))
    })
    .await
}

pub async fn usage(ctx: &ServiceContext, actor: &OrgActor) -> ServiceResult<StorageUsage> {
    intercept("files.usage", async move {
        require_permission(actor, ResourcePermission::Read)?;

        Ok(StorageUsage {
            used_bytes: StoredFile::total_bytes_by_organization(&ctx.db, actor.organization_id).await?,
            file_count: StoredFile::count_by_organization(&ctx.db, actor.organization_id).await?,
        })
    })
    .await
}

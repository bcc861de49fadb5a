/// File endpoints
///
/// # Endpoints
///
/// - `GET /v1/organizations/:org_id/files` - List files
/// - `POST /v1/organizations/:org_id/files?file_name=report.pdf` - Upload
/// - `GET /v1/organizations/:org_id/files/usage` - Bytes and file count
/// - `GET /v1/organizations/:org_id/files/:file_id` - Download
/// - `DELETE /v1/organizations/:org_id/files/:file_id`
///
/// Uploads send the raw file as the request body with its media type in
/// `Content-Type`. Size and type limits come from the upload configuration.

use crate::{
    dal::Dal,
    error::ApiResult,
    extract::{Path, Query},
    response::{ApiResponse, Deleted},
};
use axum::{
    body::Bytes,
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use keystone_shared::{
    models::file::StoredFile,
    pagination::{PageParams, Paginated},
    services::files::{self, FileUpload, StorageUsage},
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub file_name: String,
}

pub async fn list(
    dal: Dal,
    Path(org_id): Path<Uuid>,
    Query(page): Query<PageParams>,
) -> ApiResult<ApiResponse<Paginated<StoredFile>>> {
    let actor = dal.actor(org_id).await?;
    let files = files::list(dal.services(), &actor, page).await?;
    Ok(ApiResponse::ok(files))
}

/// Upload a file
///
/// Errors: 402 when the plan's storage quota would be exceeded, 422 for an
/// empty, oversized or disallowed file, 502 when the storage provider fails.
pub async fn upload(
    dal: Dal,
    Path(org_id): Path<Uuid>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<ApiResponse<StoredFile>> {
    let actor = dal.actor(org_id).await?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let upload = FileUpload {
        file_name: params.file_name,
        content_type,
        data: body,
    };

    let file = files::upload(dal.services(), &actor, upload).await?;
    Ok(ApiResponse::created(file))
}

pub async fn usage(dal: Dal, Path(org_id): Path<Uuid>) -> ApiResult<ApiResponse<StorageUsage>> {
    let actor = dal.actor(org_id).await?;
    let usage = files::usage(dal.services(), &actor).await?;
    Ok(ApiResponse::ok(usage))
}

/// `attachment` disposition with a quoted, header-safe file name
fn content_disposition(file_name: &str) -> HeaderValue {
    let safe: String = file_name
        .chars()
        .map(|c| if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' { c } else { '_' })
        .collect();

    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", safe))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Download the raw file contents
pub async fn download(
    dal: Dal,
    Path((org_id, file_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Response> {
    let actor = dal.actor(org_id).await?;
    let downloaded = files::download(dal.services(), &actor, file_id).await?;

    let content_type = HeaderValue::from_str(&downloaded.file.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    let headers = [
        (header::CONTENT_TYPE, content_type),
        (header::CONTENT_DISPOSITION, content_disposition(&downloaded.file.file_name)),
        (header::CACHE_CONTROL, HeaderValue::from_static("private, no-store")),
    ];

    Ok((headers, downloaded.data).into_response())
}

pub async fn delete(
    dal: Dal,
    Path((org_id, file_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<ApiResponse<Deleted>> {
    let actor = dal.actor(org_id).await?;
    files::delete(dal.services(), &actor, file_id).await?;
    Ok(ApiResponse::deleted())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_escapes_name() {
        assert_eq!(
            content_disposition("q3 report.pdf"),
            "attachment; filename=\"q3 report.pdf\""
        );
        assert_eq!(
            content_disposition("a\"b\r\nc.txt"),
            "attachment; filename=\"a_b__c.txt\""
        );
        assert_eq!(
            content_disposition("résumé.pdf"),
            "attachment; filename=\"r_sum_.pdf\""
        );
    }
}

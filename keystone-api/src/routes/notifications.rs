//! The signed-in user's notifications

use crate::{
    dal::Dal,
    error::ApiResult,
    extract::{Path, Query},
    response::{ApiResponse, Deleted},
};
use keystone_shared::{
    models::notification::Notification,
    pagination::{PageParams, Paginated},
    services::notifications::{self, MarkedRead, NotificationFilter, UnreadCount},
};
use uuid::Uuid;

/// `GET /v1/notifications?unread_only=true&page=&per_page=`, newest first
pub async fn list(
    dal: Dal,
    Query(filter): Query<NotificationFilter>,
    Query(page): Query<PageParams>,
) -> ApiResult<ApiResponse<Paginated<Notification>>> {
    dal.current_user().await?;
    let items = notifications::list(dal.services(), dal.user_id(), filter, page).await?;
    Ok(ApiResponse::ok(items))
}

pub async fn unread_count(dal: Dal) -> ApiResult<ApiResponse<UnreadCount>> {
    dal.current_user().await?;
    let count = notifications::unread_count(dal.services(), dal.user_id()).await?;
    Ok(ApiResponse::ok(count))
}

pub async fn mark_read(dal: Dal, Path(id): Path<Uuid>) -> ApiResult<ApiResponse<Notification>> {
    dal.current_user().await?;
    let notification = notifications::mark_read(dal.services(), dal.user_id(), id).await?;
    Ok(ApiResponse::ok(notification))
}

pub async fn mark_all_read(dal: Dal) -> ApiResult<ApiResponse<MarkedRead>> {
    dal.current_user().await?;
    let marked = notifications::mark_all_read(dal.services(), dal.user_id()).await?;
    Ok(ApiResponse::ok(marked))
}

pub async fn delete(dal: Dal, Path(id): Path<Uuid>) -> ApiResult<ApiResponse<Deleted>> {
    dal.current_user().await?;
    notifications::delete(dal.services(), dal.user_id(), id).await?;
    Ok(ApiResponse::deleted())
}

//! In-app notifications
//!
//! Users only ever see and change their own notifications. Other services
//! create them through [`notify`], which never fails the calling operation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{intercept, ServiceContext, ServiceError, ServiceResult};
use crate::{
    models::notification::{CreateNotification, Notification},
    pagination::{PageParams, Paginated},
};

/// Notification kinds written by the services
pub mod kinds {
    pub const INVITATION: &str = "invitation";
    pub const TASK_ASSIGNED: &str = "task_assigned";
    pub const MEMBER_ROLE_CHANGED: &str = "member_role_changed";
    pub const SUBSCRIPTION_CHANGED: &str = "subscription_changed";
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct NotificationFilter {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct UnreadCount {
    pub unread: i64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MarkedRead {
    pub updated: u64,
}

/// Creates a notification, logging instead of failing.
pub(crate) async fn notify(ctx: &ServiceContext, data: CreateNotification) {
    let user_id = data.user_id;
    let kind = data.kind.clone();

    match Notification::create(&ctx.db, data).await {
        Ok(n) => tracing::debug!(notification_id = %n.id, user_id = %user_id, kind = %kind, "Notification created"),
        Err(e) => tracing::warn!(user_id = %user_id, kind = %kind, error = %e, "Failed to create notification"),
    }
}

pub async fn list(
    ctx: &ServiceContext,
    user_id: Uuid,
    filter: NotificationFilter,
    page: PageParams,
) -> ServiceResult<Paginated<Notification>> {
    intercept("notifications.list", async move {
        let items = Notification::list_for_user(
            &ctx.db,
            user_id,
            filter.unread_only,
            page.limit(),
            page.offset(),
        )
        .await?;
        let total = Notification::count_for_user(&ctx.db, user_id, filter.unread_only).await?;

        Ok(Paginated::new(items, page, total))
    })
    .await
}

pub async fn unread_count(ctx: &ServiceContext, user_id: Uuid) -> ServiceResult<UnreadCount> {
    intercept("notifications.unread_count", async move {
        let unread = Notification::unread_count(&ctx.db, user_id).await?;
        Ok(UnreadCount { unread })
    })
    .await
}

pub async fn mark_read(ctx: &ServiceContext, user_id: Uuid, id: Uuid) -> ServiceResult<Notification> {
    intercept("notifications.mark_read", async move {
        Notification::mark_read(&ctx.db, user_id, id)
            .await?
            .ok_or(ServiceError::NotFound("Notification"))
    })
    .await
}

pub async fn mark_all_read(ctx: &ServiceContext, user_id: Uuid) -> ServiceResult<MarkedRead> {
    intercept("notifications.mark_all_read", async move {
        let updated = Notification::mark_all_read(&ctx.db, user_id).await?;
        Ok(MarkedRead { updated })
    })
    .await
}

pub async fn delete(ctx: &ServiceContext, user_id: Uuid, id: Uuid) -> ServiceResult<()> {
    intercept("notifications.delete", async move {
        if Notification::delete(&ctx.db, user_id, id).await? {
            Ok(())
        } else {
            Err(ServiceError::NotFound("Notification"))
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_defaults() {
        let filter: NotificationFilter = serde_json::from_str("{}").unwrap();
        assert!(!filter.unread_only);
    }
}

//! Platform back-office
//!
//! Every operation requires the platform admin role. Admins cannot ban,
//! demote or delete themselves.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{clean_optional, intercept, validate, ServiceContext, ServiceError, ServiceResult};
use crate::{
    auth::{authorization::require_admin, middleware::AuthContext},
    models::{
        email_job::{EmailJob, JobStatus},
        file::StoredFile,
        organization::{Organization, OrganizationSummary},
        project::Project,
        subscription::Subscription,
        user::{User, UserRole},
    },
    pagination::{PageParams, Paginated},
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetRoleInput {
    pub role: UserRole,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct BanInput {
    #[validate(length(max = 500, message = "Reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PlatformStats {
    pub users: i64,
    pub banned_users: i64,
    pub organizations: i64,
    pub projects: i64,
    pub active_subscriptions: i64,
    pub storage_bytes: i64,
    pub pending_email_jobs: i64,
    pub failed_email_jobs: i64,
}

fn not_self(auth: &AuthContext, user_id: Uuid, action: &str) -> ServiceResult<()> {
    if auth.user_id == user_id {
        return Err(ServiceError::Conflict(format!("You cannot {} yourself", action)));
    }
    Ok(())
}

fn found(user: Option<User>) -> ServiceResult<User> {
    user.ok_or(ServiceError::NotFound("User"))
}

pub async fn list_users(
    ctx: &ServiceContext,
    auth: &AuthContext,
    query: SearchQuery,
    page: PageParams,
) -> ServiceResult<Paginated<User>> {
    intercept("admin.list_users", async move {
        require_admin(auth)?;
        let search = clean_optional(query.search);

        let items = User::list(&ctx.db, search.as_deref(), page.limit(), page.offset()).await?;
        let total = User::count(&ctx.db, search.as_deref()).await?;

        Ok(Paginated::new(items, page, total))
    })
    .await
}

pub async fn set_role(
    ctx: &ServiceContext,
    auth: &AuthContext,
    user_id: Uuid,
    input: SetRoleInput,
) -> ServiceResult<User> {
    intercept("admin.set_role", async move {
        require_admin(auth)?;
        not_self(auth, user_id, "change the role of")?;

        let user = found(User::set_role(&ctx.db, user_id, input.role).await?)?;
        tracing::info!(
            user_id = %user.id,
            role = input.role.as_str(),
            admin_id = %auth.user_id,
            "User role changed"
        );
        Ok(user)
    })
    .await
}

pub async fn ban(
    ctx: &ServiceContext,
    auth: &AuthContext,
    user_id: Uuid,
    input: BanInput,
) -> ServiceResult<User> {
    intercept("admin.ban", async move {
        require_admin(auth)?;
        validate(&input)?;
        not_self(auth, user_id, "ban")?;

        let user = found(User::set_banned(&ctx.db, user_id, true, clean_optional(input.reason)).await?)?;
        tracing::info!(user_id = %user.id, admin_id = %auth.user_id, "User banned");
        Ok(user)
    })
    .await
}

pub async fn unban(ctx: &ServiceContext, auth: &AuthContext, user_id: Uuid) -> ServiceResult<User> {
    intercept("admin.unban", async move {
        require_admin(auth)?;

        let user = found(User::set_banned(&ctx.db, user_id, false, None).await?)?;
        tracing::info!(user_id = %user.id, admin_id = %auth.user_id, "User unbanned");
        Ok(user)
    })
    .await
}

/// Deletes a user. Organizations they owned alone are left without an
/// owner; platform admins can still manage them.
pub async fn delete_user(ctx: &ServiceContext, auth: &AuthContext, user_id: Uuid) -> ServiceResult<()> {
    intercept("admin.delete_user", async move {
        require_admin(auth)?;
        not_self(auth, user_id, "delete")?;

        if !User::delete(&ctx.db, user_id).await? {
            return Err(ServiceError::NotFound("User"));
        }
        tracing::info!(user_id = %user_id, admin_id = %auth.user_id, "User deleted");
        Ok(())
    })
    .await
}

pub async fn list_organizations(
    ctx: &ServiceContext,
    auth: &AuthContext,
    query: SearchQuery,
    page: PageParams,
) -> ServiceResult<Paginated<OrganizationSummary>> {
    intercept("admin.list_organizations", async move {
        require_admin(auth)?;
        let search = clean_optional(query.search);

        let items =
            Organization::list(&ctx.db, search.as_deref(), page.limit(), page.offset()).await?;
        let total = Organization::count(&ctx.db, search.as_deref()).await?;

        Ok(Paginated::new(items, page, total))
    })
    .await
}

pub async fn stats(ctx: &ServiceContext, auth: &AuthContext) -> ServiceResult<PlatformStats> {
    intercept("admin.stats", async move {
        require_admin(auth)?;
        let db = &ctx.db;

        Ok(PlatformStats {
            users: User::count(db, None).await?,
            banned_users: User::count_banned(db).await?,
            organizations: Organization::count(db, None).await?,
            projects: Project::count_all(db).await?,
            active_subscriptions: Subscription::count_active(db).await?,
            storage_bytes: StoredFile::total_bytes(db).await?,
            pending_email_jobs: EmailJob::count_by_status(db, JobStatus::Pending).await?,
            failed_email_jobs: EmailJob::count_by_status(db, JobStatus::Failed).await?,
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> AuthContext {
        AuthContext {
            user_id: Uuid::new_v4(),
            role: UserRole::Admin,
            organization_id: None,
        }
    }

    #[test]
    fn test_not_self() {
        let auth = admin();
        let err = not_self(&auth, auth.user_id, "ban").unwrap_err();
        assert_eq!(err.to_string(), "You cannot ban yourself");
        assert!(not_self(&auth, Uuid::new_v4(), "ban").is_ok());
    }

    #[test]
    fn test_set_role_input() {
        let input: SetRoleInput = serde_json::from_str(r#"{"role": "admin"}"#).unwrap();
        assert_eq!(input.role, UserRole::Admin);
        assert!(serde_json::from_str::<SetRoleInput>(r#"{"role": "root"}"#).is_err());
    }
}

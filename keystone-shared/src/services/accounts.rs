//! Registration, sign-in and profile
//!
//! Registering creates the user, a personal organization owned by them, and
//! two onboarding email jobs: a welcome email right away and a follow-up
//! after the configured delay.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{clean_optional, intercept, nullable, validate, ServiceContext, ServiceError, ServiceResult};
use crate::{
    auth::{
        authorization::resolve_org_actor,
        jwt::{issue_token_pair, validate_refresh_token, TokenPair},
        middleware::AuthContext,
        password,
    },
    models::{
        email_job::{EmailJob, EmailJobKind},
        membership::{CreateMembership, Membership, MembershipRole},
        organization::{slugify, CreateOrganization, Organization, OrganizationWithRole},
        user::{normalize_email, CreateUser, UpdateUser, User},
    },
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,

    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub name: Option<String>,

    #[validate(length(
        min = 1,
        max = 100,
        message = "Organization name must be 1-100 characters"
    ))]
    pub organization_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginInput {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordInput {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProfileInput {
    #[serde(default, deserialize_with = "nullable")]
    pub name: Option<Option<String>>,

    #[serde(default, deserialize_with = "nullable")]
    pub avatar_url: Option<Option<String>>,
}

/// Tokens plus the account they were issued for
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub user: User,
    pub organization_id: Option<Uuid>,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub user: User,
    pub organizations: Vec<OrganizationWithRole>,
}

/// Name of the organization created at sign-up
pub fn workspace_name(name: Option<&str>, email: &str) -> String {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("{}'s Workspace", name),
        None => {
            let local = email.split('@').next().unwrap_or(email);
            format!("{}'s Workspace", local)
        }
    }
}

/// Loads a user who may act: present and not banned.
pub async fn load_active_user(ctx: &ServiceContext, user_id: Uuid) -> ServiceResult<User> {
    let user = User::find_by_id(&ctx.db, user_id)
        .await?
        .ok_or_else(|| ServiceError::Unauthorized("Account no longer exists".to_string()))?;

    if user.banned {
        return Err(ServiceError::Unauthorized("Account is suspended".to_string()));
    }

    Ok(user)
}

fn session(ctx: &ServiceContext, user: User, organization_id: Option<Uuid>) -> ServiceResult<Session> {
    let tokens = issue_token_pair(user.id, user.role, organization_id, &ctx.settings.jwt_secret)?;
    Ok(Session {
        user,
        organization_id,
        tokens,
    })
}

async fn default_organization(ctx: &ServiceContext, user_id: Uuid) -> ServiceResult<Option<Uuid>> {
    Ok(Membership::list_by_user(&ctx.db, user_id)
        .await?
        .first()
        .map(|m| m.organization_id))
}

async fn schedule_onboarding(ctx: &ServiceContext, user_id: Uuid) {
    let now = Utc::now();
    let jobs = [
        (EmailJobKind::Welcome, now),
        (EmailJobKind::FollowUp, now + ctx.settings.follow_up_delay),
    ];

    for (kind, run_at) in jobs {
        if let Err(e) = EmailJob::enqueue(&ctx.db, user_id, kind, run_at).await {
            tracing::warn!(
                user_id = %user_id,
                kind = kind.as_str(),
                error = %e,
                "Failed to schedule onboarding email"
            );
        }
    }
}

pub async fn register(ctx: &ServiceContext, input: RegisterInput) -> ServiceResult<Session> {
    intercept("accounts.register", async move {
        validate(&input)?;
        password::validate_password_strength(&input.password)
            .map_err(|message| ServiceError::invalid("password", message))?;

        let email = normalize_email(&input.email);
        if User::find_by_email(&ctx.db, &email).await?.is_some() {
            return Err(ServiceError::Conflict("Email is already registered".to_string()));
        }

        let name = clean_optional(input.name);
        let password_hash = password::hash_password(&input.password)?;

        let user = User::create(
            &ctx.db,
            CreateUser {
                email: email.clone(),
                password_hash,
                name: name.clone(),
            },
        )
        .await?;

        let org_name = clean_optional(input.organization_name)
            .unwrap_or_else(|| workspace_name(name.as_deref(), &email));

        let organization = match create_owned_organization(ctx, user.id, org_name).await {
            Ok(org) => org,
            Err(e) => {
                // Don't leave an account without a workspace behind
                if let Err(cleanup) = User::delete(&ctx.db, user.id).await {
                    tracing::error!(user_id = %user.id, error = %cleanup, "Failed to roll back user");
                }
                return Err(e);
            }
        };

        schedule_onboarding(ctx, user.id).await;

        tracing::info!(
            user_id = %user.id,
            organization_id = %organization.id,
            "User registered"
        );

        session(ctx, user, Some(organization.id))
    })
    .await
}

/// Creates an organization with `owner_id` as its owner. The organization
/// is removed again if the membership cannot be written.
pub(crate) async fn create_owned_organization(
    ctx: &ServiceContext,
    owner_id: Uuid,
    name: String,
) -> ServiceResult<Organization> {
    let slug = Organization::available_slug(&ctx.db, &slugify(&name)).await?;
    let organization = Organization::create(
        &ctx.db,
        CreateOrganization {
            name,
            slug,
            logo_url: None,
        },
    )
    .await?;

    let membership = Membership::create(
        &ctx.db,
        CreateMembership {
            organization_id: organization.id,
            user_id: owner_id,
            role: MembershipRole::Owner,
        },
    )
    .await;

    if let Err(e) = membership {
        if let Err(cleanup) = Organization::delete(&ctx.db, organization.id).await {
            tracing::error!(organization_id = %organization.id, error = %cleanup, "Failed to roll back organization");
        }
        return Err(e.into());
    }

    Ok(organization)
}

pub async fn authenticate(ctx: &ServiceContext, input: LoginInput) -> ServiceResult<Session> {
    intercept("accounts.authenticate", async move {
        validate(&input)?;

        let user = User::find_by_email(&ctx.db, &input.email)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

        if !password::verify_password(&input.password, &user.password_hash)? {
            return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        if user.banned {
            tracing::info!(user_id = %user.id, "Banned user attempted to sign in");
            return Err(ServiceError::Unauthorized("Account is suspended".to_string()));
        }

        if password::needs_rehash(&user.password_hash) {
            let password_hash = password::hash_password(&input.password)?;
            User::update(
                &ctx.db,
                user.id,
                UpdateUser {
                    password_hash: Some(password_hash),
                    ..Default::default()
                },
            )
            .await?;
        }

        User::update_last_login(&ctx.db, user.id).await?;
        let organization_id = default_organization(ctx, user.id).await?;

        session(ctx, user, organization_id)
    })
    .await
}

/// Exchanges a refresh token for a new pair. Role and membership are read
/// fresh, so a demoted admin or a removed member loses access here.
pub async fn refresh(ctx: &ServiceContext, refresh_token: &str) -> ServiceResult<Session> {
    intercept("accounts.refresh", async move {
        let claims = validate_refresh_token(refresh_token, &ctx.settings.jwt_secret)
            .map_err(|e| ServiceError::Unauthorized(e.to_string()))?;

        let user = load_active_user(ctx, claims.sub).await?;

        let still_valid = match claims.org_id {
            Some(org_id) if user.is_admin() => {
                Organization::find_by_id(&ctx.db, org_id).await?.is_some()
            }
            Some(org_id) => Membership::get_role(&ctx.db, org_id, user.id)
                .await?
                .is_some(),
            None => false,
        };

        let organization_id = if still_valid {
            claims.org_id
        } else {
            default_organization(ctx, user.id).await?
        };

        session(ctx, user, organization_id)
    })
    .await
}

/// Issues tokens scoped to another organization the caller belongs to.
pub async fn switch_organization(
    ctx: &ServiceContext,
    auth: &AuthContext,
    organization_id: Uuid,
) -> ServiceResult<Session> {
    intercept("accounts.switch_organization", async move {
        let user = load_active_user(ctx, auth.user_id).await?;

        Organization::find_by_id(&ctx.db, organization_id)
            .await?
            .ok_or(ServiceError::NotFound("Organization"))?;
        resolve_org_actor(&ctx.db, organization_id, auth).await?;

        session(ctx, user, Some(organization_id))
    })
    .await
}

pub async fn change_password(
    ctx: &ServiceContext,
    user_id: Uuid,
    input: ChangePasswordInput,
) -> ServiceResult<()> {
    intercept("accounts.change_password", async move {
        let user = load_active_user(ctx, user_id).await?;

        if !password::verify_password(&input.current_password, &user.password_hash)? {
            return Err(ServiceError::invalid(
                "current_password",
                "Current password is incorrect",
            ));
        }
        if input.current_password == input.new_password {
            return Err(ServiceError::invalid(
                "new_password",
                "New password must differ from the current one",
            ));
        }
        password::validate_password_strength(&input.new_password)
            .map_err(|message| ServiceError::invalid("new_password", message))?;

        let password_hash = password::hash_password(&input.new_password)?;
        User::update(
            &ctx.db,
            user.id,
            UpdateUser {
                password_hash: Some(password_hash),
                ..Default::default()
            },
        )
        .await?;

        tracing::info!(user_id = %user.id, "Password changed");
        Ok(())
    })
    .await
}

pub async fn profile(ctx: &ServiceContext, user_id: Uuid) -> ServiceResult<Profile> {
    intercept("accounts.profile", async move {
        let user = load_active_user(ctx, user_id).await?;
        let organizations = Organization::list_for_user(&ctx.db, user.id).await?;

        Ok(Profile {
            user,
            organizations,
        })
    })
    .await
}

pub async fn update_profile(
    ctx: &ServiceContext,
    user_id: Uuid,
    input: UpdateProfileInput,
) -> ServiceResult<User> {
    intercept("accounts.update_profile", async move {
        if let Some(Some(name)) = &input.name {
            if name.trim().chars().count() > 100 {
                return Err(ServiceError::invalid("name", "Name must be at most 100 characters"));
            }
        }
        if let Some(Some(url)) = &input.avatar_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ServiceError::invalid("avatar_url", "Avatar must be an http(s) URL"));
            }
        }

        load_active_user(ctx, user_id).await?;

        User::update(
            &ctx.db,
            user_id,
            UpdateUser {
                password_hash: None,
                name: input.name.map(clean_optional),
                avatar_url: input.avatar_url.map(clean_optional),
            },
        )
        .await?
        .ok_or(ServiceError::NotFound("User"))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_name() {
        assert_eq!(workspace_name(Some("Ada"), "ada@example.com"), "Ada's Workspace");
        assert_eq!(workspace_name(Some("  "), "ada@example.com"), "ada's Workspace");
        assert_eq!(workspace_name(None, "grace@example.com"), "grace's Workspace");
    }

    #[test]
    fn test_register_input_validation() {
        let input = RegisterInput {
            email: "not-an-email".into(),
            password: "Str0ng!Pass".into(),
            name: Some("x".repeat(101)),
            organization_name: None,
        };

        let Err(ServiceError::Validation(errors)) = validate(&input) else {
            panic!("expected validation errors");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "name"]);
    }

    #[test]
    fn test_update_profile_input_nullable() {
        let input: UpdateProfileInput = serde_json::from_str(r#"{"avatar_url": null}"#).unwrap();
        assert_eq!(input.name, None);
        assert_eq!(input.avatar_url, Some(None));
    }
}

//! Organizations, memberships and invitations
//!
//! Role rules:
//! - Admins manage members and invitations, but only an Owner may grant,
//!   change or remove the Owner role.
//! - An organization always keeps at least one Owner: the last one can be
//!   neither demoted nor removed, and cannot leave.
//! - Anyone may leave an organization on their own.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{
    accounts::create_owned_organization,
    clean_optional, intercept,
    notifications::{kinds, notify},
    nullable, validate, ServiceContext, ServiceError, ServiceResult,
};
use crate::{
    auth::{
        authorization::{require_org_role, AuthzError, OrgActor},
        token::{generate_token, hash_token, validate_token_format, INVITE_PREFIX},
    },
    email::templates,
    limits,
    models::{
        file::StoredFile,
        invitation::{CreateInvitation, Invitation},
        membership::{MemberWithUser, Membership, MembershipRole},
        notification::CreateNotification,
        organization::{is_valid_slug, Organization, OrganizationWithRole, UpdateOrganization},
        user::{normalize_email, User},
    },
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrganizationInput {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateOrganizationInput {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    pub slug: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub logo_url: Option<Option<String>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InviteInput {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[serde(default = "default_invite_role")]
    pub role: MembershipRole,
}

fn default_invite_role() -> MembershipRole {
    MembershipRole::Member
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMemberRoleInput {
    pub role: MembershipRole,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrganizationDetails {
    #[serde(flatten)]
    pub organization: Organization,
    pub role: MembershipRole,
    pub member_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptedInvitation {
    pub organization: Organization,
    pub role: MembershipRole,
}

fn invitation_url(ctx: &ServiceContext, token: &str) -> String {
    format!("{}/invitations/accept?token={}", ctx.settings.app_url, token)
}

/// Only an Owner may touch the Owner role, on either side of a change.
fn check_owner_rule(
    actor: &OrgActor,
    current: Option<MembershipRole>,
    requested: Option<MembershipRole>,
) -> ServiceResult<()> {
    let touches_owner = current == Some(MembershipRole::Owner) || requested == Some(MembershipRole::Owner);
    if touches_owner {
        require_org_role(actor, MembershipRole::Owner)?;
    }
    Ok(())
}

async fn ensure_not_last_owner(ctx: &ServiceContext, organization_id: Uuid) -> ServiceResult<()> {
    let owners = Membership::count_by_role(&ctx.db, organization_id, MembershipRole::Owner).await?;
    if owners <= 1 {
        return Err(ServiceError::Conflict(
            "An organization must keep at least one owner".to_string(),
        ));
    }
    Ok(())
}

async fn load_organization(ctx: &ServiceContext, id: Uuid) -> ServiceResult<Organization> {
    Organization::find_by_id(&ctx.db, id)
        .await?
        .ok_or(ServiceError::NotFound("Organization"))
}

pub async fn create(
    ctx: &ServiceContext,
    user_id: Uuid,
    input: CreateOrganizationInput,
) -> ServiceResult<Organization> {
    intercept("organizations.create", async move {
        validate(&input)?;
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::invalid("name", "Name is required"));
        }

        let organization = create_owned_organization(ctx, user_id, name).await?;
        tracing::info!(organization_id = %organization.id, user_id = %user_id, "Organization created");
        Ok(organization)
    })
    .await
}

pub async fn list_for_user(
    ctx: &ServiceContext,
    user_id: Uuid,
) -> ServiceResult<Vec<OrganizationWithRole>> {
    intercept("organizations.list_for_user", async move {
        Ok(Organization::list_for_user(&ctx.db, user_id).await?)
    })
    .await
}

pub async fn get(ctx: &ServiceContext, actor: &OrgActor) -> ServiceResult<OrganizationDetails> {
    intercept("organizations.get", async move {
        let organization = load_organization(ctx, actor.organization_id).await?;
        let member_count = Membership::count_by_organization(&ctx.db, organization.id).await?;

        Ok(OrganizationDetails {
            organization,
            role: actor.role,
            member_count,
        })
    })
    .await
}

pub async fn update(
    ctx: &ServiceContext,
    actor: &OrgActor,
    input: UpdateOrganizationInput,
) -> ServiceResult<Organization> {
    intercept("organizations.update", async move {
        require_org_role(actor, MembershipRole::Admin)?;
        validate(&input)?;

        let slug = input.slug.map(|s| s.trim().to_lowercase());
        if let Some(slug) = &slug {
            if !is_valid_slug(slug) {
                return Err(ServiceError::invalid(
                    "slug",
                    "Slug must be 2-48 characters of lowercase letters, digits and single hyphens",
                ));
            }
        }

        Organization::update(
            &ctx.db,
            actor.organization_id,
            UpdateOrganization {
                name: input.name.map(|n| n.trim().to_string()),
                slug,
                logo_url: input.logo_url.map(clean_optional),
            },
        )
        .await?
        .ok_or(ServiceError::NotFound("Organization"))
    })
    .await
}

/// Deletes the organization and everything in it. Stored objects are
/// removed first; failures there are logged and do not block deletion.
pub async fn delete(ctx: &ServiceContext, actor: &OrgActor) -> ServiceResult<()> {
    intercept("organizations.delete", async move {
        require_org_role(actor, MembershipRole::Owner)?;

        let keys = StoredFile::storage_keys_by_organization(&ctx.db, actor.organization_id).await?;
        for key in &keys {
            if let Err(e) = ctx.storage.delete(key).await {
                tracing::warn!(key = %key, error = %e, "Failed to delete stored object");
            }
        }

        if !Organization::delete(&ctx.db, actor.organization_id).await? {
            return Err(ServiceError::NotFound("Organization"));
        }

        tracing::info!(
            organization_id = %actor.organization_id,
            user_id = %actor.user_id,
            objects = keys.len(),
            "Organization deleted"
        );
        Ok(())
    })
    .await
}

pub async fn list_members(
    ctx: &ServiceContext,
    actor: &OrgActor,
) -> ServiceResult<Vec<MemberWithUser>> {
    intercept("organizations.list_members", async move {
        Ok(Membership::list_by_organization(&ctx.db, actor.organization_id).await?)
    })
    .await
}

pub async fn update_member_role(
    ctx: &ServiceContext,
    actor: &OrgActor,
    user_id: Uuid,
    input: UpdateMemberRoleInput,
) -> ServiceResult<Membership> {
    intercept("organizations.update_member_role", async move {
        require_org_role(actor, MembershipRole::Admin)?;

        let current = Membership::get_role(&ctx.db, actor.organization_id, user_id)
            .await?
            .ok_or(ServiceError::NotFound("Member"))?;
        check_owner_rule(actor, Some(current), Some(input.role))?;

        if current == input.role {
            return Membership::find(&ctx.db, actor.organization_id, user_id)
                .await?
                .ok_or(ServiceError::NotFound("Member"));
        }
        if current == MembershipRole::Owner {
            ensure_not_last_owner(ctx, actor.organization_id).await?;
        }

        let membership = Membership::update_role(&ctx.db, actor.organization_id, user_id, input.role)
            .await?
            .ok_or(ServiceError::NotFound("Member"))?;

        if user_id != actor.user_id {
            notify(
                ctx,
                CreateNotification {
                    user_id,
                    organization_id: Some(actor.organization_id),
                    kind: kinds::MEMBER_ROLE_CHANGED.to_string(),
                    title: format!("Your role is now {}", input.role.as_str()),
                    body: None,
                    link: None,
                },
            )
            .await;
        }

        Ok(membership)
    })
    .await
}

/// Removes a member, or lets the caller leave when `user_id` is their own.
pub async fn remove_member(ctx: &ServiceContext, actor: &OrgActor, user_id: Uuid) -> ServiceResult<()> {
    intercept("organizations.remove_member", async move {
        let leaving = user_id == actor.user_id;
        if !leaving {
            require_org_role(actor, MembershipRole::Admin)?;
        }

        let current = Membership::get_role(&ctx.db, actor.organization_id, user_id)
            .await?
            .ok_or(ServiceError::NotFound("Member"))?;

        if current == MembershipRole::Owner {
            if !leaving {
                check_owner_rule(actor, Some(current), None)?;
            }
            ensure_not_last_owner(ctx, actor.organization_id).await?;
        }

        if !Membership::delete(&ctx.db, actor.organization_id, user_id).await? {
            return Err(ServiceError::NotFound("Member"));
        }

        tracing::info!(
            organization_id = %actor.organization_id,
            user_id = %user_id,
            removed_by = %actor.user_id,
            "Member removed"
        );
        Ok(())
    })
    .await
}

pub async fn invite(ctx: &ServiceContext, actor: &OrgActor, input: InviteInput) -> ServiceResult<Invitation> {
    intercept("organizations.invite", async move {
        require_org_role(actor, MembershipRole::Admin)?;
        validate(&input)?;
        check_owner_rule(actor, None, Some(input.role))?;

        let email = normalize_email(&input.email);
        let organization = load_organization(ctx, actor.organization_id).await?;
        let existing_user = User::find_by_email(&ctx.db, &email).await?;

        if let Some(user) = &existing_user {
            if Membership::get_role(&ctx.db, organization.id, user.id).await?.is_some() {
                return Err(ServiceError::Conflict("User is already a member".to_string()));
            }
        }

        Invitation::delete_expired_for_email(&ctx.db, organization.id, &email).await?;
        limits::check_member_limit(&ctx.db, organization.id).await?;

        let (token, token_hash) = generate_token(INVITE_PREFIX);
        let invitation = Invitation::create(
            &ctx.db,
            CreateInvitation {
                organization_id: organization.id,
                email: email.clone(),
                role: input.role,
                token_hash,
                invited_by: actor.user_id,
            },
        )
        .await?;

        let inviter = User::find_by_id(&ctx.db, actor.user_id).await?;
        let inviter_name = inviter
            .as_ref()
            .map(|u| u.display_name().to_string())
            .unwrap_or_else(|| "A teammate".to_string());

        let message = templates::invitation(
            &email,
            &organization.name,
            &inviter_name,
            input.role.as_str(),
            &invitation_url(ctx, &token),
        );

        // The token only exists in this email; without it the invitation is useless
        if let Err(e) = ctx.mailer.send(&message).await {
            if let Err(cleanup) = Invitation::delete(&ctx.db, organization.id, invitation.id).await {
                tracing::error!(invitation_id = %invitation.id, error = %cleanup, "Failed to roll back invitation");
            }
            return Err(e.into());
        }

        if let Some(user) = existing_user {
            notify(
                ctx,
                CreateNotification {
                    user_id: user.id,
                    organization_id: Some(organization.id),
                    kind: kinds::INVITATION.to_string(),
                    title: format!("You've been invited to join {}", organization.name),
                    body: Some(format!("{} invited you as {}", inviter_name, input.role.as_str())),
                    link: None,
                },
            )
            .await;
        }

        tracing::info!(
            organization_id = %organization.id,
            invitation_id = %invitation.id,
            role = input.role.as_str(),
            "Invitation sent"
        );
        Ok(invitation)
    })
    .await
}

pub async fn list_invitations(ctx: &ServiceContext, actor: &OrgActor) -> ServiceResult<Vec<Invitation>> {
    intercept("organizations.list_invitations", async move {
        require_org_role(actor, MembershipRole::Admin)?;
        Ok(Invitation::list_pending(&ctx.db, actor.organization_id).await?)
    })
    .await
}

pub async fn revoke_invitation(
    ctx: &ServiceContext,
    actor: &OrgActor,
    invitation_id: Uuid,
) -> ServiceResult<()> {
    intercept("organizations.revoke_invitation", async move {
        require_org_role(actor, MembershipRole::Admin)?;

        if Invitation::delete(&ctx.db, actor.organization_id, invitation_id).await? {
            Ok(())
        } else {
            Err(ServiceError::NotFound("Invitation"))
        }
    })
    .await
}

/// Accepts an invitation for the signed-in user, whose email must match
/// the invited address.
pub async fn accept_invitation(
    ctx: &ServiceContext,
    user_id: Uuid,
    token: &str,
) -> ServiceResult<AcceptedInvitation> {
    intercept("organizations.accept_invitation", async move {
        if !validate_token_format(token, INVITE_PREFIX) {
            return Err(ServiceError::NotFound("Invitation"));
        }

        let invitation = Invitation::find_by_token_hash(&ctx.db, &hash_token(token))
            .await?
            .ok_or(ServiceError::NotFound("Invitation"))?;

        if invitation.accepted_at.is_some() {
            return Err(ServiceError::Conflict("Invitation was already accepted".to_string()));
        }
        if invitation.is_expired() {
            return Err(ServiceError::invalid("token", "Invitation has expired"));
        }

        let user = User::find_by_id(&ctx.db, user_id)
            .await?
            .ok_or(ServiceError::NotFound("User"))?;
        if normalize_email(&user.email) != invitation.email {
            return Err(ServiceError::Forbidden(AuthzError::NotAuthorized));
        }

        if Invitation::accept(&ctx.db, &invitation, user_id).await?.is_none() {
            return Err(ServiceError::Conflict("Invitation was already accepted".to_string()));
        }

        let organization = load_organization(ctx, invitation.organization_id).await?;
        tracing::info!(
            organization_id = %organization.id,
            user_id = %user_id,
            role = invitation.role.as_str(),
            "Invitation accepted"
        );

        Ok(AcceptedInvitation {
            organization,
            role: invitation.role,
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: MembershipRole) -> OrgActor {
        OrgActor {
            user_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            role,
            via_platform_admin: false,
        }
    }

    #[test]
    fn test_owner_rule() {
        let admin = actor(MembershipRole::Admin);
        let owner = actor(MembershipRole::Owner);

        assert!(check_owner_rule(&admin, Some(MembershipRole::Member), Some(MembershipRole::Admin)).is_ok());
        assert!(check_owner_rule(&admin, Some(MembershipRole::Member), Some(MembershipRole::Owner)).is_err());
        assert!(check_owner_rule(&admin, Some(MembershipRole::Owner), Some(MembershipRole::Member)).is_err());
        assert!(check_owner_rule(&admin, None, Some(MembershipRole::Owner)).is_err());
        assert!(check_owner_rule(&owner, Some(MembershipRole::Owner), Some(MembershipRole::Admin)).is_ok());
    }

    #[test]
    fn test_invite_input_defaults_to_member() {
        let input: InviteInput = serde_json::from_str(r#"{"email": "a@example.com"}"#).unwrap();
        assert_eq!(input.role, MembershipRole::Member);
        assert!(validate(&input).is_ok());
    }
}

/// Organization endpoints
///
/// # Endpoints
///
/// - `GET|POST /v1/organizations`
/// - `GET|PATCH|DELETE /v1/organizations/:org_id`
/// - `GET /v1/organizations/:org_id/members`
/// - `PATCH|DELETE /v1/organizations/:org_id/members/:user_id`
/// - `GET|POST /v1/organizations/:org_id/invitations`
/// - `DELETE /v1/organizations/:org_id/invitations/:invitation_id`
/// - `POST /v1/invitations/accept`
///
/// Role requirements are enforced by the organization service; the handlers
/// only resolve the caller's role.

use crate::{
    dal::Dal,
    error::ApiResult,
    extract::{Json, Path},
    response::{ApiResponse, Deleted},
};
use keystone_shared::{
    models::{
        invitation::Invitation,
        membership::{MemberWithUser, Membership},
        organization::{Organization, OrganizationWithRole},
    },
    services::organizations::{
        self, AcceptedInvitation, CreateOrganizationInput, InviteInput, OrganizationDetails,
        UpdateMemberRoleInput, UpdateOrganizationInput,
    },
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct AcceptInvitationRequest {
    pub token: String,
}

pub async fn list(dal: Dal) -> ApiResult<ApiResponse<Vec<OrganizationWithRole>>> {
    dal.current_user().await?;
    let organizations = organizations::list_for_user(dal.services(), dal.user_id()).await?;
    Ok(ApiResponse::ok(organizations))
}

/// Create an organization owned by the caller
///
/// Errors: 422 for an invalid name.
pub async fn create(
    dal: Dal,
    Json(req): Json<CreateOrganizationInput>,
) -> ApiResult<ApiResponse<Organization>> {
    dal.current_user().await?;
    let organization = organizations::create(dal.services(), dal.user_id(), req).await?;
    Ok(ApiResponse::created(organization))
}

pub async fn get(dal: Dal, Path(org_id): Path<Uuid>) -> ApiResult<ApiResponse<OrganizationDetails>> {
    let actor = dal.actor(org_id).await?;
    let details = organizations::get(dal.services(), &actor).await?;
    Ok(ApiResponse::ok(details))
}

pub async fn update(
    dal: Dal,
    Path(org_id): Path<Uuid>,
    Json(req): Json<UpdateOrganizationInput>,
) -> ApiResult<ApiResponse<Organization>> {
    let actor = dal.actor(org_id).await?;
    let organization = organizations::update(dal.services(), &actor, req).await?;
    Ok(ApiResponse::ok(organization))
}

/// Delete an organization (owners only)
///
/// Also removes its stored files from the storage provider.
pub async fn delete(dal: Dal, Path(org_id): Path<Uuid>) -> ApiResult<ApiResponse<Deleted>> {
    let actor = dal.actor(org_id).await?;
    organizations::delete(dal.services(), &actor).await?;
    Ok(ApiResponse::deleted())
}

pub async fn list_members(dal: Dal, Path(org_id): Path<Uuid>) -> ApiResult<ApiResponse<Vec<MemberWithUser>>> {
    let actor = dal.actor(org_id).await?;
    let members = organizations::list_members(dal.services(), &actor).await?;
    Ok(ApiResponse::ok(members))
}

/// Change a member's role
///
/// Only owners grant or revoke ownership, and the last owner cannot be
/// demoted (409).
pub async fn update_member(
    dal: Dal,
    Path((org_id, user_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateMemberRoleInput>,
) -> ApiResult<ApiResponse<Membership>> {
    let actor = dal.actor(org_id).await?;
    let membership = organizations::update_member_role(dal.services(), &actor, user_id, req).await?;
    Ok(ApiResponse::ok(membership))
}

/// Remove a member, or leave when `user_id` is the caller
pub async fn remove_member(
    dal: Dal,
    Path((org_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<ApiResponse<Deleted>> {
    let actor = dal.actor(org_id).await?;
    organizations::remove_member(dal.services(), &actor, user_id).await?;
    Ok(ApiResponse::deleted())
}

pub async fn list_invitations(dal: Dal, Path(org_id): Path<Uuid>) -> ApiResult<ApiResponse<Vec<Invitation>>> {
    let actor = dal.actor(org_id).await?;
    let invitations = organizations::list_invitations(dal.services(), &actor).await?;
    Ok(ApiResponse::ok(invitations))
}

/// Invite by email
///
/// The invitation token is only delivered by email. Errors: 402 when the
/// plan's member limit is reached, 409 for existing members or pending
/// invitations, 502 when the email cannot be sent.
pub async fn invite(
    dal: Dal,
    Path(org_id): Path<Uuid>,
    Json(req): Json<InviteInput>,
) -> ApiResult<ApiResponse<Invitation>> {
    let actor = dal.actor(org_id).await?;
    let invitation = organizations::invite(dal.services(), &actor, req).await?;
    Ok(ApiResponse::created(invitation))
}

pub async fn revoke_invitation(
    dal: Dal,
    Path((org_id, invitation_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<ApiResponse<Deleted>> {
    let actor = dal.actor(org_id).await?;
    organizations::revoke_invitation(dal.services(), &actor, invitation_id).await?;
    Ok(ApiResponse::deleted())
}

pub async fn accept_invitation(
    dal: Dal,
    Json(req): Json<AcceptInvitationRequest>,
) -> ApiResult<ApiResponse<AcceptedInvitation>> {
    dal.current_user().await?;
    let accepted = organizations::accept_invitation(dal.services(), dal.user_id(), &req.token).await?;
    Ok(ApiResponse::ok(accepted))
}

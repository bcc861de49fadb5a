//! Role and ownership checks
//!
//! Checks are plain comparisons: the caller's role within an organization
//! (or platform admin status) against the role an action requires, plus an
//! ownership shortcut for resources the caller created.
//!
//! | Permission | Minimum role |
//! |------------|--------------|
//! | Read       | Viewer       |
//! | Write      | Member       |
//! | Manage     | Admin        |
//! | Own        | Owner        |
//!
//! Platform admins resolve to `Owner` in every organization.

use sqlx::PgPool;
use uuid::Uuid;

use super::middleware::AuthContext;
use crate::models::membership::{Membership, MembershipRole};

#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    #[error("Not a member of organization {0}")]
    NotMember(Uuid),

    #[error("Insufficient permissions: requires {required:?}, has {actual:?}")]
    InsufficientRole {
        required: MembershipRole,
        actual: MembershipRole,
    },

    #[error("Not authorized to access this resource")]
    NotAuthorized,

    #[error("Platform administrator access required")]
    AdminRequired,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcePermission {
    Read,
    Write,
    Manage,
    Own,
}

impl ResourcePermission {
    pub fn min_role(&self) -> MembershipRole {
        match self {
            ResourcePermission::Read => MembershipRole::Viewer,
            ResourcePermission::Write => MembershipRole::Member,
            ResourcePermission::Manage => MembershipRole::Admin,
            ResourcePermission::Own => MembershipRole::Owner,
        }
    }
}

/// The caller acting inside one organization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrgActor {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: MembershipRole,
    /// Role granted by platform admin status rather than a membership row
    pub via_platform_admin: bool,
}

/// True when `actual` meets or exceeds `required`.
pub fn has_role(actual: MembershipRole, required: MembershipRole) -> bool {
    actual.has_permission(&required)
}

/// True when the actor created the resource or is an organization admin.
/// Viewers never manage resources, even ones attributed to them.
pub fn can_manage_resource(actor: &OrgActor, owner_id: Option<Uuid>) -> bool {
    if has_role(actor.role, MembershipRole::Admin) {
        return true;
    }

    owner_id == Some(actor.user_id) && has_role(actor.role, MembershipRole::Member)
}

pub fn require_org_role(actor: &OrgActor, required: MembershipRole) -> Result<(), AuthzError> {
    if has_role(actor.role, required) {
        Ok(())
    } else {
        Err(AuthzError::InsufficientRole {
            required,
            actual: actor.role,
        })
    }
}

pub fn require_permission(
    actor: &OrgActor,
    permission: ResourcePermission,
) -> Result<(), AuthzError> {
    require_org_role(actor, permission.min_role())
}

pub fn require_resource_access(actor: &OrgActor, owner_id: Option<Uuid>) -> Result<(), AuthzError> {
    if can_manage_resource(actor, owner_id) {
        Ok(())
    } else {
        Err(AuthzError::NotAuthorized)
    }
}

pub fn require_admin(auth: &AuthContext) -> Result<(), AuthzError> {
    if auth.is_admin() {
        Ok(())
    } else {
        Err(AuthzError::AdminRequired)
    }
}

/// Builds an actor from a role without touching the database.
pub fn actor_from_role(
    auth: &AuthContext,
    organization_id: Uuid,
    membership_role: Option<MembershipRole>,
) -> Result<OrgActor, AuthzError> {
    match (membership_role, auth.is_admin()) {
        (Some(role), false) => Ok(OrgActor {
            user_id: auth.user_id,
            organization_id,
            role,
            via_platform_admin: false,
        }),
        (_, true) => Ok(OrgActor {
            user_id: auth.user_id,
            organization_id,
            role: MembershipRole::Owner,
            via_platform_admin: membership_role != Some(MembershipRole::Owner),
        }),
        (None, false) => Err(AuthzError::NotMember(organization_id)),
    }
}

/// Looks up the caller's membership and returns their actor for the
/// organization.
pub async fn resolve_org_actor(
    pool: &PgPool,
    organization_id: Uuid,
    auth: &AuthContext,
) -> Result<OrgActor, AuthzError> {
    let role = Membership::get_role(pool, organization_id, auth.user_id).await?;
    actor_from_role(auth, organization_id, role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserRole;

    fn auth(role: UserRole) -> AuthContext {
        AuthContext {
            user_id: Uuid::new_v4(),
            role,
            organization_id: None,
        }
    }

    fn actor(role: MembershipRole) -> OrgActor {
        OrgActor {
            user_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            role,
            via_platform_admin: false,
        }
    }

    #[test]
    fn test_resource_permission_min_role() {
        assert_eq!(ResourcePermission::Read.min_role(), MembershipRole::Viewer);
        assert_eq!(ResourcePermission::Write.min_role(), MembershipRole::Member);
        assert_eq!(ResourcePermission::Manage.min_role(), MembershipRole::Admin);
        assert_eq!(ResourcePermission::Own.min_role(), MembershipRole::Owner);
    }

    #[test]
    fn test_permission_matrix() {
        use MembershipRole::*;
        use ResourcePermission::*;

        let expected = [
            (Owner, [true, true, true, true]),
            (Admin, [true, true, true, false]),
            (Member, [true, true, false, false]),
            (Viewer, [true, false, false, false]),
        ];

        for (role, grants) in expected {
            for (permission, granted) in [Read, Write, Manage, Own].into_iter().zip(grants) {
                assert_eq!(
                    require_permission(&actor(role), permission).is_ok(),
                    granted,
                    "{:?} / {:?}",
                    role,
                    permission
                );
            }
        }
    }

    #[test]
    fn test_can_manage_resource() {
        let member = actor(MembershipRole::Member);
        assert!(can_manage_resource(&member, Some(member.user_id)));
        assert!(!can_manage_resource(&member, Some(Uuid::new_v4())));
        assert!(!can_manage_resource(&member, None));

        let admin = actor(MembershipRole::Admin);
        assert!(can_manage_resource(&admin, Some(Uuid::new_v4())));
        assert!(can_manage_resource(&admin, None));

        let viewer = actor(MembershipRole::Viewer);
        assert!(!can_manage_resource(&viewer, Some(viewer.user_id)));
    }

    #[test]
    fn test_insufficient_role_reports_roles() {
        let err = require_org_role(&actor(MembershipRole::Viewer), MembershipRole::Admin).unwrap_err();
        match err {
            AuthzError::InsufficientRole { required, actual } => {
                assert_eq!(required, MembershipRole::Admin);
                assert_eq!(actual, MembershipRole::Viewer);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_actor_from_role() {
        let org = Uuid::new_v4();

        let user = auth(UserRole::User);
        let actor = actor_from_role(&user, org, Some(MembershipRole::Member)).unwrap();
        assert_eq!(actor.role, MembershipRole::Member);
        assert!(!actor.via_platform_admin);

        assert!(matches!(
            actor_from_role(&user, org, None),
            Err(AuthzError::NotMember(id)) if id == org
        ));

        let admin = auth(UserRole::Admin);
        let actor = actor_from_role(&admin, org, None).unwrap();
        assert_eq!(actor.role, MembershipRole::Owner);
        assert!(actor.via_platform_admin);

        let actor = actor_from_role(&admin, org, Some(MembershipRole::Owner)).unwrap();
        assert!(!actor.via_platform_admin);
    }

    #[test]
    fn test_require_admin() {
        assert!(require_admin(&auth(UserRole::Admin)).is_ok());
        assert!(matches!(
            require_admin(&auth(UserRole::User)),
            Err(AuthzError::AdminRequired)
        ));
    }
}

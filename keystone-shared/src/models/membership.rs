//! Organization membership model
//!
//! A membership links a user to an organization with a [`MembershipRole`].
//! Roles form a strict hierarchy used by every authorization check:
//!
//! ```text
//! Owner (4) > Admin (3) > Member (2) > Viewer (1)
//! ```
//!
//! - **Owner**: billing, deleting the organization, managing other owners
//! - **Admin**: members, invitations, any project or task
//! - **Member**: creates projects, tasks and files; edits their own
//! - **Viewer**: read-only

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Role within an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "membership_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MembershipRole {
    Owner,
    Admin,
    Member,
    Viewer,
}

impl MembershipRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipRole::Owner => "owner",
            MembershipRole::Admin => "admin",
            MembershipRole::Member => "member",
            MembershipRole::Viewer => "viewer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(MembershipRole::Owner),
            "admin" => Some(MembershipRole::Admin),
            "member" => Some(MembershipRole::Member),
            "viewer" => Some(MembershipRole::Viewer),
            _ => None,
        }
    }

    /// True when this role is at least as privileged as `required`.
    pub fn has_permission(&self, required: &MembershipRole) -> bool {
        self.permission_level() >= required.permission_level()
    }

    pub fn permission_level(&self) -> u8 {
        match self {
            MembershipRole::Owner => 4,
            MembershipRole::Admin => 3,
            MembershipRole::Member => 2,
            MembershipRole::Viewer => 1,
        }
    }

    pub fn can_manage_members(&self) -> bool {
        self.has_permission(&MembershipRole::Admin)
    }

    pub fn can_manage_billing(&self) -> bool {
        matches!(self, MembershipRole::Owner)
    }

    pub fn can_create_content(&self) -> bool {
        self.has_permission(&MembershipRole::Member)
    }
}

/// Membership row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Membership {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: MembershipRole,
    pub created_at: DateTime<Utc>,
}

/// Member listing row joined with the user's profile
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MemberWithUser {
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: MembershipRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMembership {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    #[serde(default = "default_role")]
    pub role: MembershipRole,
}

fn default_role() -> MembershipRole {
    MembershipRole::Member
}

impl Membership {
    /// Adds a user to an organization.
    ///
    /// # Errors
    ///
    /// Primary-key violation if the user is already a member.
    pub async fn create(pool: &PgPool, data: CreateMembership) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Membership>(
            r#"
            INSERT INTO memberships (organization_id, user_id, role)
            VALUES ($1, $2, $3)
            RETURNING organization_id, user_id, role, created_at
            "#,
        )
        .bind(data.organization_id)
        .bind(data.user_id)
        .bind(data.role)
        .fetch_one(pool)
        .await
    }

    pub async fn find(
        pool: &PgPool,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Membership>(
            r#"
            SELECT organization_id, user_id, role, created_at
            FROM memberships
            WHERE organization_id = $1 AND user_id = $2
            "#,
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn get_role(
        pool: &PgPool,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<MembershipRole>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT role FROM memberships WHERE organization_id = $1 AND user_id = $2",
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn update_role(
        pool: &PgPool,
        organization_id: Uuid,
        user_id: Uuid,
        role: MembershipRole,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Membership>(
            r#"
            UPDATE memberships
            SET role = $3
            WHERE organization_id = $1 AND user_id = $2
            RETURNING organization_id, user_id, role, created_at
            "#,
        )
        .bind(organization_id)
        .bind(user_id)
        .bind(role)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(
        pool: &PgPool,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM memberships WHERE organization_id = $1 AND user_id = $2")
                .bind(organization_id)
                .bind(user_id)
                .execute(pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Members with profile data, owners first.
    pub async fn list_by_organization(
        pool: &PgPool,
        organization_id: Uuid,
    ) -> Result<Vec<MemberWithUser>, sqlx::Error> {
        sqlx::query_as::<_, MemberWithUser>(
            r#"
            SELECT u.id AS user_id, u.email, u.name, u.avatar_url, m.role, m.created_at AS joined_at
            FROM memberships m
            JOIN users u ON u.id = m.user_id
            WHERE m.organization_id = $1
            ORDER BY m.role ASC, m.created_at ASC
            "#,
        )
        .bind(organization_id)
        .fetch_all(pool)
        .await
    }

    pub async fn list_by_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Membership>(
            r#"
            SELECT organization_id, user_id, role, created_at
            FROM memberships
            WHERE user_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn count_by_organization(
        pool: &PgPool,
        organization_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM memberships WHERE organization_id = $1")
            .bind(organization_id)
            .fetch_one(pool)
            .await
    }

    pub async fn count_by_role(
        pool: &PgPool,
        organization_id: Uuid,
        role: MembershipRole,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM memberships WHERE organization_id = $1 AND role = $2",
        )
        .bind(organization_id)
        .bind(role)
        .fetch_one(pool)
        .await
    }

    /// First owner of an organization, used to address billing notices.
    pub async fn find_owner(
        pool: &PgPool,
        organization_id: Uuid,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT user_id FROM memberships
            WHERE organization_id = $1 AND role = 'owner'
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(organization_id)
        .fetch_optional(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_hierarchy() {
        assert!(MembershipRole::Owner.has_permission(&MembershipRole::Owner));
        assert!(MembershipRole::Owner.has_permission(&MembershipRole::Viewer));
        assert!(MembershipRole::Admin.has_permission(&MembershipRole::Member));
        assert!(!MembershipRole::Admin.has_permission(&MembershipRole::Owner));
        assert!(!MembershipRole::Member.has_permission(&MembershipRole::Admin));
        assert!(MembershipRole::Viewer.has_permission(&MembershipRole::Viewer));
        assert!(!MembershipRole::Viewer.has_permission(&MembershipRole::Member));
    }

    #[test]
    fn test_capabilities() {
        assert!(MembershipRole::Owner.can_manage_billing());
        assert!(!MembershipRole::Admin.can_manage_billing());
        assert!(MembershipRole::Admin.can_manage_members());
        assert!(!MembershipRole::Member.can_manage_members());
        assert!(MembershipRole::Member.can_create_content());
        assert!(!MembershipRole::Viewer.can_create_content());
    }

    #[test]
    fn test_role_names() {
        for role in [
            MembershipRole::Owner,
            MembershipRole::Admin,
            MembershipRole::Member,
            MembershipRole::Viewer,
        ] {
            assert_eq!(MembershipRole::from_str(role.as_str()), Some(role));
        }
        assert_eq!(MembershipRole::from_str("superuser"), None);
    }

    #[test]
    fn test_role_serde_is_lowercase() {
        let json = serde_json::to_string(&MembershipRole::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
        let role: MembershipRole = serde_json::from_str("\"viewer\"").unwrap();
        assert_eq!(role, MembershipRole::Viewer);
    }

    #[test]
    fn test_create_membership_default_role() {
        let json = format!(
            r#"{{"organization_id":"{}","user_id":"{}"}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        let data: CreateMembership = serde_json::from_str(&json).unwrap();
        assert_eq!(data.role, MembershipRole::Member);
    }
}

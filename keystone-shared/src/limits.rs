//! Plan limit enforcement
//!
//! An organization is governed by the plan of its live subscription, or the
//! free plan when it has none. Limits of `None` are unlimited.
//!
//! Pending invitations count against the member limit, and archived
//! projects count against the project limit.

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    file::StoredFile, invitation::Invitation, membership::Membership, plan::Plan, project::Project,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    Projects,
    Members,
    StorageBytes,
}

impl LimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitKind::Projects => "projects",
            LimitKind::Members => "members",
            LimitKind::StorageBytes => "storage",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LimitError {
    #[error("Plan limit reached for {} ({current}/{limit})", kind.as_str())]
    LimitExceeded {
        kind: LimitKind,
        limit: i64,
        current: i64,
    },

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Fails when `current + adding` would go past `limit`.
pub fn ensure_within(
    kind: LimitKind,
    limit: Option<i64>,
    current: i64,
    adding: i64,
) -> Result<(), LimitError> {
    match limit {
        Some(limit) if current.saturating_add(adding) > limit => {
            Err(LimitError::LimitExceeded {
                kind,
                limit,
                current,
            })
        }
        _ => Ok(()),
    }
}

pub async fn check_project_limit(pool: &PgPool, organization_id: Uuid) -> Result<(), LimitError> {
    let plan = Plan::for_organization(pool, organization_id).await?;
    let current = Project::count_by_organization(pool, organization_id).await?;

    ensure_within(
        LimitKind::Projects,
        plan.max_projects.map(i64::from),
        current,
        1,
    )
}

pub async fn check_member_limit(pool: &PgPool, organization_id: Uuid) -> Result<(), LimitError> {
    let plan = Plan::for_organization(pool, organization_id).await?;
    let members = Membership::count_by_organization(pool, organization_id).await?;
    let pending = Invitation::count_pending(pool, organization_id).await?;

    ensure_within(
        LimitKind::Members,
        plan.max_members.map(i64::from),
        members + pending,
        1,
    )
}

/// Checks that `incoming_bytes` more would fit in the organization's quota.
pub async fn check_storage_limit(
    pool: &PgPool,
    organization_id: Uuid,
    incoming_bytes: i64,
) -> Result<(), LimitError> {
    let plan = Plan::for_organization(pool, organization_id).await?;
    let used = StoredFile::total_bytes_by_organization(pool, organization_id).await?;

    ensure_within(
        LimitKind::StorageBytes,
        plan.max_storage_bytes,
        used,
        incoming_bytes,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited() {
        assert!(ensure_within(LimitKind::Projects, None, i64::MAX, 1).is_ok());
    }

    #[test]
    fn test_at_limit_rejected() {
        assert!(ensure_within(LimitKind::Projects, Some(3), 2, 1).is_ok());

        match ensure_within(LimitKind::Projects, Some(3), 3, 1) {
            Err(LimitError::LimitExceeded {
                kind,
                limit,
                current,
            }) => {
                assert_eq!(kind, LimitKind::Projects);
                assert_eq!(limit, 3);
                assert_eq!(current, 3);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_storage_counts_incoming_bytes() {
        let quota = Some(100);
        assert!(ensure_within(LimitKind::StorageBytes, quota, 60, 40).is_ok());
        assert!(ensure_within(LimitKind::StorageBytes, quota, 60, 41).is_err());
    }

    #[test]
    fn test_message() {
        let err = ensure_within(LimitKind::Members, Some(3), 3, 1).unwrap_err();
        assert_eq!(err.to_string(), "Plan limit reached for members (3/3)");
    }
}

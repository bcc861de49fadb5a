//! Organization invitations
//!
//! Only the SHA-256 hash of an invitation token is stored. The plaintext token
//! is emailed once and never persisted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::membership::{Membership, MembershipRole};

/// How long an invitation stays valid
pub const INVITATION_TTL_DAYS: i64 = 7;

const INVITATION_COLUMNS: &str =
    "id, organization_id, email, role, token_hash, invited_by, expires_at, accepted_at, created_at";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invitation {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub role: MembershipRole,
    #[serde(skip_serializing, default)]
    pub token_hash: String,
    pub invited_by: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateInvitation {
    pub organization_id: Uuid,
    pub email: String,
    pub role: MembershipRole,
    pub token_hash: String,
    pub invited_by: Uuid,
}

impl Invitation {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    pub fn is_pending(&self) -> bool {
        self.accepted_at.is_none() && !self.is_expired()
    }

    /// Creates an invitation expiring in [`INVITATION_TTL_DAYS`].
    ///
    /// # Errors
    ///
    /// `invitations_pending_email_key` violation when an unaccepted invitation
    /// for the same email already exists.
    pub async fn create(pool: &PgPool, data: CreateInvitation) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO invitations (organization_id, email, role, token_hash, invited_by, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            INVITATION_COLUMNS
        );

        sqlx::query_as::<_, Invitation>(&query)
            .bind(data.organization_id)
            .bind(super::user::normalize_email(&data.email))
            .bind(data.role)
            .bind(data.token_hash)
            .bind(data.invited_by)
            .bind(Utc::now() + Duration::days(INVITATION_TTL_DAYS))
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM invitations WHERE id = $1", INVITATION_COLUMNS);

        sqlx::query_as::<_, Invitation>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_token_hash(
        pool: &PgPool,
        token_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM invitations WHERE token_hash = $1",
            INVITATION_COLUMNS
        );

        sqlx::query_as::<_, Invitation>(&query)
            .bind(token_hash)
            .fetch_optional(pool)
            .await
    }

    /// Unaccepted, unexpired invitations for an organization.
    pub async fn list_pending(
        pool: &PgPool,
        organization_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM invitations \
             WHERE organization_id = $1 AND accepted_at IS NULL AND expires_at > NOW() \
             ORDER BY created_at DESC",
            INVITATION_COLUMNS
        );

        sqlx::query_as::<_, Invitation>(&query)
            .bind(organization_id)
            .fetch_all(pool)
            .await
    }

    pub async fn count_pending(pool: &PgPool, organization_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM invitations \
             WHERE organization_id = $1 AND accepted_at IS NULL AND expires_at > NOW()",
        )
        .bind(organization_id)
        .fetch_one(pool)
        .await
    }

    /// Removes an expired, unaccepted invitation so the address can be
    /// invited again.
    pub async fn delete_expired_for_email(
        pool: &PgPool,
        organization_id: Uuid,
        email: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM invitations
            WHERE organization_id = $1 AND lower(email) = $2
              AND accepted_at IS NULL AND expires_at <= NOW()
            "#,
        )
        .bind(organization_id)
        .bind(super::user::normalize_email(email))
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Marks an invitation accepted. Returns `false` if it was already used.
    pub async fn mark_accepted(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE invitations SET accepted_at = NOW() WHERE id = $1 AND accepted_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Marks the invitation accepted and creates the membership in one
    /// transaction. `None` when it was already accepted.
    pub async fn accept(
        pool: &PgPool,
        invitation: &Invitation,
        user_id: Uuid,
    ) -> Result<Option<Membership>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let marked = sqlx::query(
            "UPDATE invitations SET accepted_at = NOW() WHERE id = $1 AND accepted_at IS NULL",
        )
        .bind(invitation.id)
        .execute(&mut *tx)
        .await?;
        if marked.rows_affected() == 0 {
            return Ok(None);
        }

        let membership = sqlx::query_as::<_, Membership>(
            r#"
            INSERT INTO memberships (organization_id, user_id, role)
            VALUES ($1, $2, $3)
            RETURNING organization_id, user_id, role, created_at
            "#,
        )
        .bind(invitation.organization_id)
        .bind(user_id)
        .bind(invitation.role)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(membership))
    }

    pub async fn delete(pool: &PgPool, organization_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM invitations WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(organization_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invitation(expires_at: DateTime<Utc>, accepted_at: Option<DateTime<Utc>>) -> Invitation {
        Invitation {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            email: "new@example.com".to_string(),
            role: MembershipRole::Member,
            token_hash: "abc".to_string(),
            invited_by: None,
            expires_at,
            accepted_at,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_pending_states() {
        let fresh = invitation(Utc::now() + Duration::days(1), None);
        assert!(fresh.is_pending());

        let expired = invitation(Utc::now() - Duration::seconds(1), None);
        assert!(expired.is_expired());
        assert!(!expired.is_pending());

        let accepted = invitation(Utc::now() + Duration::days(1), Some(Utc::now()));
        assert!(!accepted.is_pending());
    }

    #[test]
    fn test_token_hash_not_serialized() {
        let json = serde_json::to_value(invitation(Utc::now(), None)).unwrap();
        assert!(json.get("token_hash").is_none());
        assert_eq!(json["role"], "member");
    }
}

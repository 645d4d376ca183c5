//! PostgreSQL invitation repository.
//!
//! Per-row atomicity comes from conditional `UPDATE` statements: the
//! `version` guard linearizes invitation transitions and the `>=` guard keeps
//! quota counters non-negative without explicit locks.

use chrono::{DateTime, Utc};
use domain::error::RepositoryError;
use domain::models::{Invitation, LedgerField, QuotaLedger};
use domain::services::InvitationRepository;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::entities::{InvitationEntity, InvitationStatusDb, MessageVariantDb, QuotaLedgerEntity};
use crate::metrics::QueryTimer;

const INVITATION_COLUMNS: &str = "id, sender_id, recipient_phone, recipient_name, message, \
     message_variant, created_at, expires_at, status, clicked_at, installed_at, \
     reminder_count, accepted_counted, award_credited, version";

const LEDGER_COLUMNS: &str = "user_id, available_invites, total_invites_sent, \
     total_invites_accepted, invite_streak, last_invite_award, streak_award_credited, \
     created_at, updated_at";

/// PostgreSQL error code for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

fn column(field: LedgerField) -> &'static str {
    match field {
        LedgerField::AvailableInvites => "available_invites",
        LedgerField::TotalInvitesSent => "total_invites_sent",
        LedgerField::TotalInvitesAccepted => "total_invites_accepted",
    }
}

fn map_sqlx(query: &str, err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            RepositoryError::Conflict(db_err.message().to_string())
        }
        sqlx::Error::PoolTimedOut => RepositoryError::Timeout,
        other => {
            warn!(query, error = %other, "Store query failed");
            RepositoryError::Unavailable(other.to_string())
        }
    }
}

fn missing_ledger(user_id: Uuid) -> RepositoryError {
    RepositoryError::Unavailable(format!("no ledger for user {user_id}"))
}

/// Repository for invitation and quota ledger rows.
#[derive(Clone)]
pub struct PgInvitationRepository {
    pool: PgPool,
}

impl PgInvitationRepository {
    /// Creates a new PgInvitationRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl InvitationRepository for PgInvitationRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Invitation>, RepositoryError> {
        let timer = QueryTimer::new("get_invitation");
        let result = sqlx::query_as::<_, InvitationEntity>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.finish(&result);

        result
            .map(|row| row.map(Invitation::from))
            .map_err(|e| map_sqlx("get_invitation", e))
    }

    async fn put(&self, invitation: &Invitation) -> Result<(), RepositoryError> {
        let timer = QueryTimer::new("put_invitation");
        let result = sqlx::query(
            r#"
            INSERT INTO invitations (
                id, sender_id, recipient_phone, recipient_name, message, message_variant,
                created_at, expires_at, status, clicked_at, installed_at, reminder_count,
                accepted_counted, award_credited, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(invitation.id)
        .bind(invitation.sender_id)
        .bind(&invitation.recipient_phone)
        .bind(&invitation.recipient_name)
        .bind(&invitation.message)
        .bind(MessageVariantDb::from(invitation.message_variant))
        .bind(invitation.created_at)
        .bind(invitation.expires_at)
        .bind(InvitationStatusDb::from(invitation.status))
        .bind(invitation.tracking_data.clicked_at)
        .bind(invitation.tracking_data.installed_at)
        .bind(invitation.tracking_data.reminder_count)
        .bind(invitation.tracking_data.accepted_counted)
        .bind(invitation.tracking_data.award_credited)
        .bind(invitation.version)
        .execute(&self.pool)
        .await;
        timer.finish(&result);

        result
            .map(|_| ())
            .map_err(|e| map_sqlx("put_invitation", e))
    }

    async fn list_by_sender(&self, sender_id: Uuid) -> Result<Vec<Invitation>, RepositoryError> {
        let timer = QueryTimer::new("list_invitations_by_sender");
        let result = sqlx::query_as::<_, InvitationEntity>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations \
             WHERE sender_id = $1 ORDER BY created_at DESC"
        ))
        .bind(sender_id)
        .fetch_all(&self.pool)
        .await;
        timer.finish(&result);

        result
            .map(|rows| rows.into_iter().map(Invitation::from).collect())
            .map_err(|e| map_sqlx("list_invitations_by_sender", e))
    }

    async fn compare_and_put(
        &self,
        invitation: &Invitation,
        expected_version: i64,
    ) -> Result<bool, RepositoryError> {
        let timer = QueryTimer::new("compare_and_put_invitation");
        let result = sqlx::query(
            r#"
            UPDATE invitations
            SET status = $2,
                clicked_at = $3,
                installed_at = $4,
                reminder_count = $5,
                accepted_counted = $6,
                award_credited = $7,
                version = $8
            WHERE id = $1 AND version = $9
            "#,
        )
        .bind(invitation.id)
        .bind(InvitationStatusDb::from(invitation.status))
        .bind(invitation.tracking_data.clicked_at)
        .bind(invitation.tracking_data.installed_at)
        .bind(invitation.tracking_data.reminder_count)
        .bind(invitation.tracking_data.accepted_counted)
        .bind(invitation.tracking_data.award_credited)
        .bind(invitation.version)
        .bind(expected_version)
        .execute(&self.pool)
        .await;
        timer.finish(&result);

        result
            .map(|done| done.rows_affected() == 1)
            .map_err(|e| map_sqlx("compare_and_put_invitation", e))
    }

    async fn list_expirable(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Invitation>, RepositoryError> {
        let timer = QueryTimer::new("list_expirable_invitations");
        let result = sqlx::query_as::<_, InvitationEntity>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations \
             WHERE status IN ('sent', 'clicked') AND expires_at <= $1 \
             ORDER BY expires_at ASC LIMIT $2"
        ))
        .bind(now)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await;
        timer.finish(&result);

        result
            .map(|rows| rows.into_iter().map(Invitation::from).collect())
            .map_err(|e| map_sqlx("list_expirable_invitations", e))
    }

    async fn ensure_ledger(
        &self,
        user_id: Uuid,
        initial_invites: i32,
    ) -> Result<QuotaLedger, RepositoryError> {
        let timer = QueryTimer::new("insert_quota_ledger");
        let inserted = sqlx::query(
            r#"
            INSERT INTO quota_ledgers (user_id, available_invites)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(initial_invites.max(0))
        .execute(&self.pool)
        .await;
        timer.finish(&inserted);
        inserted.map_err(|e| map_sqlx("insert_quota_ledger", e))?;

        let timer = QueryTimer::new("get_quota_ledger");
        let result = sqlx::query_as::<_, QuotaLedgerEntity>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM quota_ledgers WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await;
        timer.finish(&result);

        result
            .map(QuotaLedger::from)
            .map_err(|e| map_sqlx("get_quota_ledger", e))
    }

    async fn try_decrement(
        &self,
        user_id: Uuid,
        field: LedgerField,
        amount: i32,
    ) -> Result<bool, RepositoryError> {
        let col = column(field);
        let timer = QueryTimer::new("try_decrement_ledger");
        let result = sqlx::query(&format!(
            "UPDATE quota_ledgers SET {col} = {col} - $2, updated_at = NOW() \
             WHERE user_id = $1 AND {col} >= $2"
        ))
        .bind(user_id)
        .bind(amount)
        .execute(&self.pool)
        .await;
        timer.finish(&result);

        result
            .map(|done| done.rows_affected() == 1)
            .map_err(|e| map_sqlx("try_decrement_ledger", e))
    }

    async fn increment(
        &self,
        user_id: Uuid,
        field: LedgerField,
        amount: i32,
    ) -> Result<(), RepositoryError> {
        let col = column(field);
        let timer = QueryTimer::new("increment_ledger");
        let result = sqlx::query(&format!(
            "UPDATE quota_ledgers SET {col} = {col} + $2, updated_at = NOW() WHERE user_id = $1"
        ))
        .bind(user_id)
        .bind(amount)
        .execute(&self.pool)
        .await;
        timer.finish(&result);

        match result {
            Ok(done) if done.rows_affected() == 1 => Ok(()),
            Ok(_) => Err(missing_ledger(user_id)),
            Err(e) => Err(map_sqlx("increment_ledger", e)),
        }
    }

    async fn set_invite_streak(&self, user_id: Uuid, days: i32) -> Result<(), RepositoryError> {
        let timer = QueryTimer::new("set_invite_streak");
        let result = sqlx::query(
            "UPDATE quota_ledgers SET invite_streak = $2, updated_at = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(days.max(0))
        .execute(&self.pool)
        .await;
        timer.finish(&result);

        match result {
            Ok(done) if done.rows_affected() == 1 => Ok(()),
            Ok(_) => Err(missing_ledger(user_id)),
            Err(e) => Err(map_sqlx("set_invite_streak", e)),
        }
    }

    async fn credit_streak_award(
        &self,
        user_id: Uuid,
        run_award: i32,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<i32, RepositoryError> {
        let timer = QueryTimer::new("credit_streak_award");
        let result = sqlx::query_scalar::<_, i32>(
            r#"
            WITH paid AS (
                SELECT user_id,
                       CASE WHEN last_invite_award >= $3 THEN streak_award_credited ELSE 0 END
                           AS credited
                FROM quota_ledgers
                WHERE user_id = $1
                FOR UPDATE
            )
            UPDATE quota_ledgers q
            SET available_invites = q.available_invites + ($2 - paid.credited),
                streak_award_credited = $2,
                last_invite_award = $4,
                updated_at = NOW()
            FROM paid
            WHERE q.user_id = paid.user_id
              AND $2 > paid.credited
            RETURNING $2 - paid.credited
            "#,
        )
        .bind(user_id)
        .bind(run_award)
        .bind(window_start)
        .bind(now)
        .fetch_optional(&self.pool)
        .await;
        timer.finish(&result);

        result
            .map(|owed| owed.unwrap_or(0))
            .map_err(|e| map_sqlx("credit_streak_award", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_names_match_schema() {
        assert_eq!(column(LedgerField::AvailableInvites), "available_invites");
        assert_eq!(column(LedgerField::TotalInvitesSent), "total_invites_sent");
        assert_eq!(column(LedgerField::TotalInvitesAccepted), "total_invites_accepted");
    }

    #[test]
    fn test_pool_timeout_maps_to_timeout() {
        assert_eq!(
            map_sqlx("get_invitation", sqlx::Error::PoolTimedOut),
            RepositoryError::Timeout
        );
        assert!(matches!(
            map_sqlx("get_invitation", sqlx::Error::RowNotFound),
            RepositoryError::Unavailable(_)
        ));
    }
}

//! Quota ledger entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::QuotaLedger;
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the quota_ledgers table.
#[derive(Debug, Clone, FromRow)]
pub struct QuotaLedgerEntity {
    pub user_id: Uuid,
    pub available_invites: i32,
    pub total_invites_sent: i32,
    pub total_invites_accepted: i32,
    pub invite_streak: i32,
    pub last_invite_award: Option<DateTime<Utc>>,
    pub streak_award_credited: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<QuotaLedgerEntity> for QuotaLedger {
    fn from(entity: QuotaLedgerEntity) -> Self {
        Self {
            user_id: entity.user_id,
            available_invites: entity.available_invites,
            total_invites_sent: entity.total_invites_sent,
            total_invites_accepted: entity.total_invites_accepted,
            invite_streak: entity.invite_streak,
            last_invite_award: entity.last_invite_award,
            streak_award_credited: entity.streak_award_credited,
        }
    }
}

//! PostgreSQL repository tests.
//!
//! Run with a disposable database:
//! `TEST_DATABASE_URL=postgres://... cargo test -p persistence -- --ignored`

use chrono::{Duration, Utc};
use domain::models::{
    Contact, InstallCredit, Invitation, InvitationStatus, LedgerField, MessageVariant,
};
use domain::services::InvitationRepository;
use domain::RepositoryError;
use fake::faker::name::en::Name;
use fake::Fake;
use persistence::PgInvitationRepository;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

async fn repository() -> PgInvitationRepository {
    let url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must point at a disposable database");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .expect("Failed to connect to test database");
    persistence::db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    PgInvitationRepository::new(pool)
}

fn invitation(sender: Uuid, ttl: Duration) -> Invitation {
    let name: String = Name().fake();
    Invitation::new(
        sender,
        &Contact::new("5551234567").with_name(name),
        "Join me".to_string(),
        MessageVariant::Friendly,
        Utc::now(),
        ttl,
    )
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_put_get_and_duplicate() {
    let repo = repository().await;
    let inv = invitation(Uuid::new_v4(), Duration::hours(24));

    repo.put(&inv).await.unwrap();
    let loaded = repo.get(inv.id).await.unwrap().unwrap();
    assert_eq!(loaded.id, inv.id);
    assert_eq!(loaded.status, InvitationStatus::Sent);
    assert_eq!(loaded.message_variant, MessageVariant::Friendly);

    assert!(matches!(repo.put(&inv).await, Err(RepositoryError::Conflict(_))));
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_compare_and_put_guards_version() {
    let repo = repository().await;
    let mut inv = invitation(Uuid::new_v4(), Duration::hours(24));
    repo.put(&inv).await.unwrap();

    inv.mark_clicked(Utc::now());
    inv.version = 1;
    assert!(repo.compare_and_put(&inv, 0).await.unwrap());
    assert!(!repo.compare_and_put(&inv, 0).await.unwrap());

    let loaded = repo.get(inv.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, InvitationStatus::Clicked);
    assert_eq!(loaded.version, 1);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_install_credit_claims_are_stored() {
    let repo = repository().await;
    let mut inv = invitation(Uuid::new_v4(), Duration::hours(24));
    repo.put(&inv).await.unwrap();

    inv.mark_installed(Utc::now());
    inv.release_install_credits(&[InstallCredit::Award]);
    inv.version = 1;
    assert!(repo.compare_and_put(&inv, 0).await.unwrap());

    let loaded = repo.get(inv.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, InvitationStatus::Installed);
    assert!(loaded.tracking_data.accepted_counted);
    assert!(!loaded.tracking_data.award_credited);
    assert!(loaded.install_credit_pending(InstallCredit::Award));
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_list_by_sender_and_expirable() {
    let repo = repository().await;
    let sender = Uuid::new_v4();
    let live = invitation(sender, Duration::hours(24));
    let mut stale = invitation(sender, Duration::hours(1));
    stale.created_at = Utc::now() - Duration::hours(3);
    stale.expires_at = stale.created_at + Duration::hours(1);
    repo.put(&live).await.unwrap();
    repo.put(&stale).await.unwrap();

    assert_eq!(repo.list_by_sender(sender).await.unwrap().len(), 2);
    let due = repo.list_expirable(Utc::now(), 1000).await.unwrap();
    assert!(due.iter().any(|i| i.id == stale.id));
    assert!(!due.iter().any(|i| i.id == live.id));
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_ledger_counters() {
    let repo = repository().await;
    let user = Uuid::new_v4();

    let ledger = repo.ensure_ledger(user, 1).await.unwrap();
    assert_eq!(ledger.available_invites, 1);
    assert_eq!(repo.ensure_ledger(user, 5).await.unwrap().available_invites, 1);

    assert!(repo.try_decrement(user, LedgerField::AvailableInvites, 1).await.unwrap());
    assert!(!repo.try_decrement(user, LedgerField::AvailableInvites, 1).await.unwrap());

    repo.increment(user, LedgerField::TotalInvitesSent, 1).await.unwrap();
    assert!(repo
        .increment(Uuid::new_v4(), LedgerField::TotalInvitesSent, 1)
        .await
        .is_err());

    let ledger = repo.ensure_ledger(user, 0).await.unwrap();
    assert_eq!(ledger.available_invites, 0);
    assert_eq!(ledger.total_invites_sent, 1);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_concurrent_decrements_never_oversend() {
    let repo = repository().await;
    let user = Uuid::new_v4();
    repo.ensure_ledger(user, 3).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..12 {
        let repo = repo.clone();
        tasks.push(tokio::spawn(async move {
            repo.try_decrement(user, LedgerField::AvailableInvites, 1).await
        }));
    }
    let mut taken = 0;
    for task in tasks {
        if task.await.unwrap().unwrap() {
            taken += 1;
        }
    }

    assert_eq!(taken, 3);
    assert_eq!(repo.ensure_ledger(user, 0).await.unwrap().available_invites, 0);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_streak_award_credits_only_what_the_run_is_owed() {
    let repo = repository().await;
    let user = Uuid::new_v4();
    repo.ensure_ledger(user, 0).await.unwrap();
    repo.set_invite_streak(user, 3).await.unwrap();

    let now = Utc::now();
    let window_start = now - Duration::days(3);
    assert_eq!(repo.credit_streak_award(user, 2, window_start, now).await.unwrap(), 2);
    assert_eq!(repo.credit_streak_award(user, 2, window_start, now).await.unwrap(), 0);

    // Same run three days later, twice as long.
    let later = now + Duration::days(3);
    assert_eq!(repo.credit_streak_award(user, 4, window_start, later).await.unwrap(), 2);

    // A fresh run after a break starts from zero.
    let restart = later + Duration::days(5);
    let new_window = restart - Duration::days(3);
    assert_eq!(repo.credit_streak_award(user, 2, new_window, restart).await.unwrap(), 2);

    let ledger = repo.ensure_ledger(user, 0).await.unwrap();
    assert_eq!(ledger.available_invites, 6);
    assert_eq!(ledger.invite_streak, 3);
    assert_eq!(ledger.streak_award_credited, 2);
    assert!(ledger.last_invite_award.is_some());
}

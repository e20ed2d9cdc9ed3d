//! Integration tests for the discussion and notification repositories.
//!
//! Exercises the repository layer against a real database:
//! - Joined discussion events (owner, author, parent author)
//! - Idempotent notification creation per (recipient, discussion)
//! - Unsent ordering by recipient then creation time
//! - Guarded mark-sent
//! - Delivery claims
//! - Notified tracking for discussions
//! - Per-cadence advisory locks

use chrono::{Duration, Utc};
use showcase_core::discussion::DiscussionEvent;
use showcase_db::locks::CadenceLock;
use showcase_db::models::discussion::CreateDiscussion;
use showcase_db::models::project::CreateProject;
use showcase_db::models::user::{CreateUser, User};
use showcase_db::repositories::{DiscussionRepo, NotificationRepo, ProjectRepo, UserRepo};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn user(pool: &PgPool, name: &str, frequency: &str) -> User {
    UserRepo::create(
        pool,
        &CreateUser {
            email: format!("{name}@example.com"),
            first_name: name.to_string(),
            last_name: "Test".to_string(),
            notification_frequency: Some(frequency.to_string()),
        },
    )
    .await
    .unwrap()
}

async fn discussion(
    pool: &PgPool,
    project_id: i64,
    author_id: Option<i64>,
    parent_id: Option<i64>,
) -> i64 {
    DiscussionRepo::create(
        pool,
        &CreateDiscussion {
            project_id,
            author_id,
            parent_id,
            body: "A comment".to_string(),
        },
    )
    .await
    .unwrap()
    .id
}

async fn project(pool: &PgPool, owner_id: Option<i64>) -> i64 {
    ProjectRepo::create(
        pool,
        &CreateProject {
            title: "Harbour walk".to_string(),
            owner_id,
        },
    )
    .await
    .unwrap()
    .id
}

// ---------------------------------------------------------------------------
// Discussion events
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn event_row_loads_owner_author_and_parent_author(pool: PgPool) {
    let owner = user(&pool, "owner", "immediate").await;
    let alice = user(&pool, "alice", "hourly").await;
    let bob = user(&pool, "bob", "daily").await;
    let project_id = project(&pool, Some(owner.id)).await;
    let root_id = discussion(&pool, project_id, Some(alice.id), None).await;
    let reply_id = discussion(&pool, project_id, Some(bob.id), Some(root_id)).await;

    let row = DiscussionRepo::find_event_by_id(&pool, reply_id)
        .await
        .unwrap()
        .expect("reply should exist");
    let event = DiscussionEvent::from(row);

    assert_eq!(event.project_title, "Harbour walk");
    assert_eq!(event.project_owner.as_ref().map(|p| p.id), Some(owner.id));
    assert_eq!(event.author.as_ref().map(|p| p.id), Some(bob.id));
    assert_eq!(event.parent_id, Some(root_id));
    assert_eq!(event.parent_author.as_ref().map(|p| p.id), Some(alice.id));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn event_row_for_missing_discussion_is_none(pool: PgPool) {
    let row = DiscussionRepo::find_event_by_id(&pool, 9_999).await.unwrap();
    assert!(row.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn anonymous_author_and_ownerless_project_load_as_none(pool: PgPool) {
    let project_id = project(&pool, None).await;
    let root_id = discussion(&pool, project_id, None, None).await;

    let event = DiscussionEvent::from(
        DiscussionRepo::find_event_by_id(&pool, root_id)
            .await
            .unwrap()
            .unwrap(),
    );

    assert!(event.project_owner.is_none());
    assert!(event.author.is_none());
    assert!(event.parent_author.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn replies_are_listed_oldest_first(pool: PgPool) {
    let owner = user(&pool, "owner", "immediate").await;
    let project_id = project(&pool, Some(owner.id)).await;
    let root_id = discussion(&pool, project_id, Some(owner.id), None).await;
    let first = discussion(&pool, project_id, Some(owner.id), Some(root_id)).await;
    let second = discussion(&pool, project_id, None, Some(root_id)).await;
    let other_root = discussion(&pool, project_id, None, None).await;
    discussion(&pool, project_id, None, Some(other_root)).await;

    let replies = DiscussionRepo::list_replies_of(&pool, root_id).await.unwrap();
    let ids: Vec<i64> = replies.iter().map(|r| r.id).collect();

    assert_eq!(ids, vec![first, second]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn deleting_root_cascades_to_replies_and_notifications(pool: PgPool) {
    let owner = user(&pool, "owner", "hourly").await;
    let project_id = project(&pool, Some(owner.id)).await;
    let root_id = discussion(&pool, project_id, None, None).await;
    let reply_id = discussion(&pool, project_id, None, Some(root_id)).await;
    let notification = NotificationRepo::create_if_absent(&pool, owner.id, reply_id, "hourly")
        .await
        .unwrap()
        .unwrap();

    assert!(DiscussionRepo::delete(&pool, root_id).await.unwrap());

    assert!(DiscussionRepo::find_by_id(&pool, reply_id).await.unwrap().is_none());
    assert!(NotificationRepo::find_by_id(&pool, notification.id)
        .await
        .unwrap()
        .is_none());
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_if_absent_is_idempotent_per_pair(pool: PgPool) {
    let owner = user(&pool, "owner", "hourly").await;
    let project_id = project(&pool, Some(owner.id)).await;
    let root_id = discussion(&pool, project_id, None, None).await;

    let first = NotificationRepo::create_if_absent(&pool, owner.id, root_id, "hourly")
        .await
        .unwrap();
    let second = NotificationRepo::create_if_absent(&pool, owner.id, root_id, "daily")
        .await
        .unwrap();

    let created = first.expect("first insert should create a row");
    assert!(!created.sent);
    assert!(created.sent_at.is_none());
    assert!(second.is_none(), "second insert must not create a row");

    let rows = NotificationRepo::list_for_discussion(&pool, root_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].cadence, "hourly");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn never_cadence_is_rejected_by_the_schema(pool: PgPool) {
    let owner = user(&pool, "owner", "never").await;
    let project_id = project(&pool, Some(owner.id)).await;
    let root_id = discussion(&pool, project_id, None, None).await;

    let result = NotificationRepo::create_if_absent(&pool, owner.id, root_id, "never").await;
    assert!(result.is_err());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unsent_rows_are_grouped_by_recipient_then_time(pool: PgPool) {
    let zed = user(&pool, "zed", "hourly").await;
    let amy = user(&pool, "amy", "hourly").await;
    let project_id = project(&pool, None).await;
    let d1 = discussion(&pool, project_id, None, None).await;
    let d2 = discussion(&pool, project_id, None, None).await;
    let d3 = discussion(&pool, project_id, None, None).await;

    // Interleave recipients so that insertion order differs from grouping order.
    let z1 = NotificationRepo::create_if_absent(&pool, zed.id, d1, "hourly").await.unwrap().unwrap();
    let a1 = NotificationRepo::create_if_absent(&pool, amy.id, d1, "hourly").await.unwrap().unwrap();
    let z2 = NotificationRepo::create_if_absent(&pool, zed.id, d2, "hourly").await.unwrap().unwrap();
    let a2 = NotificationRepo::create_if_absent(&pool, amy.id, d2, "hourly").await.unwrap().unwrap();
    // Different cadence, must not appear.
    NotificationRepo::create_if_absent(&pool, amy.id, d3, "daily").await.unwrap().unwrap();

    let rows = NotificationRepo::list_unsent_by_cadence(&pool, "hourly").await.unwrap();
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

    let (first, second) = if zed.id < amy.id { ((z1, z2), (a1, a2)) } else { ((a1, a2), (z1, z2)) };
    assert_eq!(ids, vec![first.0.id, first.1.id, second.0.id, second.1.id]);
    assert!(rows.iter().all(|r| r.project_title == "Harbour walk"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn mark_sent_sets_timestamp_once(pool: PgPool) {
    let owner = user(&pool, "owner", "daily").await;
    let project_id = project(&pool, Some(owner.id)).await;
    let d1 = discussion(&pool, project_id, None, None).await;
    let d2 = discussion(&pool, project_id, None, None).await;
    let n1 = NotificationRepo::create_if_absent(&pool, owner.id, d1, "daily").await.unwrap().unwrap();
    let n2 = NotificationRepo::create_if_absent(&pool, owner.id, d2, "daily").await.unwrap().unwrap();

    let first_at = Utc::now();
    let marked = NotificationRepo::mark_sent(&pool, &[n1.id, n2.id], first_at).await.unwrap();
    assert_eq!(marked, 2);

    let later = first_at + Duration::hours(1);
    let remarked = NotificationRepo::mark_sent(&pool, &[n1.id, n2.id], later).await.unwrap();
    assert_eq!(remarked, 0);

    let row = NotificationRepo::find_by_id(&pool, n1.id).await.unwrap().unwrap();
    assert!(row.sent);
    let sent_at = row.sent_at.expect("sent_at must be set");
    assert!((sent_at - first_at).num_milliseconds().abs() < 1);

    let pending = NotificationRepo::list_unsent_by_cadence(&pool, "daily").await.unwrap();
    assert!(pending.is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn mark_sent_with_no_ids_is_a_noop(pool: PgPool) {
    let marked = NotificationRepo::mark_sent(&pool, &[], Utc::now()).await.unwrap();
    assert_eq!(marked, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn preference_change_does_not_touch_existing_rows(pool: PgPool) {
    let owner = user(&pool, "owner", "hourly").await;
    let project_id = project(&pool, Some(owner.id)).await;
    let d1 = discussion(&pool, project_id, None, None).await;
    let n = NotificationRepo::create_if_absent(&pool, owner.id, d1, "hourly").await.unwrap().unwrap();

    assert!(UserRepo::update_notification_frequency(&pool, owner.id, "daily").await.unwrap());

    let row = NotificationRepo::find_by_id(&pool, n.id).await.unwrap().unwrap();
    assert_eq!(row.cadence, "hourly");
    let frequency = UserRepo::get_notification_frequency(&pool, owner.id).await.unwrap();
    assert_eq!(frequency.as_deref(), Some("daily"));
    assert_eq!(NotificationRepo::pending_count_for_recipient(&pool, owner.id).await.unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_is_exclusive_until_released(pool: PgPool) {
    let owner = user(&pool, "owner", "immediate").await;
    let project_id = project(&pool, Some(owner.id)).await;
    let d1 = discussion(&pool, project_id, None, None).await;
    let n = NotificationRepo::create_if_absent(&pool, owner.id, d1, "immediate").await.unwrap().unwrap();

    assert_eq!(NotificationRepo::claim_unsent(&pool, &[n.id], 60.0).await.unwrap(), vec![n.id]);
    assert!(NotificationRepo::claim_unsent(&pool, &[n.id], 60.0).await.unwrap().is_empty());

    assert_eq!(NotificationRepo::release_claims(&pool, &[n.id]).await.unwrap(), 1);
    assert_eq!(NotificationRepo::claim_unsent(&pool, &[n.id], 60.0).await.unwrap(), vec![n.id]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn expired_claim_can_be_taken_over(pool: PgPool) {
    let owner = user(&pool, "owner", "immediate").await;
    let project_id = project(&pool, Some(owner.id)).await;
    let d1 = discussion(&pool, project_id, None, None).await;
    let n = NotificationRepo::create_if_absent(&pool, owner.id, d1, "immediate").await.unwrap().unwrap();

    assert_eq!(NotificationRepo::claim_unsent(&pool, &[n.id], 0.0).await.unwrap(), vec![n.id]);
    assert_eq!(NotificationRepo::claim_unsent(&pool, &[n.id], 60.0).await.unwrap(), vec![n.id]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn sent_rows_cannot_be_claimed(pool: PgPool) {
    let owner = user(&pool, "owner", "immediate").await;
    let project_id = project(&pool, Some(owner.id)).await;
    let d1 = discussion(&pool, project_id, None, None).await;
    let n = NotificationRepo::create_if_absent(&pool, owner.id, d1, "immediate").await.unwrap().unwrap();
    NotificationRepo::mark_sent(&pool, &[n.id], Utc::now()).await.unwrap();

    assert!(NotificationRepo::claim_unsent(&pool, &[n.id], 60.0).await.unwrap().is_empty());
    assert!(NotificationRepo::claim_unsent(&pool, &[], 60.0).await.unwrap().is_empty());
    assert_eq!(NotificationRepo::release_claims(&pool, &[n.id]).await.unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Notified tracking
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn unnotified_discussions_are_listed_until_marked(pool: PgPool) {
    let project_id = project(&pool, None).await;
    let d1 = discussion(&pool, project_id, None, None).await;
    let d2 = discussion(&pool, project_id, None, None).await;

    assert_eq!(DiscussionRepo::list_unnotified(&pool, 0.0, 10).await.unwrap(), vec![d1, d2]);
    assert_eq!(DiscussionRepo::list_unnotified(&pool, 0.0, 1).await.unwrap(), vec![d1]);

    assert!(DiscussionRepo::mark_notified(&pool, d1).await.unwrap());
    assert!(!DiscussionRepo::mark_notified(&pool, d1).await.unwrap());

    assert_eq!(DiscussionRepo::list_unnotified(&pool, 0.0, 10).await.unwrap(), vec![d2]);
    assert!(DiscussionRepo::list_unnotified(&pool, 3600.0, 10).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Advisory locks
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn cadence_lock_is_exclusive_until_released(pool: PgPool) {
    let held = CadenceLock::try_acquire(&pool, 2).await.unwrap().expect("first acquire");

    assert!(CadenceLock::try_acquire(&pool, 2).await.unwrap().is_none());
    let other = CadenceLock::try_acquire(&pool, 3).await.unwrap();
    assert!(other.is_some(), "different cadences must not contend");

    held.release().await.unwrap();
    assert!(CadenceLock::try_acquire(&pool, 2).await.unwrap().is_some());
}

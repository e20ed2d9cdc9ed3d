//! The `NOTIFY` bridge feeds newly inserted discussions into the queue.

mod common;

use std::time::Duration;

use showcase_db::models::discussion::CreateDiscussion;
use showcase_db::repositories::DiscussionRepo;
use showcase_events::NotificationQueue;
use showcase_worker::listener::DiscussionListener;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

#[sqlx::test(migrations = "../../db/migrations")]
async fn inserted_discussion_is_enqueued(pool: PgPool) {
    let owner = common::user(&pool, "owner", "immediate").await;
    let project_id = common::project(&pool, owner.id).await;
    let (queue, mut receiver) = NotificationQueue::bounded(4);
    let cancel = CancellationToken::new();

    let listener = DiscussionListener::connect(&pool).await.unwrap();
    let handle = tokio::spawn(listener.run(queue, cancel.clone()));

    let discussion = DiscussionRepo::create(
        &pool,
        &CreateDiscussion {
            project_id,
            author_id: Some(owner.id),
            parent_id: None,
            body: "Hello".to_string(),
        },
    )
    .await
    .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
        .await
        .expect("no notification within 5s");
    assert_eq!(received, Some(discussion.id));

    cancel.cancel();
    handle.await.unwrap();
}

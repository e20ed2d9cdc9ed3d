use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use showcase_db::models::project::CreateProject;
use showcase_db::models::user::{CreateUser, User};
use showcase_db::repositories::{ProjectRepo, UserRepo};
use showcase_events::testing::RecordingGateway;
use showcase_events::{
    DeliveryDispatcher, DispatchConfig, NotificationQueue, PgDiscussionStore, PgNotificationLedger,
    PgPreferenceLookup,
};
use showcase_worker::config::WorkerConfig;
use showcase_worker::router::build_router;
use showcase_worker::state::AppState;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tower::ServiceExt;

/// The worker router plus handles to what it is wired to.
///
/// Holding `receiver` keeps the notification queue open.
pub struct TestApp {
    pub router: Router,
    pub gateway: Arc<RecordingGateway>,
    pub receiver: mpsc::Receiver<i64>,
}

/// Build the worker router over real Postgres adapters and a recording
/// gateway, mirroring the wiring in `main.rs`.
pub fn build_test_app(pool: PgPool) -> TestApp {
    let gateway = Arc::new(RecordingGateway::default());
    let dispatcher = Arc::new(DeliveryDispatcher::new(
        Arc::new(PgDiscussionStore::new(pool.clone())),
        Arc::new(PgPreferenceLookup::new(pool.clone())),
        Arc::new(PgNotificationLedger::new(pool.clone())),
        gateway.clone(),
        DispatchConfig::default(),
    ));
    let (queue, receiver) = NotificationQueue::bounded(16);

    let state = AppState {
        pool,
        config: Arc::new(WorkerConfig::default()),
        dispatcher,
        queue,
    };
    TestApp {
        router: build_router(state),
        gateway,
        receiver,
    }
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri).await
}

pub async fn post(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::POST, uri).await
}

async fn send(app: Router, method: Method, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn user(pool: &PgPool, name: &str, frequency: &str) -> User {
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

pub async fn project(pool: &PgPool, owner_id: i64) -> i64 {
    ProjectRepo::create(
        pool,
        &CreateProject {
            title: "Harbour walk".to_string(),
            owner_id: Some(owner_id),
        },
    )
    .await
    .unwrap()
    .id
}

// tests/api_http.rs
//
// HTTP-level tests for the control Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health, GET /scrape
// - POST /scrape/{chat_id}/start|stop (status codes + texts)
// - POST /telegram/webhook (commands, block callback, admins, secret)
mod common;

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use common::{fast_settings, notifier, RecordingTransport, ScriptedSource, SharedFactory};
use serde_json::{json, Value};
use tower::ServiceExt as _; // for `oneshot`

use tweet_drop_watcher::api::{create_router, AppState};
use tweet_drop_watcher::ingest::supervisor::{Supervisor, SupervisorDeps};
use tweet_drop_watcher::store::{DropStore, JsonStore};

const BODY_LIMIT: usize = 1024 * 1024;

struct Harness {
    state: AppState,
    transport: Arc<RecordingTransport>,
}

impl Harness {
    fn new(admins: Vec<i64>, secret: Option<&str>) -> Self {
        let transport = RecordingTransport::new();
        let store: Arc<dyn DropStore> = Arc::new(JsonStore::in_memory());
        let supervisor = Supervisor::new(SupervisorDeps {
            sources: SharedFactory::new(ScriptedSource::new(vec![])),
            store: store.clone(),
            notifier: notifier(transport.clone(), store.clone()),
            settings: fast_settings(),
            lookback_secs: 60,
            destinations: vec![-100, -200],
        });
        let state = AppState {
            supervisor: Arc::new(supervisor),
            store,
            transport: transport.clone(),
            admins,
            webhook_secret: secret.map(str::to_string),
        };
        Self { state, transport }
    }

    fn router(&self) -> Router {
        create_router(self.state.clone())
    }
}

async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    (status, String::from_utf8(bytes.to_vec()).expect("utf8"))
}

async fn webhook(app: Router, update: Value, secret: Option<&str>) -> StatusCode {
    let mut req = Request::builder()
        .method("POST")
        .uri("/telegram/webhook")
        .header("content-type", "application/json");
    if let Some(s) = secret {
        req = req.header("x-telegram-bot-api-secret-token", s);
    }
    let req = req
        .body(Body::from(update.to_string()))
        .expect("build webhook request");
    app.oneshot(req).await.expect("oneshot").status()
}

fn command(chat_id: i64, user_id: i64, text: &str) -> Value {
    json!({
        "update_id": 1,
        "message": {"chat": {"id": chat_id}, "from": {"id": user_id}, "text": text}
    })
}

#[tokio::test]
async fn health_is_ok() {
    let h = Harness::new(vec![], None);
    let (status, body) = call(h.router(), "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn start_stop_status_codes_and_texts() {
    let h = Harness::new(vec![], None);

    let (s, b) = call(h.router(), "POST", "/scrape/-100/start").await;
    assert_eq!((s, b.as_str()), (StatusCode::OK, "Starting Twitter scraper..."));

    let (s, b) = call(h.router(), "POST", "/scrape/-100/start").await;
    assert_eq!((s, b.as_str()), (StatusCode::CONFLICT, "Scraping is already running"));

    let (s, body) = call(h.router(), "GET", "/scrape").await;
    assert_eq!(s, StatusCode::OK);
    let rows: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(rows[0]["chat_id"], -100);
    assert!(rows[0]["started_at"].is_string());

    let (s, b) = call(h.router(), "POST", "/scrape/-100/stop").await;
    assert_eq!((s, b.as_str()), (StatusCode::OK, "Twitter scraper stopped"));

    let (s, b) = call(h.router(), "POST", "/scrape/-100/stop").await;
    assert_eq!((s, b.as_str()), (StatusCode::CONFLICT, "Twitter scraper is not running"));

    let (s, _) = call(h.router(), "POST", "/scrape/-5/start").await;
    assert_eq!(s, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn webhook_commands_drive_the_supervisor() {
    let h = Harness::new(vec![], None);

    let s = webhook(h.router(), command(-200, 7, "/scrape@DropBot"), None).await;
    assert_eq!(s, StatusCode::OK);
    assert!(h.state.supervisor.is_running(-200).await);

    webhook(h.router(), command(-200, 7, "/stop"), None).await;
    assert!(!h.state.supervisor.is_running(-200).await);
    assert_eq!(
        h.transport.statuses(),
        vec![
            "Starting Twitter scraper...".to_string(),
            "Twitter scraper stopped".to_string()
        ]
    );
}

#[tokio::test]
async fn non_admin_commands_are_ignored() {
    let h = Harness::new(vec![1], None);
    let s = webhook(h.router(), command(-100, 99, "/scrape"), None).await;
    assert_eq!(s, StatusCode::OK);
    assert!(!h.state.supervisor.is_running(-100).await);
    assert!(h.transport.sent().is_empty());

    webhook(h.router(), command(-100, 1, "/scrape"), None).await;
    assert!(h.state.supervisor.is_running(-100).await);
    h.state.supervisor.shutdown().await;
}

#[tokio::test]
async fn block_button_bans_the_author() {
    let h = Harness::new(vec![], None);
    let update = json!({
        "update_id": 2,
        "callback_query": {
            "id": "cb-9",
            "from": {"id": 7},
            "data": "block:degen:42",
            "message": {"chat": {"id": -100}}
        }
    });
    assert_eq!(webhook(h.router(), update, None).await, StatusCode::OK);

    assert!(h.state.store.is_banned("42").await.unwrap());
    assert_eq!(
        h.transport.callbacks.lock().unwrap().clone(),
        vec![("cb-9".to_string(), "Blocked @degen".to_string())]
    );
    assert_eq!(h.transport.statuses(), vec!["Blocked @degen".to_string()]);
}

#[tokio::test]
async fn block_button_from_non_admin_is_refused() {
    let h = Harness::new(vec![1], None);
    let update = json!({
        "update_id": 3,
        "callback_query": {
            "id": "cb-10",
            "from": {"id": 99},
            "data": "block:degen:42",
            "message": {"chat": {"id": -100}}
        }
    });
    assert_eq!(webhook(h.router(), update, None).await, StatusCode::OK);

    assert!(!h.state.store.is_banned("42").await.unwrap());
    assert_eq!(
        h.transport.callbacks.lock().unwrap().clone(),
        vec![("cb-10".to_string(), "Not allowed".to_string())]
    );
    assert!(h.transport.sent().is_empty());
}

#[tokio::test]
async fn unrelated_updates_are_acknowledged() {
    let h = Harness::new(vec![], None);
    let s = webhook(h.router(), command(-100, 7, "gm"), None).await;
    assert_eq!(s, StatusCode::OK);
    assert!(h.transport.sent().is_empty());
}

#[tokio::test]
async fn webhook_secret_is_enforced() {
    let h = Harness::new(vec![], Some("s3cret"));
    let s = webhook(h.router(), command(-100, 7, "/scrape"), Some("nope")).await;
    assert_eq!(s, StatusCode::UNAUTHORIZED);
    let s = webhook(h.router(), command(-100, 7, "/scrape"), None).await;
    assert_eq!(s, StatusCode::UNAUTHORIZED);
    assert!(!h.state.supervisor.is_running(-100).await);

    let s = webhook(h.router(), command(-100, 7, "/scrape"), Some("s3cret")).await;
    assert_eq!(s, StatusCode::OK);
    assert!(h.state.supervisor.is_running(-100).await);
    h.state.supervisor.shutdown().await;
}

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

use crate::commands::{Action, Command, Update};
use crate::config::scraper::permits;
use crate::ingest::supervisor::{LifecycleStatus, Supervisor};
use crate::ingest::types::ChatId;
use crate::notify::{MessageTransport, OutgoingMessage};
use crate::store::DropStore;

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub store: Arc<dyn DropStore>,
    pub transport: Arc<dyn MessageTransport>,
    /// Telegram user ids allowed to use chat commands; empty = any.
    pub admins: Vec<i64>,
    pub webhook_secret: Option<String>,
}

impl AppState {
    fn is_admin(&self, user_id: Option<i64>) -> bool {
        match user_id {
            Some(u) => permits(&self.admins, u),
            None => self.admins.is_empty(),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/scrape", get(list_active))
        .route("/scrape/{chat_id}/start", post(start_scrape))
        .route("/scrape/{chat_id}/stop", post(stop_scrape))
        .route("/telegram/webhook", post(telegram_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(serde::Serialize)]
struct ActiveOut {
    chat_id: ChatId,
    started_at: String,
}

async fn list_active(State(state): State<AppState>) -> Json<Vec<ActiveOut>> {
    let rows = state
        .supervisor
        .active()
        .await
        .into_iter()
        .map(|(chat_id, at)| ActiveOut {
            chat_id,
            started_at: at.to_rfc3339(),
        })
        .collect();
    Json(rows)
}

fn status_code(status: LifecycleStatus) -> StatusCode {
    match status {
        LifecycleStatus::Started | LifecycleStatus::Stopped => StatusCode::OK,
        LifecycleStatus::AlreadyRunning | LifecycleStatus::NotRunning => StatusCode::CONFLICT,
        LifecycleStatus::Rejected(_) => StatusCode::FORBIDDEN,
    }
}

async fn start_scrape(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
) -> (StatusCode, String) {
    let status = state.supervisor.start(chat_id).await;
    (status_code(status), status.message())
}

async fn stop_scrape(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
) -> (StatusCode, String) {
    let status = state.supervisor.stop(chat_id).await;
    (status_code(status), status.message())
}

/// Always answers 200 for well-formed updates so Telegram does not redeliver.
async fn telegram_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> StatusCode {
    if let Some(secret) = &state.webhook_secret {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(secret.as_str()) {
            tracing::warn!(update_id = update.update_id, "webhook call with bad secret");
            return StatusCode::UNAUTHORIZED;
        }
    }

    match Action::from_update(&update) {
        Action::Lifecycle {
            chat_id,
            user_id,
            command,
        } => {
            if !state.is_admin(user_id) {
                tracing::info!(chat_id, ?user_id, "command from non-admin ignored");
                return StatusCode::OK;
            }
            match command {
                Command::Start => state.supervisor.start(chat_id).await,
                Command::Stop => state.supervisor.stop(chat_id).await,
            };
        }
        Action::Block {
            chat_id,
            user_id,
            callback_id,
            block,
        } => {
            if !state.is_admin(Some(user_id)) {
                if let Err(e) = state
                    .transport
                    .answer_callback(&callback_id, "Not allowed")
                    .await
                {
                    tracing::warn!(error = %e, "callback answer failed");
                }
                return StatusCode::OK;
            }
            let reply = match state.store.ban(&block.author_id, &block.author_handle).await {
                Ok(()) => {
                    tracing::info!(author_id = %block.author_id, handle = %block.author_handle, "author banned");
                    format!("Blocked @{}", block.author_handle)
                }
                Err(e) => {
                    tracing::error!(author_id = %block.author_id, error = %e, "ban failed");
                    format!("Could not block @{}", block.author_handle)
                }
            };
            if let Err(e) = state.transport.answer_callback(&callback_id, &reply).await {
                tracing::warn!(error = %e, "callback answer failed");
            }
            if let Some(chat_id) = chat_id {
                if let Err(e) = state
                    .transport
                    .send(&OutgoingMessage::plain(chat_id, reply))
                    .await
                {
                    tracing::warn!(chat_id, error = %e, "block confirmation not delivered");
                }
            }
        }
        Action::Ignore => {}
    }

    StatusCode::OK
}

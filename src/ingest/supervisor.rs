// src/ingest/supervisor.rs
use chrono::{DateTime, Utc};
use metrics::gauge;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::scraper::permits;
use crate::ingest::poller::{PollSettings, PollingTask};
use crate::ingest::types::{ChatId, SourceFactory};
use crate::ingest::watermark::Watermark;
use crate::notify::{Notifier, OutgoingMessage};
use crate::store::DropStore;

/// Result of a start/stop request. These are statuses for the operator,
/// not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStatus {
    Started,
    AlreadyRunning,
    Stopped,
    NotRunning,
    Rejected(ChatId),
}

impl LifecycleStatus {
    pub fn message(&self) -> String {
        match self {
            LifecycleStatus::Started => "Starting Twitter scraper...".into(),
            LifecycleStatus::AlreadyRunning => "Scraping is already running".into(),
            LifecycleStatus::Stopped => "Twitter scraper stopped".into(),
            LifecycleStatus::NotRunning => "Twitter scraper is not running".into(),
            LifecycleStatus::Rejected(id) => format!("Chat {id} is not an allowed destination"),
        }
    }
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<Watermark>,
    started_at: DateTime<Utc>,
}

/// Shared collaborators handed to every polling task.
pub struct SupervisorDeps {
    pub sources: Arc<dyn SourceFactory>,
    pub store: Arc<dyn DropStore>,
    pub notifier: Arc<Notifier>,
    pub settings: PollSettings,
    pub lookback_secs: u64,
    /// Allowed destinations; empty = any.
    pub destinations: Vec<ChatId>,
}

/// Owns the chat → polling task map. At most one task per chat.
pub struct Supervisor {
    deps: SupervisorDeps,
    tasks: Mutex<HashMap<ChatId, RunningTask>>,
}

impl Supervisor {
    pub fn new(deps: SupervisorDeps) -> Self {
        Self {
            deps,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn start(&self, chat_id: ChatId) -> LifecycleStatus {
        if !permits(&self.deps.destinations, chat_id) {
            let status = LifecycleStatus::Rejected(chat_id);
            tracing::warn!(target: "supervisor", chat_id, "start rejected: not an allowed destination");
            self.announce(chat_id, status).await;
            return status;
        }

        let status = {
            let mut tasks = self.tasks.lock().await;
            let live = tasks.get(&chat_id).map(|t| !t.handle.is_finished());
            match live {
                Some(true) => LifecycleStatus::AlreadyRunning,
                stale => {
                    if stale.is_some() {
                        tracing::warn!(target: "supervisor", chat_id, "previous task ended on its own; restarting");
                    }
                    let task = self.spawn(chat_id);
                    tasks.insert(chat_id, task);
                    gauge!("scraper_active_tasks").set(tasks.len() as f64);
                    LifecycleStatus::Started
                }
            }
        };

        tracing::info!(target: "supervisor", chat_id, ?status, "start requested");
        self.announce(chat_id, status).await;
        status
    }

    pub async fn stop(&self, chat_id: ChatId) -> LifecycleStatus {
        let status = {
            let mut tasks = self.tasks.lock().await;
            match tasks.remove(&chat_id) {
                Some(task) => {
                    task.cancel.cancel();
                    match task.handle.await {
                        Ok(wm) => tracing::info!(
                            target: "supervisor",
                            chat_id,
                            watermark = wm.value(),
                            "task for chat was cancelled"
                        ),
                        Err(e) => tracing::error!(target: "supervisor", chat_id, error = %e, "task ended abnormally"),
                    }
                    gauge!("scraper_active_tasks").set(tasks.len() as f64);
                    LifecycleStatus::Stopped
                }
                None => LifecycleStatus::NotRunning,
            }
        };

        self.announce(chat_id, status).await;
        status
    }

    /// Chats with a live task, with their start time.
    pub async fn active(&self) -> Vec<(ChatId, DateTime<Utc>)> {
        let tasks = self.tasks.lock().await;
        let mut out: Vec<_> = tasks
            .iter()
            .filter(|(_, t)| !t.handle.is_finished())
            .map(|(id, t)| (*id, t.started_at))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    pub async fn is_running(&self, chat_id: ChatId) -> bool {
        let tasks = self.tasks.lock().await;
        tasks.get(&chat_id).is_some_and(|t| !t.handle.is_finished())
    }

    /// Cancel and await every task. Used on process teardown.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        for t in tasks.values() {
            t.cancel.cancel();
        }
        for (chat_id, t) in tasks.drain() {
            if let Err(e) = t.handle.await {
                tracing::error!(target: "supervisor", chat_id, error = %e, "task ended abnormally");
            }
        }
        gauge!("scraper_active_tasks").set(0.0);
        tracing::info!(target: "supervisor", "all polling tasks stopped");
    }

    fn spawn(&self, chat_id: ChatId) -> RunningTask {
        let now = Utc::now();
        let watermark = Watermark::starting_at(now, self.deps.lookback_secs);
        let source = self.deps.sources.open(
            DateTime::<Utc>::from_timestamp(watermark.value(), 0).unwrap_or(now),
        );
        let task = PollingTask::new(
            chat_id,
            source,
            self.deps.store.clone(),
            self.deps.notifier.clone(),
            watermark,
            self.deps.settings,
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(task.run(cancel.clone()));
        RunningTask {
            cancel,
            handle,
            started_at: now,
        }
    }

    async fn announce(&self, chat_id: ChatId, status: LifecycleStatus) {
        let msg = OutgoingMessage::plain(chat_id, status.message());
        if let Err(e) = self.deps.notifier.transport().send(&msg).await {
            tracing::warn!(target: "supervisor", chat_id, error = %e, "status message not delivered");
        }
    }
}

// src/bootstrap.rs
use std::sync::Arc;
use tracing::info;

use crate::api::AppState;
use crate::config::ScraperConfig;
use crate::ingest::poller::PollSettings;
use crate::ingest::search::RapidApiFactory;
use crate::ingest::supervisor::{Supervisor, SupervisorDeps};
use crate::notify::links::HttpUrlResolver;
use crate::notify::telegram::TelegramTransport;
use crate::notify::{MessageTransport, Notifier, RetryPolicy};
use crate::store::{DropStore, JsonStore};

/// Everything the service needs, wired from config.
pub struct ScraperRuntime {
    pub cfg: ScraperConfig,
    pub state: AppState,
}

impl ScraperRuntime {
    pub async fn from_config(cfg: ScraperConfig) -> anyhow::Result<Self> {
        cfg.require_secrets()?;
        // Safe diagnostics only: never log the secrets themselves.
        info!(
            "scraper cfg loaded: query={:?}, interval={}s, destinations={}, key_len={}",
            cfg.search.query,
            cfg.poll.interval_secs,
            cfg.destinations.len(),
            cfg.search.api_key.len()
        );

        let store: Arc<dyn DropStore> = Arc::new(JsonStore::open(&cfg.store.path).await?);
        let transport: Arc<dyn MessageTransport> = Arc::new(TelegramTransport::new(
            cfg.telegram.api_base.clone(),
            cfg.telegram.bot_token.clone(),
        ));
        let notifier = Notifier::new(transport.clone(), Arc::new(HttpUrlResolver::new()), store.clone())
            .with_policy(RetryPolicy {
                attempts: cfg.telegram.send_attempts,
                backoff: cfg.retry_backoff(),
            });

        let supervisor = Supervisor::new(SupervisorDeps {
            sources: Arc::new(RapidApiFactory::new(cfg.search.clone())),
            store: store.clone(),
            notifier: Arc::new(notifier),
            settings: PollSettings {
                interval: cfg.poll_interval(),
                dispatch_pause: cfg.dispatch_pause(),
            },
            lookback_secs: cfg.poll.lookback_secs,
            destinations: cfg.destinations.clone(),
        });

        let state = AppState {
            supervisor: Arc::new(supervisor),
            store,
            transport,
            admins: cfg.admins.clone(),
            webhook_secret: cfg.telegram.webhook_secret.clone(),
        };
        Ok(Self { cfg, state })
    }

    /// Start the chats listed under `autostart`.
    pub async fn autostart(&self) {
        for chat_id in &self.cfg.autostart {
            let status = self.state.supervisor.start(*chat_id).await;
            info!(chat_id, ?status, "autostart");
        }
    }
}

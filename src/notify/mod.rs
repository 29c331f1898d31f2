//! Formatting and delivery of tweet notifications.

pub mod links;
pub mod telegram;

use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::ingest::types::{ChatId, Item};
use crate::store::{DropStore, MessageId, StoreError};
use links::UrlResolver;

/// Forum topic a post is routed to, by author reach.
pub fn audience_tier(follower_count: u64) -> i64 {
    if follower_count > 1_000_000 {
        6
    } else if follower_count > 100_000 {
        5
    } else if follower_count > 10_000 {
        4
    } else {
        3
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum InlineButton {
    Url { text: String, url: String },
    Callback { text: String, callback_data: String },
}

impl InlineButton {
    pub fn url(text: &str, url: impl Into<String>) -> Self {
        Self::Url {
            text: text.to_string(),
            url: url.into(),
        }
    }

    pub fn callback(text: &str, data: impl Into<String>) -> Self {
        Self::Callback {
            text: text.to_string(),
            callback_data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub chat_id: ChatId,
    pub thread_id: Option<i64>,
    pub text: String,
    pub html: bool,
    pub keyboard: Vec<Vec<InlineButton>>,
    pub link_preview_url: Option<String>,
}

impl OutgoingMessage {
    /// Plain status text to the chat's main thread.
    pub fn plain(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            thread_id: None,
            text: text.into(),
            html: false,
            keyboard: Vec::new(),
            link_preview_url: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("malformed reply: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("undelivered after {attempts} attempts: {last}")]
    Undelivered { attempts: u32, last: DeliveryError },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Messaging transport: one send, no retries.
#[async_trait::async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, msg: &OutgoingMessage) -> Result<MessageId, DeliveryError>;

    /// Acknowledge an inline button press. Transports without buttons ignore it.
    async fn answer_callback(&self, _callback_id: &str, _text: &str) -> Result<(), DeliveryError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// The "Block" button payload: `block:{handle}:{author_id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockAction {
    pub author_handle: String,
    pub author_id: String,
}

impl BlockAction {
    pub fn encode(&self) -> String {
        format!("block:{}:{}", self.author_handle, self.author_id)
    }

    pub fn parse(data: &str) -> Option<Self> {
        let rest = data.strip_prefix("block:")?;
        let (handle, id) = rest.rsplit_once(':')?;
        if handle.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self {
            author_handle: handle.to_string(),
            author_id: id.to_string(),
        })
    }
}

pub fn render_text(body: &str, follower_count: u64) -> String {
    format!(
        "<b>NEW TWEET</b>\n\n{}\n\nFollowers: {}\n",
        html_escape::encode_text(body),
        follower_count
    )
}

pub fn build_keyboard(item: &Item, mint_url: Option<String>) -> Vec<Vec<InlineButton>> {
    let block = BlockAction {
        author_handle: item.author_handle.clone(),
        author_id: item.author_id.clone(),
    };
    let mut rows = vec![vec![
        InlineButton::url("Tweet", item.post_url()),
        InlineButton::url("Profile", item.profile_url()),
        InlineButton::callback("Block", block.encode()),
    ]];
    if let Some(url) = mint_url {
        rows.push(vec![InlineButton::url("Pump", url)]);
    }
    rows
}

pub struct Notifier {
    transport: Arc<dyn MessageTransport>,
    resolver: Arc<dyn UrlResolver>,
    store: Arc<dyn DropStore>,
    policy: RetryPolicy,
}

impl Notifier {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        resolver: Arc<dyn UrlResolver>,
        store: Arc<dyn DropStore>,
    ) -> Self {
        Self {
            transport,
            resolver,
            store,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn transport(&self) -> &Arc<dyn MessageTransport> {
        &self.transport
    }

    /// Build the message for `item` without sending it.
    pub async fn compose(&self, item: &Item, chat_id: ChatId) -> OutgoingMessage {
        let body = links::replace_short_urls(&item.text, self.resolver.as_ref()).await;
        let mint_url = links::extract_mint_url(&body);
        OutgoingMessage {
            chat_id,
            thread_id: Some(audience_tier(item.follower_count)),
            text: render_text(&body, item.follower_count),
            html: true,
            keyboard: build_keyboard(item, mint_url),
            link_preview_url: Some(item.post_url()),
        }
    }

    /// Send with bounded retries. On success the message id is recorded on the
    /// author's drop record.
    pub async fn notify(&self, item: &Item, chat_id: ChatId) -> Result<MessageId, NotifyError> {
        let msg = self.compose(item, chat_id).await;
        let attempts = self.policy.attempts.max(1);

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.transport.send(&msg).await {
                Ok(message_id) => {
                    counter!("scraper_dispatched_total").increment(1);
                    self.store.record_message(&item.author_id, message_id).await?;
                    return Ok(message_id);
                }
                Err(e) => {
                    tracing::warn!(
                        target: "notify",
                        chat_id,
                        tweet_id = %item.tweet_id,
                        attempt,
                        error = %e,
                        "failed to send message"
                    );
                    if attempt >= attempts {
                        counter!("scraper_undelivered_total").increment(1);
                        return Err(NotifyError::Undelivered { attempts, last: e });
                    }
                    tokio::time::sleep(self.policy.backoff).await;
                }
            }
        }
    }
}

//! Dedup/moderation store: ban list + per-author "drop" records.

pub mod json;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use json::JsonStore;

/// Telegram message id of a delivered notification.
pub type MessageId = i64;

/// Which posts of an author already triggered a notification.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DropRecord {
    pub author_id: String,
    pub author_handle: String,
    #[serde(default)]
    pub post_ids: Vec<String>,
    #[serde(default)]
    pub message_ids: Vec<MessageId>,
}

impl DropRecord {
    pub fn has_post(&self, post_id: &str) -> bool {
        self.post_ids.iter().any(|p| p == post_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BanRecord {
    pub author_id: String,
    pub author_handle: String,
    pub banned_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("store data corrupt: {0}")]
    Corrupt(String),
}

/// Every call completes or fails on its own; nothing spans calls.
/// Implementations must be safe to share between polling tasks.
#[async_trait::async_trait]
pub trait DropStore: Send + Sync {
    async fn is_banned(&self, author_id: &str) -> Result<bool, StoreError>;
    async fn get_drop(&self, author_id: &str) -> Result<Option<DropRecord>, StoreError>;
    /// Creates the record; if it already exists the post id is appended instead.
    async fn insert_drop(
        &self,
        author_id: &str,
        author_handle: &str,
        post_id: &str,
    ) -> Result<(), StoreError>;
    async fn append_post(&self, author_id: &str, post_id: &str) -> Result<(), StoreError>;
    async fn record_message(&self, author_id: &str, message_id: MessageId)
        -> Result<(), StoreError>;
    /// Administrative write used by the Block action.
    async fn ban(&self, author_id: &str, author_handle: &str) -> Result<(), StoreError>;
}

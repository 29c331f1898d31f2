// src/ingest/types.rs
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Telegram chat id of a destination.
pub type ChatId = i64;

/// A post returned by the search API. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub tweet_id: String,
    pub author_id: String,
    pub author_handle: String,
    pub follower_count: u64,
    pub text: String,
    pub timestamp: i64, // unix seconds
}

impl Item {
    pub fn post_url(&self) -> String {
        format!(
            "https://twitter.com/{}/status/{}",
            self.author_handle, self.tweet_id
        )
    }

    pub fn profile_url(&self) -> String {
        format!("https://x.com/{}", self.author_handle)
    }
}

/// One page of search results, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub items: Vec<Item>,
    pub cursor: Option<String>,
}

impl Page {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Highest timestamp on the page (the first item when the feed is ordered).
    pub fn newest_timestamp(&self) -> Option<i64> {
        self.items.iter().map(|it| it.timestamp).max()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("search request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("search API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed search response: {0}")]
    Malformed(String),
}

/// A search session. Each polling task owns its own.
#[async_trait::async_trait]
pub trait SearchSource: Send + Sync {
    /// Fetch one page; `cursor` continues a previous page.
    async fn fetch(&self, cursor: Option<&str>) -> Result<Page, FetchError>;
    fn name(&self) -> &'static str;
}

/// Opens a fresh search session for a newly started polling task.
pub trait SourceFactory: Send + Sync {
    fn open(&self, started_at: chrono::DateTime<chrono::Utc>) -> std::sync::Arc<dyn SearchSource>;
}

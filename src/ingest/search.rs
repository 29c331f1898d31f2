// src/ingest/search.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::scraper::SearchConfig;
use crate::ingest::types::{FetchError, Item, Page, SearchSource, SourceFactory};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RawTweet>,
    #[serde(default)]
    continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTweet {
    tweet_id: String,
    #[serde(default)]
    text: String,
    timestamp: i64,
    user: RawUser,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    user_id: String,
    username: String,
    #[serde(default)]
    follower_count: u64,
}

impl From<RawTweet> for Item {
    fn from(t: RawTweet) -> Self {
        Item {
            tweet_id: t.tweet_id,
            author_id: t.user.user_id,
            author_handle: t.user.username,
            follower_count: t.user.follower_count,
            text: t.text,
            timestamp: t.timestamp,
        }
    }
}

/// Parse a search response body into a page.
pub fn parse_page(body: &str) -> Result<Page, FetchError> {
    let rsp: SearchResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    Ok(Page {
        items: rsp.results.into_iter().map(Item::from).collect(),
        cursor: rsp.continuation_token.filter(|c| !c.is_empty()),
    })
}

/// RapidAPI tweet search session. Query parameters are fixed at construction.
pub struct RapidApiSearch {
    client: Client,
    cfg: SearchConfig,
    start_date: String,
}

impl RapidApiSearch {
    pub fn new(cfg: SearchConfig, started_at: DateTime<Utc>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            start_date: started_at.format("%Y-%m-%d").to_string(),
            cfg,
        }
    }

    pub fn start_date(&self) -> &str {
        &self.start_date
    }

    fn query(&self, cursor: Option<&str>) -> Vec<(&'static str, String)> {
        let mut q = vec![
            ("query", self.cfg.query.clone()),
            ("section", self.cfg.section.clone()),
            ("min_retweets", self.cfg.min_retweets.to_string()),
            ("min_likes", self.cfg.min_likes.to_string()),
            ("limit", self.cfg.limit.to_string()),
            ("min_replies", self.cfg.min_replies.to_string()),
            ("start_date", self.start_date.clone()),
            ("language", self.cfg.language.clone()),
        ];
        if let Some(c) = cursor {
            q.push(("continuation_token", c.to_string()));
        }
        q
    }
}

#[async_trait]
impl SearchSource for RapidApiSearch {
    async fn fetch(&self, cursor: Option<&str>) -> Result<Page, FetchError> {
        tracing::info!(target: "search", continuation = cursor.is_some(), "fetching data");
        let t0 = std::time::Instant::now();

        let rsp = self
            .client
            .get(&self.cfg.url)
            .header("X-RapidAPI-Key", &self.cfg.api_key)
            .header("X-RapidAPI-Host", &self.cfg.host)
            .query(&self.query(cursor))
            .send()
            .await?;

        let status = rsp.status();
        let body = rsp.text().await?;
        histogram!("scraper_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let page = parse_page(&body)?;
        counter!("scraper_fetched_items_total").increment(page.items.len() as u64);
        Ok(page)
    }

    fn name(&self) -> &'static str {
        "rapidapi-twitter154"
    }
}

/// Opens a new `RapidApiSearch` (own HTTP connection pool) per polling task.
pub struct RapidApiFactory {
    cfg: SearchConfig,
}

impl RapidApiFactory {
    pub fn new(cfg: SearchConfig) -> Self {
        Self { cfg }
    }
}

impl SourceFactory for RapidApiFactory {
    fn open(&self, started_at: DateTime<Utc>) -> Arc<dyn SearchSource> {
        Arc::new(RapidApiSearch::new(self.cfg.clone(), started_at))
    }
}

/// Follow continuation cursors for up to `max_pages` pages (backfill only).
/// Stops early on an empty page, a missing cursor, or a fetch error after
/// at least one page was read.
pub async fn collect_pages(
    source: &dyn SearchSource,
    max_pages: usize,
) -> Result<Vec<Item>, FetchError> {
    let mut out = Vec::new();
    let mut cursor: Option<String> = None;

    for n in 0..max_pages {
        let page = match source.fetch(cursor.as_deref()).await {
            Ok(p) => p,
            Err(e) if n > 0 => {
                tracing::warn!(target: "search", error = %e, page = n, "continuation fetch failed");
                break;
            }
            Err(e) => return Err(e),
        };
        if page.is_empty() {
            break;
        }
        out.extend(page.items);
        match page.cursor {
            Some(c) => cursor = Some(c),
            None => break,
        }
    }

    Ok(out)
}

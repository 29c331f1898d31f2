// src/config/scraper.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::ingest::types::ChatId;

pub const ENV_CONFIG_PATH: &str = "SCRAPER_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/scraper.toml";
const ENV_API_KEY: &str = "RAPIDAPI_KEY";
const ENV_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
/// Lower bound for `poll.interval_secs`.
pub const MIN_INTERVAL_SECS: u64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub url: String,
    pub host: String,
    /// "ENV" means: read from RAPIDAPI_KEY
    pub api_key: String,
    pub query: String,
    pub section: String,
    pub min_retweets: u32,
    pub min_likes: u32,
    pub min_replies: u32,
    pub limit: u32,
    pub language: String,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: "https://twitter154.p.rapidapi.com/search/search".into(),
            host: "twitter154.p.rapidapi.com".into(),
            api_key: "ENV".into(),
            query: "'pump.fun' filter:links".into(),
            section: "latest".into(),
            min_retweets: 0,
            min_likes: 0,
            min_replies: 0,
            limit: 20,
            language: "en".into(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_secs: u64,
    pub dispatch_pause_ms: u64,
    /// Initial watermark = start time minus this many seconds.
    pub lookback_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            dispatch_pause_ms: 1000,
            lookback_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub api_base: String,
    /// "ENV" means: read from TELEGRAM_BOT_TOKEN
    pub bot_token: String,
    pub send_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` on webhook calls.
    pub webhook_secret: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".into(),
            bot_token: "ENV".into(),
            send_attempts: 3,
            retry_backoff_ms: 1000,
            webhook_secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("state/drops.json"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub search: SearchConfig,
    pub poll: PollConfig,
    pub telegram: TelegramConfig,
    pub store: StoreConfig,
    /// Chats allowed to run a scraper. Empty = any.
    pub destinations: Vec<ChatId>,
    /// Chats started at boot.
    pub autostart: Vec<ChatId>,
    /// Telegram user ids allowed to issue chat commands. Empty = any.
    pub admins: Vec<i64>,
}

impl ScraperConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading scraper config from {}", path.display()))?;
        let cfg: ScraperConfig = toml::from_str(&data)
            .with_context(|| format!("parsing scraper config {}", path.display()))?;
        cfg.finish()
    }

    /// Load using env var + fallbacks:
    /// 1) $SCRAPER_CONFIG_PATH
    /// 2) config/scraper.toml
    /// 3) built-in defaults (secrets still resolved from env)
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from_file(&pb);
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from_file(&default_p);
        }
        Self::default().finish()
    }

    fn finish(mut self) -> Result<Self> {
        self.search.api_key = resolve_secret(&self.search.api_key, ENV_API_KEY);
        self.telegram.bot_token = resolve_secret(&self.telegram.bot_token, ENV_BOT_TOKEN);

        if self.search.limit == 0 {
            self.search.limit = SearchConfig::default().limit;
        }
        if self.telegram.send_attempts == 0 {
            self.telegram.send_attempts = 1;
        }
        self.poll.interval_secs = self.poll.interval_secs.max(MIN_INTERVAL_SECS);
        self.telegram.api_base = self.telegram.api_base.trim_end_matches('/').to_string();
        Ok(self)
    }

    /// The search key is needed by every entrypoint.
    pub fn require_search_key(&self) -> Result<()> {
        if self.search.api_key.is_empty() {
            return Err(anyhow!("Missing {ENV_API_KEY} env var (or search.api_key)"));
        }
        Ok(())
    }

    /// The service also needs the bot token.
    pub fn require_secrets(&self) -> Result<()> {
        self.require_search_key()?;
        if self.telegram.bot_token.is_empty() {
            return Err(anyhow!("Missing {ENV_BOT_TOKEN} env var (or telegram.bot_token)"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll.interval_secs)
    }

    pub fn dispatch_pause(&self) -> Duration {
        Duration::from_millis(self.poll.dispatch_pause_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.telegram.retry_backoff_ms)
    }
}

/// Allow-list check shared by `destinations` and `admins`: empty permits any id.
pub fn permits(list: &[i64], id: i64) -> bool {
    list.is_empty() || list.contains(&id)
}

/// "ENV" or empty → env var (empty if unset); anything else is used as is.
fn resolve_secret(raw: &str, var: &str) -> String {
    let t = raw.trim();
    if t.is_empty() || t.eq_ignore_ascii_case("env") {
        return env::var(var).unwrap_or_default().trim().to_string();
    }
    t.to_string()
}

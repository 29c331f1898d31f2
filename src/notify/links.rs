// src/notify/links.rs
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;

/// Resolves a shortened link to its destination. `None` keeps the original.
#[async_trait]
pub trait UrlResolver: Send + Sync {
    async fn resolve(&self, short: &str) -> Option<String>;
}

/// Follows redirects with a HEAD request and reports the final URL.
pub struct HttpUrlResolver {
    client: Client,
}

impl HttpUrlResolver {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpUrlResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UrlResolver for HttpUrlResolver {
    async fn resolve(&self, short: &str) -> Option<String> {
        match self.client.head(short).send().await {
            Ok(rsp) => {
                let url = rsp.url().to_string();
                (url != short).then_some(url)
            }
            Err(e) => {
                tracing::debug!(target: "notify", url = short, error = %e, "short link not resolved");
                None
            }
        }
    }
}

/// Leaves links untouched. Used by dry runs and tests.
pub struct NoopResolver;

#[async_trait]
impl UrlResolver for NoopResolver {
    async fn resolve(&self, _short: &str) -> Option<String> {
        None
    }
}

fn short_url_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"https?://t\.co/[A-Za-z0-9]+").expect("short url regex"))
}

fn pump_url_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:https?://)?(?:www\.)?pump\.fun/(?:coin/)?([1-9A-HJ-NP-Za-km-z]{32,44})\b")
            .expect("pump url regex")
    })
}

/// Replace every `t.co` link in `text` with what it points to.
pub async fn replace_short_urls(text: &str, resolver: &dyn UrlResolver) -> String {
    let mut resolved: std::collections::HashMap<&str, Option<String>> = Default::default();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in short_url_re().find_iter(text) {
        let short = m.as_str();
        if !resolved.contains_key(short) {
            let full = resolver.resolve(short).await;
            resolved.insert(short, full);
        }
        out.push_str(&text[last..m.start()]);
        match resolved.get(short).and_then(|f| f.as_deref()) {
            Some(full) => out.push_str(full),
            None => out.push_str(short),
        }
        last = m.end();
    }
    out.push_str(&text[last..]);
    out
}

/// A base58 mint address: 32..=44 chars, no 0/O/I/l.
pub fn is_mint_address(s: &str) -> bool {
    (32..=44).contains(&s.len())
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() && !matches!(c, '0' | 'O' | 'I' | 'l'))
}

/// First pump.fun coin reference in the text, normalized to its coin page.
pub fn extract_mint_url(text: &str) -> Option<String> {
    pump_url_re()
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .find(|mint| is_mint_address(mint))
        .map(|mint| format!("https://pump.fun/coin/{mint}"))
}

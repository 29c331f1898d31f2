//! One-off dry run: fetch the current search results (optionally following
//! continuation pages) and show what a polling cycle would do with them.
//! Nothing is written to the store and nothing is sent.
//!
//! Usage: scrape_once [--pages N] [--lookback SECS] [--resolve]

use std::sync::Arc;

use chrono::Utc;
use tweet_drop_watcher::config::ScraperConfig;
use tweet_drop_watcher::ingest::search::{collect_pages, RapidApiSearch};
use tweet_drop_watcher::ingest::watermark::Watermark;
use tweet_drop_watcher::ingest::{preview, Verdict};
use tweet_drop_watcher::notify::links::{HttpUrlResolver, NoopResolver, UrlResolver};
use tweet_drop_watcher::notify::{DeliveryError, MessageTransport, Notifier, OutgoingMessage};
use tweet_drop_watcher::store::{DropStore, JsonStore, MessageId};

struct DryRunTransport;

#[async_trait::async_trait]
impl MessageTransport for DryRunTransport {
    async fn send(&self, _msg: &OutgoingMessage) -> Result<MessageId, DeliveryError> {
        Err(DeliveryError::Rejected("dry run".into()))
    }
}

struct Args {
    pages: usize,
    lookback: Option<u64>,
    resolve: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut out = Args {
        pages: 1,
        lookback: None,
        resolve: false,
    };
    let mut it = std::env::args().skip(1);
    while let Some(a) = it.next() {
        match a.as_str() {
            "--pages" => out.pages = it.next().unwrap_or_default().parse()?,
            "--lookback" => out.lookback = Some(it.next().unwrap_or_default().parse()?),
            "--resolve" => out.resolve = true,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(out)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = parse_args()?;
    let cfg = ScraperConfig::load_default()?;
    cfg.require_search_key()?;

    let now = Utc::now();
    let watermark = Watermark::starting_at(now, args.lookback.unwrap_or(cfg.poll.lookback_secs));
    let source = RapidApiSearch::new(cfg.search.clone(), now);
    let items = collect_pages(&source, args.pages.max(1)).await?;

    let store: Arc<dyn DropStore> = Arc::new(JsonStore::open(&cfg.store.path).await?);
    let verdicts = preview(&items, &watermark, store.as_ref()).await?;

    let resolver: Arc<dyn UrlResolver> = if args.resolve {
        Arc::new(HttpUrlResolver::new())
    } else {
        Arc::new(NoopResolver)
    };
    let notifier = Notifier::new(Arc::new(DryRunTransport), resolver, store.clone());

    println!(
        "{} items, watermark {} (start_date {})",
        items.len(),
        watermark.value(),
        source.start_date()
    );
    for (item, verdict) in items.iter().zip(&verdicts) {
        println!(
            "{:>10}  {:<9} @{} ({} followers) {}",
            item.timestamp,
            format!("{verdict:?}"),
            item.author_handle,
            item.follower_count,
            item.post_url()
        );
        if *verdict == Verdict::New {
            let msg = notifier.compose(item, 0).await;
            println!("    topic {:?}\n{}", msg.thread_id, msg.text);
        }
    }

    Ok(())
}

// src/ingest/mod.rs
pub mod poller;
pub mod search;
pub mod supervisor;
pub mod types;
pub mod watermark;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

use crate::ingest::types::Item;
use crate::ingest::watermark::Watermark;
use crate::store::DropStore;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("scraper_cycles_total", "Polling cycles started.");
        describe_counter!(
            "scraper_fetch_errors_total",
            "Cycles that got no data because the search fetch failed."
        );
        describe_counter!(
            "scraper_cycle_aborts_total",
            "Cycles abandoned because of a store error."
        );
        describe_counter!(
            "scraper_fetched_items_total",
            "Items returned by the search API."
        );
        describe_counter!(
            "scraper_items_fresh_total",
            "Items newer than the task watermark."
        );
        describe_counter!("scraper_dispatched_total", "Notifications delivered.");
        describe_counter!(
            "scraper_undelivered_total",
            "Notifications given up after all send attempts."
        );
        describe_counter!(
            "scraper_skipped_banned_total",
            "Items skipped because the author is banned."
        );
        describe_counter!(
            "scraper_skipped_duplicate_total",
            "Items skipped because the post was already notified."
        );
        describe_histogram!("scraper_fetch_ms", "Search fetch time in milliseconds.");
        describe_gauge!("scraper_active_tasks", "Running polling tasks.");
        describe_gauge!(
            "scraper_watermark_ts",
            "Unix ts of the newest processed item, per chat."
        );
    });
}

/// What a dry run would do with an item, without writing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Old,
    Banned,
    Duplicate,
    New,
}

/// Classify items against a watermark and the store (read-only).
pub async fn preview(
    items: &[Item],
    watermark: &Watermark,
    store: &dyn DropStore,
) -> anyhow::Result<Vec<Verdict>> {
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let v = if !watermark.should_process(it) {
            Verdict::Old
        } else if store.is_banned(&it.author_id).await? {
            Verdict::Banned
        } else if store
            .get_drop(&it.author_id)
            .await?
            .is_some_and(|d| d.has_post(&it.tweet_id))
        {
            Verdict::Duplicate
        } else {
            Verdict::New
        };
        out.push(v);
    }
    Ok(out)
}

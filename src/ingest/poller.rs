// src/ingest/poller.rs
//! Per-destination polling loop:
//! fetch → filter by watermark → ban/drop check → notify → advance → sleep.
//!
//! Recovery policies:
//! - fetch errors and empty pages are no-op cycles (watermark untouched);
//! - delivery failures are retried inside the notifier, then logged and skipped;
//! - store errors abandon the cycle *without* advancing the watermark, so the
//!   next cycle re-evaluates the same page. Already-recorded posts are then
//!   suppressed by their drop records.
//!
//! Cancellation is observed while fetching, pausing between dispatches,
//! sleeping, and before each item. An item whose store/notify work has
//! started is finished first.

use metrics::{counter, gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::ingest::types::{ChatId, Item, SearchSource};
use crate::ingest::watermark::Watermark;
use crate::notify::{Notifier, NotifyError};
use crate::store::{DropStore, MessageId, StoreError};

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub dispatch_pause: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            dispatch_pause: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Fetching,
    Filtering,
    Dispatching,
    Sleeping,
    Cancelled,
}

/// What happened to a single fresh item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Banned,
    Duplicate,
    Notified(MessageId),
    Undelivered,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub fresh: usize,
    pub notified: usize,
    pub undelivered: usize,
    pub banned: usize,
    pub duplicate: usize,
}

impl CycleReport {
    fn record(&mut self, d: &Dispatch) {
        match d {
            Dispatch::Banned => self.banned += 1,
            Dispatch::Duplicate => self.duplicate += 1,
            Dispatch::Notified(_) => self.notified += 1,
            Dispatch::Undelivered => self.undelivered += 1,
        }
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// Fetch failed; nothing changed.
    FetchFailed,
    /// Fetch returned no results; nothing changed.
    Empty,
    Completed(CycleReport),
    /// A store call failed part-way; watermark untouched.
    Aborted(StoreError),
    Cancelled,
}

pub struct PollingTask {
    chat_id: ChatId,
    source: Arc<dyn SearchSource>,
    store: Arc<dyn DropStore>,
    notifier: Arc<Notifier>,
    watermark: Watermark,
    settings: PollSettings,
    state: PollState,
}

impl PollingTask {
    pub fn new(
        chat_id: ChatId,
        source: Arc<dyn SearchSource>,
        store: Arc<dyn DropStore>,
        notifier: Arc<Notifier>,
        watermark: Watermark,
        settings: PollSettings,
    ) -> Self {
        Self {
            chat_id,
            source,
            store,
            notifier,
            watermark,
            settings,
            state: PollState::Idle,
        }
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Run cycles until `cancel` fires. Returns the final watermark.
    pub async fn run(mut self, cancel: CancellationToken) -> Watermark {
        tracing::info!(
            target: "poller",
            chat_id = self.chat_id,
            source = self.source.name(),
            watermark = self.watermark.value(),
            "polling task started"
        );

        loop {
            let outcome = self.run_cycle(&cancel).await;
            if matches!(outcome, CycleOutcome::Cancelled) {
                break;
            }
            self.log_outcome(&outcome);

            self.state = PollState::Sleeping;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }

        self.state = PollState::Cancelled;
        tracing::info!(
            target: "poller",
            chat_id = self.chat_id,
            watermark = self.watermark.value(),
            "polling task cancelled"
        );
        self.watermark
    }

    /// One fetch/filter/dispatch pass. Never panics on collaborator errors.
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> CycleOutcome {
        counter!("scraper_cycles_total").increment(1);

        self.state = PollState::Fetching;
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return CycleOutcome::Cancelled,
            res = self.source.fetch(None) => res,
        };
        let page = match fetched {
            Ok(p) => p,
            Err(e) => {
                counter!("scraper_fetch_errors_total").increment(1);
                tracing::warn!(target: "poller", chat_id = self.chat_id, error = %e, "fetch failed");
                return CycleOutcome::FetchFailed;
            }
        };
        let Some(newest) = page.newest_timestamp() else {
            return CycleOutcome::Empty;
        };

        self.state = PollState::Filtering;
        let fresh = self.watermark.fresh(&page);
        counter!("scraper_items_fresh_total").increment(fresh.len() as u64);
        let mut report = CycleReport {
            fetched: page.items.len(),
            fresh: fresh.len(),
            ..CycleReport::default()
        };

        self.state = PollState::Dispatching;
        for (i, item) in fresh.into_iter().enumerate() {
            if i > 0 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return CycleOutcome::Cancelled,
                    _ = tokio::time::sleep(self.settings.dispatch_pause) => {}
                }
            }
            if cancel.is_cancelled() {
                return CycleOutcome::Cancelled;
            }
            match self.dispatch(item).await {
                Ok(d) => report.record(&d),
                Err(e) => {
                    counter!("scraper_cycle_aborts_total").increment(1);
                    return CycleOutcome::Aborted(e);
                }
            }
        }

        if self.watermark.advance(newest) {
            gauge!("scraper_watermark_ts", "chat_id" => self.chat_id.to_string())
                .set(newest as f64);
        }
        CycleOutcome::Completed(report)
    }

    /// Ban check, drop-record check/update, then notify.
    /// The drop record is written before sending, so an undelivered item is
    /// still marked as processed.
    pub async fn dispatch(&self, item: &Item) -> Result<Dispatch, StoreError> {
        if self.store.is_banned(&item.author_id).await? {
            counter!("scraper_skipped_banned_total").increment(1);
            tracing::info!(target: "poller", author_id = %item.author_id, "author is banned");
            return Ok(Dispatch::Banned);
        }

        match self.store.get_drop(&item.author_id).await? {
            Some(drop) if drop.has_post(&item.tweet_id) => {
                counter!("scraper_skipped_duplicate_total").increment(1);
                tracing::info!(target: "poller", tweet_id = %item.tweet_id, "tweet already exists");
                return Ok(Dispatch::Duplicate);
            }
            Some(_) => {
                self.store
                    .append_post(&item.author_id, &item.tweet_id)
                    .await?
            }
            None => {
                self.store
                    .insert_drop(&item.author_id, &item.author_handle, &item.tweet_id)
                    .await?
            }
        }

        tracing::info!(
            target: "poller",
            chat_id = self.chat_id,
            tweet_id = %item.tweet_id,
            author = %item.author_handle,
            "new tweet found"
        );
        match self.notifier.notify(item, self.chat_id).await {
            Ok(id) => Ok(Dispatch::Notified(id)),
            Err(NotifyError::Undelivered { attempts, last }) => {
                tracing::error!(
                    target: "poller",
                    chat_id = self.chat_id,
                    tweet_id = %item.tweet_id,
                    attempts,
                    error = %last,
                    "tweet undelivered"
                );
                Ok(Dispatch::Undelivered)
            }
            Err(NotifyError::Store(e)) => Err(e),
        }
    }

    fn log_outcome(&self, outcome: &CycleOutcome) {
        let chat_id = self.chat_id;
        let watermark = self.watermark.value();
        match outcome {
            CycleOutcome::FetchFailed => {
                tracing::info!(target: "poller", chat_id, watermark, "no data this cycle; sleeping")
            }
            CycleOutcome::Empty => {
                tracing::info!(target: "poller", chat_id, watermark, "no results found; sleeping")
            }
            CycleOutcome::Completed(r) => tracing::info!(
                target: "poller",
                chat_id,
                watermark,
                fetched = r.fetched,
                fresh = r.fresh,
                notified = r.notified,
                undelivered = r.undelivered,
                banned = r.banned,
                duplicate = r.duplicate,
                "cycle done; sleeping"
            ),
            CycleOutcome::Aborted(e) => tracing::error!(
                target: "poller",
                chat_id,
                watermark,
                error = %e,
                "cycle abandoned; sleeping"
            ),
            CycleOutcome::Cancelled => {}
        }
    }
}

// src/ingest/watermark.rs
use chrono::{DateTime, Utc};

use crate::ingest::types::{Item, Page};

/// Timestamp boundary of already-processed items.
/// - `should_process` does NOT mutate state.
/// - `advance` only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    latest: i64,
}

impl Watermark {
    pub fn new(latest: i64) -> Self {
        Self { latest }
    }

    /// Start slightly in the past so posts from just before startup are not lost.
    pub fn starting_at(now: DateTime<Utc>, lookback_secs: u64) -> Self {
        let lookback = i64::try_from(lookback_secs).unwrap_or(i64::MAX);
        Self::new(now.timestamp().saturating_sub(lookback))
    }

    pub fn value(&self) -> i64 {
        self.latest
    }

    pub fn should_process(&self, item: &Item) -> bool {
        item.timestamp > self.latest
    }

    /// Returns true if the watermark moved.
    pub fn advance(&mut self, newest: i64) -> bool {
        if newest > self.latest {
            self.latest = newest;
            true
        } else {
            false
        }
    }

    /// Items newer than the watermark, in feed order. Scans the whole page
    /// so an out-of-order feed cannot hide newer items behind an old one.
    pub fn fresh<'a>(&self, page: &'a Page) -> Vec<&'a Item> {
        page.items
            .iter()
            .filter(|it| self.should_process(it))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(ts: i64) -> Item {
        Item {
            tweet_id: ts.to_string(),
            author_id: "a".into(),
            author_handle: "h".into(),
            follower_count: 0,
            text: String::new(),
            timestamp: ts,
        }
    }

    #[test]
    fn at_or_below_watermark_is_skipped() {
        let wm = Watermark::new(85);
        assert!(!wm.should_process(&item(85)));
        assert!(!wm.should_process(&item(10)));
        assert!(wm.should_process(&item(86)));
    }

    #[test]
    fn never_moves_backwards() {
        let mut wm = Watermark::new(100);
        assert!(!wm.advance(90));
        assert_eq!(wm.value(), 100);
        assert!(!wm.advance(100));
        assert!(wm.advance(120));
        assert_eq!(wm.value(), 120);
    }

    #[test]
    fn starts_before_now() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let wm = Watermark::starting_at(now, 60);
        assert_eq!(wm.value(), now.timestamp() - 60);
    }

    #[test]
    fn fresh_scans_past_old_items() {
        let wm = Watermark::new(85);
        let page = Page {
            items: vec![item(100), item(80), item(90)],
            cursor: None,
        };
        let ts: Vec<i64> = wm.fresh(&page).iter().map(|i| i.timestamp).collect();
        assert_eq!(ts, vec![100, 90]);
    }
}

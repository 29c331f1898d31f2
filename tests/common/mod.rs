// tests/common/mod.rs
// In-process fakes for the polling core's collaborators.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tweet_drop_watcher::ingest::poller::{PollSettings, PollingTask};
use tweet_drop_watcher::ingest::types::{FetchError, Item, Page, SearchSource, SourceFactory};
use tweet_drop_watcher::ingest::watermark::Watermark;
use tweet_drop_watcher::notify::links::NoopResolver;
use tweet_drop_watcher::notify::{
    DeliveryError, MessageTransport, Notifier, OutgoingMessage, RetryPolicy,
};
use tweet_drop_watcher::store::{
    DropRecord, DropStore, JsonStore, MessageId, StoreError,
};

pub fn item(id: &str, author: &str, ts: i64) -> Item {
    Item {
        tweet_id: id.to_string(),
        author_id: author.to_string(),
        author_handle: format!("{author}_handle"),
        follower_count: 20_000,
        text: format!("post {id}"),
        timestamp: ts,
    }
}

pub fn page(items: Vec<Item>) -> Page {
    Page {
        items,
        cursor: None,
    }
}

/// Returns scripted pages in order, then empty pages forever.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Page, FetchError>>>,
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Page, FetchError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchSource for ScriptedSource {
    async fn fetch(&self, _cursor: Option<&str>) -> Result<Page, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Page::default()))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Hands the same scripted source to every task and counts opens.
pub struct SharedFactory {
    pub source: Arc<ScriptedSource>,
    pub opens: AtomicUsize,
}

impl SharedFactory {
    pub fn new(source: Arc<ScriptedSource>) -> Arc<Self> {
        Arc::new(Self {
            source,
            opens: AtomicUsize::new(0),
        })
    }
}

impl SourceFactory for SharedFactory {
    fn open(&self, _started_at: DateTime<Utc>) -> Arc<dyn SearchSource> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.source.clone()
    }
}

/// Records every send; the first `fail_first` sends fail.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<OutgoingMessage>>,
    pub attempts: AtomicUsize,
    /// Clock reading at every send attempt (virtual under paused time).
    pub attempt_times: Mutex<Vec<tokio::time::Instant>>,
    pub callbacks: Mutex<Vec<(String, String)>>,
    fail_first: usize,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(fail_first: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_first,
            ..Self::default()
        })
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Texts of non-HTML (status) messages.
    pub fn statuses(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|m| !m.html)
            .map(|m| m.text)
            .collect()
    }

    /// Rendered tweet notifications.
    pub fn notifications(&self) -> Vec<OutgoingMessage> {
        self.sent().into_iter().filter(|m| m.html).collect()
    }
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn send(&self, msg: &OutgoingMessage) -> Result<MessageId, DeliveryError> {
        self.attempt_times
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        let n = self.attempts.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            return Err(DeliveryError::Rejected("Too Many Requests".into()));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(msg.clone());
        Ok(1000 + sent.len() as MessageId)
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), DeliveryError> {
        self.callbacks
            .lock()
            .unwrap()
            .push((callback_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Wraps a `JsonStore`; writes fail while `fail_writes` is set.
pub struct FlakyStore {
    pub inner: JsonStore,
    pub fail_writes: std::sync::atomic::AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: JsonStore::in_memory(),
            fail_writes: Default::default(),
        })
    }

    pub fn set_failing(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        Ok(())
    }
}

#[async_trait]
impl DropStore for FlakyStore {
    async fn is_banned(&self, author_id: &str) -> Result<bool, StoreError> {
        self.inner.is_banned(author_id).await
    }
    async fn get_drop(&self, author_id: &str) -> Result<Option<DropRecord>, StoreError> {
        self.inner.get_drop(author_id).await
    }
    async fn insert_drop(&self, a: &str, h: &str, p: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.insert_drop(a, h, p).await
    }
    async fn append_post(&self, a: &str, p: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.append_post(a, p).await
    }
    async fn record_message(&self, a: &str, m: MessageId) -> Result<(), StoreError> {
        self.check()?;
        self.inner.record_message(a, m).await
    }
    async fn ban(&self, a: &str, h: &str) -> Result<(), StoreError> {
        self.inner.ban(a, h).await
    }
}

pub fn fast_settings() -> PollSettings {
    PollSettings {
        interval: Duration::from_millis(20),
        dispatch_pause: Duration::ZERO,
    }
}

pub fn notifier(transport: Arc<RecordingTransport>, store: Arc<dyn DropStore>) -> Arc<Notifier> {
    notifier_with(
        transport,
        store,
        RetryPolicy {
            attempts: 3,
            backoff: Duration::ZERO,
        },
    )
}

pub fn notifier_with(
    transport: Arc<RecordingTransport>,
    store: Arc<dyn DropStore>,
    policy: RetryPolicy,
) -> Arc<Notifier> {
    Arc::new(Notifier::new(transport, Arc::new(NoopResolver), store).with_policy(policy))
}

pub fn task(
    source: Arc<ScriptedSource>,
    store: Arc<dyn DropStore>,
    transport: Arc<RecordingTransport>,
    watermark: i64,
) -> PollingTask {
    PollingTask::new(
        -100,
        source,
        store.clone(),
        notifier(transport, store),
        Watermark::new(watermark),
        fast_settings(),
    )
}

/// A task running on the production timings (retry backoff and pauses).
pub fn task_with_defaults(
    source: Arc<ScriptedSource>,
    store: Arc<dyn DropStore>,
    transport: Arc<RecordingTransport>,
    watermark: i64,
) -> PollingTask {
    PollingTask::new(
        -100,
        source,
        store.clone(),
        notifier_with(transport, store, RetryPolicy::default()),
        Watermark::new(watermark),
        PollSettings::default(),
    )
}

// src/lib.rs
// Public library surface for the service binary, tools and integration tests.

pub mod api;
pub mod bootstrap;
pub mod commands;
pub mod config;
pub mod metrics;

// Polling core: search client, watermark, polling loop, supervisor
pub mod ingest;

// Dedup/moderation store and outgoing notifications
pub mod notify;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::create_router;
pub use crate::ingest::supervisor::{LifecycleStatus, Supervisor};
pub use crate::ingest::types::{ChatId, Item, Page};
pub use crate::notify::{audience_tier, Notifier};

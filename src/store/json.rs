// src/store/json.rs
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::{fs, sync::RwLock};

use super::{BanRecord, DropRecord, DropStore, MessageId, StoreError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    drops: HashMap<String, DropRecord>,
    #[serde(default)]
    banned: HashMap<String, BanRecord>,
}

/// Store kept in memory and, when a path is set, rewritten to a JSON file
/// after every mutation. Writers are serialized by the lock, so the file
/// always holds a complete snapshot. A mutation becomes visible only once it
/// has been written.
#[derive(Debug)]
pub struct JsonStore {
    state: RwLock<Snapshot>,
    path: Option<PathBuf>,
}

impl JsonStore {
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(Snapshot::default()),
            path: None,
        }
    }

    /// Open (or create on first write) a store file. A missing file is empty.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = match fs::read_to_string(&path).await {
            Ok(s) if s.trim().is_empty() => Snapshot::default(),
            Ok(s) => serde_json::from_str(&s)
                .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(
            target: "store",
            path = %path.display(),
            drops = snapshot.drops.len(),
            banned = snapshot.banned.len(),
            "store opened"
        );
        Ok(Self {
            state: RwLock::new(snapshot),
            path: Some(path),
        })
    }

    pub async fn drop_count(&self) -> usize {
        self.state.read().await.drops.len()
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Apply `f` to a copy of the snapshot, persist the copy, then swap it in.
    /// `f` returns false when nothing changed (no write needed).
    async fn mutate<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Snapshot) -> Result<bool, StoreError>,
    {
        let mut st = self.state.write().await;
        let mut next = st.clone();
        if !f(&mut next)? {
            return Ok(());
        }
        self.persist(&next).await?;
        *st = next;
        Ok(())
    }
}

#[async_trait]
impl DropStore for JsonStore {
    async fn is_banned(&self, author_id: &str) -> Result<bool, StoreError> {
        Ok(self.state.read().await.banned.contains_key(author_id))
    }

    async fn get_drop(&self, author_id: &str) -> Result<Option<DropRecord>, StoreError> {
        Ok(self.state.read().await.drops.get(author_id).cloned())
    }

    async fn insert_drop(
        &self,
        author_id: &str,
        author_handle: &str,
        post_id: &str,
    ) -> Result<(), StoreError> {
        self.mutate(|snap| {
            let rec = snap
                .drops
                .entry(author_id.to_string())
                .or_insert_with(|| DropRecord {
                    author_id: author_id.to_string(),
                    author_handle: author_handle.to_string(),
                    ..DropRecord::default()
                });
            if !rec.has_post(post_id) {
                rec.post_ids.push(post_id.to_string());
            }
            Ok(true)
        })
        .await
    }

    async fn append_post(&self, author_id: &str, post_id: &str) -> Result<(), StoreError> {
        self.mutate(|snap| {
            let Some(rec) = snap.drops.get_mut(author_id) else {
                return Err(StoreError::Corrupt(format!("no drop record for {author_id}")));
            };
            if rec.has_post(post_id) {
                return Ok(false);
            }
            rec.post_ids.push(post_id.to_string());
            Ok(true)
        })
        .await
    }

    async fn record_message(
        &self,
        author_id: &str,
        message_id: MessageId,
    ) -> Result<(), StoreError> {
        self.mutate(|snap| {
            let Some(rec) = snap.drops.get_mut(author_id) else {
                return Err(StoreError::Corrupt(format!("no drop record for {author_id}")));
            };
            rec.message_ids.push(message_id);
            Ok(true)
        })
        .await
    }

    async fn ban(&self, author_id: &str, author_handle: &str) -> Result<(), StoreError> {
        self.mutate(|snap| {
            snap.banned
                .entry(author_id.to_string())
                .or_insert_with(|| BanRecord {
                    author_id: author_id.to_string(),
                    author_handle: author_handle.to_string(),
                    banned_at: Utc::now(),
                });
            Ok(true)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_is_idempotent_and_append_dedups() {
        let s = JsonStore::in_memory();
        s.insert_drop("u1", "amy", "t1").await.unwrap();
        s.insert_drop("u1", "amy", "t1").await.unwrap();
        s.append_post("u1", "t2").await.unwrap();
        s.append_post("u1", "t2").await.unwrap();
        let rec = s.get_drop("u1").await.unwrap().unwrap();
        assert_eq!(rec.post_ids, vec!["t1".to_string(), "t2".to_string()]);
        assert_eq!(rec.author_handle, "amy");
    }

    #[tokio::test]
    async fn append_without_record_fails() {
        let s = JsonStore::in_memory();
        assert!(matches!(
            s.append_post("ghost", "t").await,
            Err(StoreError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn ban_is_visible() {
        let s = JsonStore::in_memory();
        assert!(!s.is_banned("u9").await.unwrap());
        s.ban("u9", "spammer").await.unwrap();
        assert!(s.is_banned("u9").await.unwrap());
        assert!(s.get_drop("u9").await.unwrap().is_none());
    }
}

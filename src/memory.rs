//! Per-user conversation memory persisted as a single JSON file.
//!
//! The file maps user ids to their chat history and settings. Every
//! operation takes the async lock, reads the whole file, mutates it and
//! writes it back, so the on-disk blob is always a complete snapshot.

use crate::llm::Message;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

/// History entries kept per user (10 exchanges).
const HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

/// Earlier versions stored a bare history array per user; accept both and
/// upgrade on read.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredUser {
    Record(UserRecord),
    Legacy(Vec<Message>),
}

impl From<StoredUser> for UserRecord {
    fn from(stored: StoredUser) -> Self {
        match stored {
            StoredUser::Record(record) => record,
            StoredUser::Legacy(history) => UserRecord {
                history,
                settings: HashMap::new(),
            },
        }
    }
}

pub struct Memory {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Memory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> HashMap<String, UserRecord> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!("Memory load error: {e}");
                return HashMap::new();
            }
        };

        match serde_json::from_str::<HashMap<String, StoredUser>>(&raw) {
            Ok(map) => map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            Err(e) => {
                warn!("Memory parse error, starting fresh: {e}");
                HashMap::new()
            }
        }
    }

    async fn save(&self, data: &HashMap<String, UserRecord>) -> Result<()> {
        let json = serde_json::to_string_pretty(data).context("memory serialize failed")?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("memory write failed: {}", self.path.display()))?;
        Ok(())
    }

    /// The most recent `window` history entries for a user, oldest first.
    pub async fn user_history(&self, user_id: i64, window: usize) -> Vec<Message> {
        let _guard = self.lock.lock().await;
        let data = self.load().await;
        let history = data
            .get(&user_id.to_string())
            .map(|r| r.history.clone())
            .unwrap_or_default();
        let skip = history.len().saturating_sub(window);
        history.into_iter().skip(skip).collect()
    }

    /// Record one user/assistant exchange, trimming to the history cap.
    pub async fn append_exchange(
        &self,
        user_id: i64,
        user_message: &str,
        assistant_message: &str,
    ) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await;
        let record = data.entry(user_id.to_string()).or_default();

        record.history.push(Message::user(user_message));
        record.history.push(Message::assistant(assistant_message));
        if record.history.len() > HISTORY_LIMIT {
            let excess = record.history.len() - HISTORY_LIMIT;
            record.history.drain(..excess);
        }

        self.save(&data).await
    }

    pub async fn clear_history(&self, user_id: i64) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await;
        data.entry(user_id.to_string()).or_default().history.clear();
        self.save(&data).await
    }

    pub async fn get_setting(&self, user_id: i64, key: &str) -> Option<String> {
        let _guard = self.lock.lock().await;
        let data = self.load().await;
        data.get(&user_id.to_string())
            .and_then(|r| r.settings.get(key).cloned())
    }

    pub async fn update_setting(&self, user_id: i64, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await;
        data.entry(user_id.to_string())
            .or_default()
            .settings
            .insert(key.to_string(), value.to_string());
        self.save(&data).await
    }

    /// Number of users with any stored state.
    pub async fn active_users(&self) -> usize {
        let _guard = self.lock.lock().await;
        self.load().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_in(dir: &tempfile::TempDir) -> Memory {
        Memory::new(dir.path().join("memory.json"))
    }

    #[tokio::test]
    async fn exchange_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let memory = memory_in(&dir);

        memory.append_exchange(42, "hello", "hi there").await?;
        let history = memory.user_history(42, 10).await;

        assert_eq!(history.len(), 2);
        assert_eq!(history[0], Message::user("hello"));
        assert_eq!(history[1], Message::assistant("hi there"));
        assert_eq!(memory.active_users().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn history_is_capped_at_limit() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let memory = memory_in(&dir);

        for i in 0..15 {
            memory
                .append_exchange(1, &format!("q{i}"), &format!("a{i}"))
                .await?;
        }

        let history = memory.user_history(1, 100).await;
        assert_eq!(history.len(), HISTORY_LIMIT);
        // The newest exchange survives trimming.
        assert_eq!(history.last(), Some(&Message::assistant("a14")));
        Ok(())
    }

    #[tokio::test]
    async fn window_returns_most_recent_entries() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let memory = memory_in(&dir);

        memory.append_exchange(1, "first", "one").await?;
        memory.append_exchange(1, "second", "two").await?;

        let window = memory.user_history(1, 2).await;
        assert_eq!(window, vec![Message::user("second"), Message::assistant("two")]);
        Ok(())
    }

    #[tokio::test]
    async fn legacy_bare_array_is_upgraded() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("memory.json");
        std::fs::write(
            &path,
            r#"{"7": [{"role": "user", "content": "old"}]}"#,
        )?;

        let memory = Memory::new(&path);
        let history = memory.user_history(7, 10).await;
        assert_eq!(history, vec![Message::user("old")]);

        // A write persists the upgraded shape without losing the history.
        memory.update_setting(7, "image_model", "flux").await?;
        assert_eq!(memory.user_history(7, 10).await.len(), 1);
        assert_eq!(
            memory.get_setting(7, "image_model").await.as_deref(),
            Some("flux")
        );
        Ok(())
    }

    #[tokio::test]
    async fn clear_keeps_settings() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let memory = memory_in(&dir);

        memory.append_exchange(3, "hi", "hello").await?;
        memory.update_setting(3, "image_model", "creative").await?;
        memory.clear_history(3).await?;

        assert!(memory.user_history(3, 10).await.is_empty());
        assert_eq!(
            memory.get_setting(3, "image_model").await.as_deref(),
            Some("creative")
        );
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_file_starts_fresh() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("memory.json");
        std::fs::write(&path, "not json")?;

        let memory = Memory::new(&path);
        assert!(memory.user_history(1, 10).await.is_empty());
        Ok(())
    }
}

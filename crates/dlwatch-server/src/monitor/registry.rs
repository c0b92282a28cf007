// src/monitor/registry.rs
// In-memory mapping `(chat_id, message_id) -> MonitorEntry` (spec §3, §4.4).

use std::collections::HashMap;
use tokio::sync::Mutex;

pub type MonitorKey = (i64, i64);

/// One chat message currently tracking a task.
///
/// `last_rendered_text` is advisory: `None` forces an edit on the entry's
/// next tick regardless of what the snapshot renders to.
#[derive(Debug, Clone)]
pub struct MonitorEntry {
    pub gid: String,
    pub last_rendered_text: Option<String>,
}

#[derive(Default)]
pub struct MonitorRegistry {
    entries: Mutex<HashMap<MonitorKey, MonitorEntry>>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any prior gid for this key and invalidates the cached
    /// rendered text so the next tick always edits.
    pub async fn register(&self, chat_id: i64, message_id: i64, gid: String) {
        self.entries.lock().await.insert(
            (chat_id, message_id),
            MonitorEntry { gid, last_rendered_text: None },
        );
    }

    pub async fn unregister(&self, chat_id: i64, message_id: i64) {
        self.entries.lock().await.remove(&(chat_id, message_id));
    }

    /// Used by the `/remove` command path: a gid may be tracked from more
    /// than one chat (spec §3 Monitor Entry invariant).
    pub async fn unregister_all_for_gid(&self, gid: &str) {
        self.entries.lock().await.retain(|_, entry| entry.gid != gid);
    }

    /// Copy of the current keys and gids, decoupling a tick's iteration from
    /// concurrent `register`/`unregister` calls (spec §4.4 step 1).
    pub async fn snapshot(&self) -> Vec<(MonitorKey, String)> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|(key, entry)| (*key, entry.gid.clone()))
            .collect()
    }

    pub async fn set_last_rendered(&self, key: MonitorKey, text: String) {
        if let Some(entry) = self.entries.lock().await.get_mut(&key) {
            entry.last_rendered_text = Some(text);
        }
    }

    pub async fn last_rendered(&self, key: MonitorKey) -> Option<String> {
        self.entries.lock().await.get(&key).and_then(|e| e.last_rendered_text.clone())
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, key: MonitorKey) -> bool {
        self.entries.lock().await.contains_key(&key)
    }
}

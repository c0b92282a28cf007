// src/monitor/mod.rs
// C4: Task Monitor. Owns `(chat_id, message_id) -> gid`, fans out concurrent
// state fetches, diffs against last-rendered text, edits messages, retires
// finished entries, and writes terminal outcomes to the history store
// (spec §4.4). Shaped after the teacher's `BackgroundWorker` shutdown-watch
// loop (`background/mod.rs`), generalized from a single idle-time scanner
// to a concurrent per-entry fan-out.

pub mod registry;
pub mod render;

use crate::chat::ChatClient;
use crate::db::{HistoryPool, history};
use crate::engine::EngineClient;
use crate::error::AppError;
use dlwatch_types::{HistoryStatus, TaskStatus};
use crate::util::now_epoch_seconds;
use registry::{MonitorKey, MonitorRegistry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Outcome of fetching one entry's state this tick.
enum Outcome {
    NotFound,
    Recoverable(AppError),
    Snapshot(dlwatch_types::TaskSnapshot),
}

pub struct TaskMonitor {
    engine: Arc<dyn EngineClient>,
    chat: Arc<dyn ChatClient>,
    history: Arc<HistoryPool>,
    registry: Arc<MonitorRegistry>,
    interval: Duration,
    max_history: u64,
    shutdown: watch::Receiver<bool>,
}

impl TaskMonitor {
    pub fn new(
        engine: Arc<dyn EngineClient>,
        chat: Arc<dyn ChatClient>,
        history: Arc<HistoryPool>,
        registry: Arc<MonitorRegistry>,
        interval: Duration,
        max_history: u64,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self { engine, chat, history, registry, interval, max_history, shutdown }
    }

    pub fn registry(&self) -> Arc<MonitorRegistry> {
        self.registry.clone()
    }

    /// Runs until the shutdown channel fires. In-flight fan-out for the
    /// current tick completes on a best-effort basis before returning
    /// (spec §5 Cancellation & timeouts).
    pub async fn run(mut self) {
        tracing::info!("task monitor started");
        let mut backoff_once = false;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let started = Instant::now();
            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "task monitor tick failed");
                if !backoff_once {
                    backoff_once = true;
                    tokio::time::sleep(self.interval * 2).await;
                    continue;
                }
            } else {
                backoff_once = false;
            }

            let elapsed = started.elapsed();
            let remaining = self.interval.saturating_sub(elapsed);
            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("task monitor stopped");
    }

    async fn tick(&self) -> crate::error::Result<()> {
        let snapshot = self.registry.snapshot().await;
        if snapshot.is_empty() {
            return Ok(());
        }

        let fetches = snapshot.iter().map(|(key, gid)| {
            let engine = self.engine.clone();
            let gid = gid.clone();
            let key = *key;
            async move {
                let outcome = match engine.get(&gid).await {
                    Ok(s) => Outcome::Snapshot(s),
                    Err(AppError::TaskNotFound) => Outcome::NotFound,
                    Err(e) => Outcome::Recoverable(e),
                };
                (key, gid, outcome)
            }
        });
        let results = futures::future::join_all(fetches).await;

        for (key, gid, outcome) in results {
            match outcome {
                Outcome::NotFound => self.handle_not_found(key, &gid).await,
                Outcome::Recoverable(e) => {
                    tracing::warn!(gid = %gid, error = %e, "engine poll failed, leaving entry registered");
                }
                Outcome::Snapshot(snap) if snap.is_terminal() => {
                    self.handle_terminal(key, snap).await
                }
                Outcome::Snapshot(snap) => self.handle_live(key, snap).await,
            }
        }

        Ok(())
    }

    async fn handle_not_found(&self, key: MonitorKey, gid: &str) {
        let text = render::render_not_found(gid);
        if let Err(e) = self.chat.edit_message(key.0, key.1, &text, None).await {
            tracing::warn!(gid, error = %e, "final edit for vanished task failed");
        }
        self.registry.unregister(key.0, key.1).await;
    }

    async fn handle_terminal(&self, key: MonitorKey, snap: dlwatch_types::TaskSnapshot) {
        let text = render::render_terminal(&snap);
        self.edit_best_effort(key, &text, None).await;
        self.registry.unregister(key.0, key.1).await;

        // `removed` observed from the engine side is handled like
        // TaskNotFound: the `remove`-by-user command path owns that write.
        let history_status = match snap.status {
            TaskStatus::Complete => Some(HistoryStatus::Completed),
            TaskStatus::Error => Some(HistoryStatus::Error),
            _ => None,
        };
        let Some(status) = history_status else { return };

        let error_code: Option<i64> = snap.error_code.as_deref().and_then(|c| c.parse().ok());
        let pool = self.history.clone();
        let gid = snap.gid.clone();
        let name = snap.name.clone();
        let error_message = snap.error_message.clone();
        let files = snap.files.clone();
        let size = Some(snap.total_length as i64);
        let max_history = self.max_history;
        let timestamp = now_epoch_seconds();

        if let Err(e) = pool
            .run(move |conn| {
                history::upsert(
                    conn,
                    &gid,
                    &name,
                    status,
                    timestamp,
                    size,
                    error_code,
                    error_message.as_deref(),
                    &files,
                    false,
                    None,
                    max_history,
                )
            })
            .await
        {
            tracing::warn!(gid = %snap.gid, error = %e, "failed to record terminal history entry");
        }
    }

    async fn handle_live(&self, key: MonitorKey, snap: dlwatch_types::TaskSnapshot) {
        let new_text = render::render_live(&snap);
        if self.registry.last_rendered(key).await.as_deref() == Some(new_text.as_str()) {
            return;
        }
        let keyboard = render::live_keyboard(&snap);
        self.edit_live(key, &new_text, &keyboard).await;
    }

    async fn edit_live(&self, key: MonitorKey, text: &str, keyboard: &crate::chat::InlineKeyboard) {
        match self.chat.edit_message(key.0, key.1, text, Some(keyboard)).await {
            Ok(()) => self.registry.set_last_rendered(key, text.to_string()).await,
            Err(AppError::RateLimited(secs)) => {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                match self.chat.edit_message(key.0, key.1, text, Some(keyboard)).await {
                    Ok(()) => self.registry.set_last_rendered(key, text.to_string()).await,
                    Err(e) => {
                        tracing::warn!(error = %e, "retry after rate limit still failed, leaving entry registered");
                    }
                }
            }
            Err(AppError::MessageGone) => {
                self.registry.unregister(key.0, key.1).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "live edit failed, leaving entry registered");
            }
        }
    }

    /// Final edit for a terminal message: best-effort, never re-registers.
    async fn edit_best_effort(&self, key: MonitorKey, text: &str, keyboard: Option<&crate::chat::InlineKeyboard>) {
        match self.chat.edit_message(key.0, key.1, text, keyboard).await {
            Ok(()) => {}
            Err(AppError::RateLimited(secs)) => {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                if let Err(e) = self.chat.edit_message(key.0, key.1, text, keyboard).await {
                    tracing::warn!(error = %e, "final edit retry after rate limit failed");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "final edit failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::InlineKeyboard;
    use async_trait::async_trait;
    use dlwatch_types::FileEntry;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    const GID: &str = "0123456789abcdef";

    fn live_snapshot() -> dlwatch_types::TaskSnapshot {
        dlwatch_types::TaskSnapshot::derive(
            GID.to_string(),
            TaskStatus::Active,
            "movie.mkv".to_string(),
            1000,
            500,
            100,
            0,
            1,
            None,
            None,
            vec![FileEntry { path: "/dl/movie.mkv".into(), name: "movie.mkv".into() }],
            "/dl".into(),
        )
    }

    struct OneShotEngine {
        snapshot: dlwatch_types::TaskSnapshot,
    }

    #[async_trait]
    impl EngineClient for OneShotEngine {
        async fn add(&self, _uris: Vec<String>, _options: Option<Value>) -> crate::error::Result<String> {
            Ok(GID.to_string())
        }
        async fn get(&self, _gid: &str) -> crate::error::Result<dlwatch_types::TaskSnapshot> {
            Ok(self.snapshot.clone())
        }
        async fn list_active(&self) -> crate::error::Result<Vec<dlwatch_types::TaskSnapshot>> {
            Ok(vec![])
        }
        async fn list_waiting(&self, _offset: u32, _limit: u32) -> crate::error::Result<Vec<dlwatch_types::TaskSnapshot>> {
            Ok(vec![])
        }
        async fn list_stopped(&self, _limit: u32) -> crate::error::Result<Vec<dlwatch_types::TaskSnapshot>> {
            Ok(vec![])
        }
        async fn pause(&self, _gid: &str) -> crate::error::Result<()> {
            Ok(())
        }
        async fn resume(&self, _gid: &str) -> crate::error::Result<()> {
            Ok(())
        }
        async fn remove(&self, _gid: &str) -> crate::error::Result<()> {
            Ok(())
        }
        async fn pause_all(&self) -> crate::error::Result<()> {
            Ok(())
        }
        async fn resume_all(&self) -> crate::error::Result<()> {
            Ok(())
        }
        async fn global_stats(&self) -> crate::error::Result<dlwatch_types::GlobalStats> {
            Ok(dlwatch_types::GlobalStats {
                download_speed: 0,
                upload_speed: 0,
                num_active: 0,
                num_waiting: 0,
                num_stopped: 0,
                version: "1.0".into(),
            })
        }
    }

    /// Always reports the message gone, as if an external actor deleted it.
    struct MessageGoneChat;

    #[async_trait]
    impl ChatClient for MessageGoneChat {
        async fn send_message(&self, _chat_id: i64, _text: &str, _keyboard: Option<&InlineKeyboard>) -> crate::error::Result<i64> {
            Ok(1)
        }
        async fn edit_message(&self, _chat_id: i64, _message_id: i64, _text: &str, _keyboard: Option<&InlineKeyboard>) -> crate::error::Result<()> {
            Err(AppError::MessageGone)
        }
        async fn answer_callback_query(&self, _callback_id: &str, _text: Option<&str>) -> crate::error::Result<()> {
            Ok(())
        }
    }

    /// Rate-limits the first edit call, then succeeds on the retry.
    struct RateLimitedOnceChat {
        calls: AtomicUsize,
        edits: StdMutex<Vec<String>>,
    }

    impl RateLimitedOnceChat {
        fn new() -> Self {
            Self { calls: AtomicUsize::new(0), edits: StdMutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl ChatClient for RateLimitedOnceChat {
        async fn send_message(&self, _chat_id: i64, _text: &str, _keyboard: Option<&InlineKeyboard>) -> crate::error::Result<i64> {
            Ok(1)
        }
        async fn edit_message(&self, _chat_id: i64, _message_id: i64, text: &str, _keyboard: Option<&InlineKeyboard>) -> crate::error::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                return Err(AppError::RateLimited(0));
            }
            self.edits.lock().unwrap().push(text.to_string());
            Ok(())
        }
        async fn answer_callback_query(&self, _callback_id: &str, _text: Option<&str>) -> crate::error::Result<()> {
            Ok(())
        }
    }

    /// S3 — message deleted externally. A `MessageGone` edit failure
    /// unregisters the entry silently; the engine task is left untouched.
    #[tokio::test]
    async fn s3_message_gone_unregisters_without_history_write() {
        let engine: Arc<dyn EngineClient> = Arc::new(OneShotEngine { snapshot: live_snapshot() });
        let chat: Arc<dyn ChatClient> = Arc::new(MessageGoneChat);
        let history = Arc::new(HistoryPool::open_in_memory().await.unwrap());
        let registry = Arc::new(MonitorRegistry::new());
        registry.register(1, 100, GID.to_string()).await;

        let (_tx, rx) = tokio::sync::watch::channel(false);
        let monitor = TaskMonitor::new(engine, chat, history.clone(), registry.clone(), Duration::from_secs(5), 0, rx);
        monitor.tick().await.unwrap();

        assert!(!registry.contains((1, 100)).await);
        assert!(history.run(|conn| history::get_by_gid(conn, GID)).await.unwrap().is_none());
    }

    /// S4 — rate limit. A `RetryAfter` edit sleeps then retries once; the
    /// retry succeeds and the new text is cached, so the entry stays
    /// registered and live.
    #[tokio::test]
    async fn s4_rate_limit_retries_once_then_caches() {
        let engine: Arc<dyn EngineClient> = Arc::new(OneShotEngine { snapshot: live_snapshot() });
        let chat = Arc::new(RateLimitedOnceChat::new());
        let chat_dyn: Arc<dyn ChatClient> = chat.clone();
        let history = Arc::new(HistoryPool::open_in_memory().await.unwrap());
        let registry = Arc::new(MonitorRegistry::new());
        registry.register(1, 100, GID.to_string()).await;

        let (_tx, rx) = tokio::sync::watch::channel(false);
        let monitor = TaskMonitor::new(engine, chat_dyn, history, registry.clone(), Duration::from_secs(5), 0, rx);
        monitor.tick().await.unwrap();

        assert!(registry.contains((1, 100)).await, "entry stays registered after a successful retry");
        assert_eq!(chat.calls.load(Ordering::SeqCst), 2, "exactly one retry after the rate limit");
        assert_eq!(chat.edits.lock().unwrap().len(), 1);
        assert!(registry.last_rendered((1, 100)).await.is_some(), "retried text is cached");
    }
}

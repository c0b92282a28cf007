// src/handlers/mod.rs
// Command and callback dispatch (spec §6, §9). The chat-update dispatcher
// that decodes raw webhook/long-poll updates into `(user_id, chat_id,
// command/callback)` is an external collaborator (spec §1 Non-goals) — this
// module is the thin contract it calls into.
//
// Per spec §9's re-architecture notes: no decorator-registered command
// table and no framework conversation-handler for `/clearhistory` — a
// one-shot pending-confirmation map with a timeout stands in for both.

pub mod callback;
pub mod commands;
pub mod listing;

use crate::chat::ChatClient;
use crate::cursors::{PageCursor, PageCursorRegistry};
use crate::db::{HistoryPool, history};
use crate::engine::EngineClient;
use crate::error::{AppError, Result};
use crate::monitor::registry::MonitorRegistry;
use crate::monitor::render as monitor_render;
use callback::CallbackAction;
use dlwatch_types::{GlobalStats, HistoryStatus, ViewType};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const CLEAR_CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

const HELP_TEXT: &str = "\
/add <uri> - queue a download\n\
/status [gid] - show a task or all active tasks\n\
/pause <gid> / /unpause <gid> / /remove <gid>\n\
/pauseall / /unpauseall\n\
/history / /searchhistory <keyword>\n\
/clearhistory - wipe history (asks for confirmation)\n\
/globalstatus - engine-wide stats";

fn valid_gid(s: &str) -> bool {
    s.len() == 16 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Shared, immutable bundle of capabilities injected into every handler
/// (spec §9: avoids hidden global mutable state — constructed once at
/// startup).
pub struct AppState {
    engine: Arc<dyn EngineClient>,
    chat: Arc<dyn ChatClient>,
    history: Arc<HistoryPool>,
    cursors: Arc<PageCursorRegistry>,
    monitor: Arc<MonitorRegistry>,
    authorized_users: Vec<i64>,
    items_per_page: u64,
    pending_clear: Mutex<HashMap<i64, Instant>>,
}

impl AppState {
    pub fn new(
        engine: Arc<dyn EngineClient>,
        chat: Arc<dyn ChatClient>,
        history: Arc<HistoryPool>,
        cursors: Arc<PageCursorRegistry>,
        monitor: Arc<MonitorRegistry>,
        authorized_users: Vec<i64>,
        items_per_page: u64,
    ) -> Self {
        Self {
            engine,
            chat,
            history,
            cursors,
            monitor,
            authorized_users,
            items_per_page,
            pending_clear: Mutex::new(HashMap::new()),
        }
    }

    fn is_authorized(&self, user_id: i64) -> bool {
        self.authorized_users.contains(&user_id)
    }

    /// Authorization gate (spec §8 property #7, §7): short-circuits before
    /// any engine or history mutation for a user outside `authorized_users`.
    async fn guard(&self, chat_id: i64, user_id: i64) -> Result<()> {
        if self.is_authorized(user_id) {
            return Ok(());
        }
        let _ = self.chat.send_message(chat_id, "you are not authorized to use this bot", None).await;
        Err(AppError::Unauthorized)
    }

    async fn reply_error(&self, chat_id: i64, err: &AppError) {
        let _ = self.chat.send_message(chat_id, &err.to_user_string(), None).await;
    }

    // ---- plain commands ----

    pub async fn cmd_start(&self, chat_id: i64, user_id: i64) -> Result<()> {
        self.guard(chat_id, user_id).await?;
        self.chat.send_message(chat_id, "ready. send /help for commands.", None).await?;
        Ok(())
    }

    pub async fn cmd_help(&self, chat_id: i64, user_id: i64) -> Result<()> {
        self.guard(chat_id, user_id).await?;
        self.chat.send_message(chat_id, HELP_TEXT, None).await?;
        Ok(())
    }

    /// Adds a task, sends the tracking message, and registers it with the
    /// monitor — the flow spec §2 describes for a command handler.
    pub async fn cmd_add(&self, chat_id: i64, user_id: i64, uri: &str) -> Result<()> {
        self.guard(chat_id, user_id).await?;
        if uri.trim().is_empty() {
            return Err(AppError::InvalidArgument("usage: /add <uri>".into()));
        }

        let gid = match self.engine.add(vec![uri.to_string()], None).await {
            Ok(gid) => gid,
            Err(e) => {
                self.reply_error(chat_id, &e).await;
                return Err(e);
            }
        };

        let (text, keyboard) = match self.engine.get(&gid).await {
            Ok(snap) => (monitor_render::render_live(&snap), Some(monitor_render::live_keyboard(&snap))),
            Err(_) => (format!("queued\ngid: <code>{gid}</code>"), None),
        };

        let message_id = self.chat.send_message(chat_id, &text, keyboard.as_ref()).await?;
        self.monitor.register(chat_id, message_id, gid).await;
        Ok(())
    }

    pub async fn cmd_status(&self, chat_id: i64, user_id: i64, gid: &str) -> Result<()> {
        self.guard(chat_id, user_id).await?;
        if gid.is_empty() {
            return self.render_status_page(chat_id, user_id, 1).await;
        }
        if !valid_gid(gid) {
            return Err(AppError::InvalidArgument("gid must be 16 hex characters".into()));
        }
        match self.engine.get(gid).await {
            Ok(snap) => {
                self.chat
                    .send_message(chat_id, &monitor_render::render_live(&snap), Some(&monitor_render::live_keyboard(&snap)))
                    .await?;
                Ok(())
            }
            Err(e) => {
                self.reply_error(chat_id, &e).await;
                Err(e)
            }
        }
    }

    async fn render_status_page(&self, chat_id: i64, user_id: i64, page: u64) -> Result<()> {
        let active = self.engine.list_active().await?;
        let page_size = self.items_per_page.max(1);
        let total_pages = dlwatch_types::total_pages(active.len() as u64, page_size);
        let page = page.min(total_pages);
        let start = ((page - 1) * page_size) as usize;
        let slice = active.get(start..(start + page_size as usize).min(active.len())).unwrap_or(&[]);

        let (text, keyboard) = listing::render_status_page(slice, page, total_pages);
        self.chat.send_message(chat_id, &text, keyboard.as_ref()).await?;
        self.cursors.put(ViewType::Status, user_id, PageCursor::new(page, total_pages, None)).await;
        Ok(())
    }

    pub async fn cmd_pause(&self, chat_id: i64, user_id: i64, gid: &str) -> Result<()> {
        self.guard(chat_id, user_id).await?;
        self.run_gid_action(chat_id, gid, |engine, gid| {
            let engine = engine.clone();
            let gid = gid.to_string();
            async move { engine.pause(&gid).await }
        })
        .await
    }

    pub async fn cmd_unpause(&self, chat_id: i64, user_id: i64, gid: &str) -> Result<()> {
        self.guard(chat_id, user_id).await?;
        self.run_gid_action(chat_id, gid, |engine, gid| {
            let engine = engine.clone();
            let gid = gid.to_string();
            async move { engine.resume(&gid).await }
        })
        .await
    }

    /// `/remove`: deletes on the engine, records a `removed` history entry,
    /// and unregisters every monitor entry tracking the gid across chats
    /// (spec §4.4 "Register/unregister semantics on command paths").
    pub async fn cmd_remove(&self, chat_id: i64, user_id: i64, gid: &str) -> Result<()> {
        self.guard(chat_id, user_id).await?;
        if !valid_gid(gid) {
            return Err(AppError::InvalidArgument("gid must be 16 hex characters".into()));
        }

        let last_known = self.engine.get(gid).await.ok();
        if let Err(e) = self.engine.remove(gid).await {
            self.reply_error(chat_id, &e).await;
            return Err(e);
        }

        let pool = self.history.clone();
        let gid_owned = gid.to_string();
        let name = last_known.as_ref().map(|s| s.name.clone()).unwrap_or_else(|| gid.to_string());
        let size = last_known.as_ref().map(|s| s.total_length as i64);
        let timestamp = crate::util::now_epoch_seconds();
        if let Err(e) = pool
            .run(move |conn| {
                history::upsert(
                    conn,
                    &gid_owned,
                    &name,
                    HistoryStatus::Removed,
                    timestamp,
                    size,
                    None,
                    None,
                    &[],
                    false,
                    None,
                    0,
                )
            })
            .await
        {
            tracing::warn!(gid, error = %e, "failed to record removal history entry");
        }

        self.monitor.unregister_all_for_gid(gid).await;
        self.chat.send_message(chat_id, &monitor_render::render_removed(gid), None).await?;
        Ok(())
    }

    pub async fn cmd_pause_all(&self, chat_id: i64, user_id: i64) -> Result<()> {
        self.guard(chat_id, user_id).await?;
        match self.engine.pause_all().await {
            Ok(()) => {
                self.chat.send_message(chat_id, "all tasks paused", None).await?;
                Ok(())
            }
            Err(e) => {
                self.reply_error(chat_id, &e).await;
                Err(e)
            }
        }
    }

    pub async fn cmd_unpause_all(&self, chat_id: i64, user_id: i64) -> Result<()> {
        self.guard(chat_id, user_id).await?;
        match self.engine.resume_all().await {
            Ok(()) => {
                self.chat.send_message(chat_id, "all tasks resumed", None).await?;
                Ok(())
            }
            Err(e) => {
                self.reply_error(chat_id, &e).await;
                Err(e)
            }
        }
    }

    pub async fn cmd_global_status(&self, chat_id: i64, user_id: i64) -> Result<()> {
        self.guard(chat_id, user_id).await?;
        match self.engine.global_stats().await {
            Ok(stats) => {
                self.chat.send_message(chat_id, &render_global_stats(&stats), None).await?;
                Ok(())
            }
            Err(e) => {
                self.reply_error(chat_id, &e).await;
                Err(e)
            }
        }
    }

    pub async fn cmd_history(&self, chat_id: i64, user_id: i64) -> Result<()> {
        self.guard(chat_id, user_id).await?;
        self.render_history_page(chat_id, user_id, 1).await
    }

    pub async fn cmd_search_history(&self, chat_id: i64, user_id: i64, keyword: &str) -> Result<()> {
        self.guard(chat_id, user_id).await?;
        if keyword.trim().is_empty() {
            return Err(AppError::InvalidArgument("usage: /searchhistory <keyword>".into()));
        }
        self.render_search_page(chat_id, user_id, 1, keyword).await
    }

    /// Starts the two-step `/clearhistory` confirmation flow (spec §9: a
    /// one-shot pending-confirmation map with timeout, not a framework
    /// conversation handler).
    pub async fn cmd_clear_history(&self, chat_id: i64, user_id: i64) -> Result<()> {
        self.guard(chat_id, user_id).await?;
        self.pending_clear.lock().await.insert(user_id, Instant::now());
        let keyboard = vec![vec![
            crate::chat::InlineButton { label: "confirm".into(), data: "clear_history_confirm".into() },
            crate::chat::InlineButton { label: "cancel".into(), data: "clear_history_cancel".into() },
        ]];
        self.chat.send_message(chat_id, "clear all history? this cannot be undone.", Some(&keyboard)).await?;
        Ok(())
    }

    // ---- callbacks ----

    pub async fn handle_callback(
        &self,
        chat_id: i64,
        message_id: i64,
        user_id: i64,
        callback_id: &str,
        data: &str,
    ) -> Result<()> {
        if !self.is_authorized(user_id) {
            let _ = self.chat.answer_callback_query(callback_id, Some("not authorized")).await;
            return Err(AppError::Unauthorized);
        }

        let Some(action) = CallbackAction::parse(data) else {
            let _ = self.chat.answer_callback_query(callback_id, None).await;
            return Err(AppError::InvalidArgument(format!("unrecognized callback data {data:?}")));
        };

        let result = match action {
            CallbackAction::Pause(gid) => self.callback_set_state(chat_id, message_id, &gid, true).await,
            CallbackAction::Resume(gid) => self.callback_set_state(chat_id, message_id, &gid, false).await,
            CallbackAction::Remove(gid) => self.cmd_remove(chat_id, user_id, &gid).await,
            CallbackAction::HistoryPage(page) => self.render_history_page(chat_id, user_id, page).await,
            CallbackAction::SearchPage(page) => {
                let keyword = self.cursors.get(ViewType::Search, user_id).await.and_then(|c| c.keyword);
                match keyword {
                    Some(k) => self.render_search_page(chat_id, user_id, page, &k).await,
                    None => self.render_history_page(chat_id, user_id, page).await,
                }
            }
            CallbackAction::StatusPage(page) => self.render_status_page(chat_id, user_id, page).await,
            CallbackAction::PageInfo => Ok(()),
            CallbackAction::ClearHistoryConfirm => self.confirm_clear_history(chat_id, message_id, user_id).await,
            CallbackAction::ClearHistoryCancel => {
                self.pending_clear.lock().await.remove(&user_id);
                self.chat.edit_message(chat_id, message_id, "cancelled", None).await
            }
        };

        match &result {
            Ok(()) => {
                let _ = self.chat.answer_callback_query(callback_id, None).await;
            }
            Err(e) => {
                let _ = self.chat.answer_callback_query(callback_id, Some(&e.to_user_string())).await;
            }
        }
        result
    }

    async fn callback_set_state(&self, chat_id: i64, message_id: i64, gid: &str, pause: bool) -> Result<()> {
        let result = if pause { self.engine.pause(gid).await } else { self.engine.resume(gid).await };
        result?;
        // pause/resume edits the current message immediately but does not
        // unregister (spec §4.4) — the next monitor tick will reconcile text.
        if let Ok(snap) = self.engine.get(gid).await {
            let _ = self
                .chat
                .edit_message(chat_id, message_id, &monitor_render::render_live(&snap), Some(&monitor_render::live_keyboard(&snap)))
                .await;
        }
        Ok(())
    }

    async fn confirm_clear_history(&self, chat_id: i64, message_id: i64, user_id: i64) -> Result<()> {
        let requested_at = self.pending_clear.lock().await.remove(&user_id);
        let Some(requested_at) = requested_at else {
            return self.chat.edit_message(chat_id, message_id, "confirmation expired, run /clearhistory again", None).await;
        };
        if requested_at.elapsed() > CLEAR_CONFIRM_TIMEOUT {
            return self.chat.edit_message(chat_id, message_id, "confirmation expired, run /clearhistory again", None).await;
        }

        let deleted = self.history.run(history::clear).await?;
        self.cursors.drop_all(user_id).await;
        self.chat
            .edit_message(chat_id, message_id, &format!("cleared {deleted} history record(s)"), None)
            .await
    }

    /// Re-materializes a history page from C2 whenever the cursor is
    /// missing (process restart, eviction, timeout — spec §4.3, scenario S6).
    async fn render_history_page(&self, chat_id: i64, user_id: i64, page: u64) -> Result<()> {
        let page_size = self.items_per_page.max(1);
        let (records, total) = self.history.run(move |conn| history::list(conn, page, page_size, None)).await?;
        let total_pages = dlwatch_types::total_pages(total, page_size);
        let (text, keyboard) = listing::render_page("history", &records, page.max(1), total_pages, "history_page");
        self.chat.send_message(chat_id, &text, keyboard.as_ref()).await?;
        self.cursors.put(ViewType::History, user_id, PageCursor::new(page.max(1), total_pages, None)).await;
        Ok(())
    }

    async fn render_search_page(&self, chat_id: i64, user_id: i64, page: u64, keyword: &str) -> Result<()> {
        let page_size = self.items_per_page.max(1);
        let keyword_owned = keyword.to_string();
        let (records, total) =
            self.history.run(move |conn| history::search(conn, &keyword_owned, page, page_size)).await?;
        let total_pages = dlwatch_types::total_pages(total, page_size);
        let (text, keyboard) =
            listing::render_page(&format!("search: {keyword}"), &records, page.max(1), total_pages, "search_page");
        self.chat.send_message(chat_id, &text, keyboard.as_ref()).await?;
        self.cursors
            .put(ViewType::Search, user_id, PageCursor::new(page.max(1), total_pages, Some(keyword.to_string())))
            .await;
        Ok(())
    }

    async fn run_gid_action<F, Fut>(&self, chat_id: i64, gid: &str, action: F) -> Result<()>
    where
        F: FnOnce(&Arc<dyn EngineClient>, &str) -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        if !valid_gid(gid) {
            return Err(AppError::InvalidArgument("gid must be 16 hex characters".into()));
        }
        match action(&self.engine, gid).await {
            Ok(()) => {
                self.chat.send_message(chat_id, "ok", None).await?;
                Ok(())
            }
            Err(e) => {
                self.reply_error(chat_id, &e).await;
                Err(e)
            }
        }
    }
}

fn render_global_stats(stats: &GlobalStats) -> String {
    format!(
        "<b>engine status</b>\ndown: {} B/s up: {} B/s\nactive: {} waiting: {} stopped: {}\nversion: {}",
        stats.download_speed,
        stats.upload_speed,
        stats.num_active,
        stats.num_waiting,
        stats.num_stopped,
        stats.version
    )
}

// src/cursors.rs
// C3: per-user pagination state for chat-rendered listings (spec §4.3).
//
// Deliberately a plain guarded map rather than its own actor/worker: the
// state is small, short-lived, and only ever touched from handler code, so
// a `tokio::sync::Mutex<HashMap<..>>` is the whole component.

use dlwatch_types::ViewType;
use std::collections::HashMap;
use tokio::sync::Mutex;

pub type UserId = i64;

/// What page a user is looking at for a given view, plus enough context to
/// re-run the query behind it (a keyword for search, a status filter name
/// for the status view).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub page: u64,
    pub total_pages: u64,
    pub keyword: Option<String>,
}

impl PageCursor {
    pub fn new(page: u64, total_pages: u64, keyword: Option<String>) -> Self {
        Self { page, total_pages, keyword }
    }
}

/// Keyed by `(view_type, user_id)` — each user's history/search/status
/// browsing is independent even across concurrent chats.
#[derive(Default)]
pub struct PageCursorRegistry {
    cursors: Mutex<HashMap<(ViewType, UserId), PageCursor>>,
}

impl PageCursorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, view: ViewType, user_id: UserId, cursor: PageCursor) {
        self.cursors.lock().await.insert((view, user_id), cursor);
    }

    pub async fn get(&self, view: ViewType, user_id: UserId) -> Option<PageCursor> {
        self.cursors.lock().await.get(&(view, user_id)).cloned()
    }

    /// Drops a single user's cursor for one view (e.g. after a `/clearhistory`).
    pub async fn drop(&self, view: ViewType, user_id: UserId) {
        self.cursors.lock().await.remove(&(view, user_id));
    }

    /// Drops every cursor a user holds across all views.
    pub async fn drop_all(&self, user_id: UserId) {
        self.cursors.lock().await.retain(|(_, uid), _| *uid != user_id);
    }
}

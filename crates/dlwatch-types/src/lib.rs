// crates/dlwatch-types/src/lib.rs

//! Shared data contracts between the dlwatch server and any future client.
//!
//! This crate provides the core domain model for:
//! - **Task snapshots**: a single point-in-time read of a download engine task.
//! - **History records**: the persisted, terminal-only record of a finished task.
//! - **Pagination**: the cursor shape used by paginated chat views.
//!
//! These types carry no I/O dependencies so they can be reused by a WASM or
//! native client alike.

use serde::{Deserialize, Serialize};

// ===================================================
// TASK SNAPSHOT
// ===================================================

/// Lifecycle state of a task as reported by the download engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Waiting,
    Paused,
    Complete,
    Error,
    Removed,
}

impl TaskStatus {
    /// `true` for the three terminal states: the task performs no further work.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Error | TaskStatus::Removed)
    }
}

/// A single file belonging to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub name: String,
}

/// Immutable, point-in-time read of a task's state.
///
/// Returned by `EngineClient::get`. `progress_percent` and `eta_seconds` are
/// derived fields, not transport values — see [`TaskSnapshot::derive`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// 16 hex character identifier assigned by the download engine.
    pub gid: String,
    pub status: TaskStatus,
    pub name: String,
    pub total_length: u64,
    pub completed_length: u64,
    pub download_speed: u64,
    pub upload_speed: u64,
    pub connections: u32,
    pub progress_percent: f64,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub files: Vec<FileEntry>,
    pub dir: String,
    pub eta_seconds: Option<u64>,
}

impl TaskSnapshot {
    /// Build a snapshot from raw engine fields, filling in the derived ones.
    ///
    /// `progress_percent` is `100 * completed_length / total_length` when
    /// `total_length > 0`, else `0`. `eta_seconds` is populated only while the
    /// task is not yet complete and is making forward progress.
    #[allow(clippy::too_many_arguments)]
    pub fn derive(
        gid: String,
        status: TaskStatus,
        name: String,
        total_length: u64,
        completed_length: u64,
        download_speed: u64,
        upload_speed: u64,
        connections: u32,
        error_code: Option<String>,
        error_message: Option<String>,
        files: Vec<FileEntry>,
        dir: String,
    ) -> Self {
        let progress_percent = if total_length > 0 {
            100.0 * completed_length as f64 / total_length as f64
        } else {
            0.0
        };
        let eta_seconds = if download_speed > 0 && status != TaskStatus::Complete {
            Some((total_length.saturating_sub(completed_length)) / download_speed)
        } else {
            None
        };
        Self {
            gid,
            status,
            name,
            total_length,
            completed_length,
            download_speed,
            upload_speed,
            connections,
            progress_percent,
            error_code,
            error_message,
            files,
            dir,
            eta_seconds,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// ===================================================
// GLOBAL STATS
// ===================================================

/// Aggregate counters from the engine's `getGlobalStat` RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStats {
    pub download_speed: u64,
    pub upload_speed: u64,
    pub num_active: u32,
    pub num_waiting: u32,
    pub num_stopped: u32,
    pub version: String,
}

// ===================================================
// HISTORY RECORD
// ===================================================

/// Terminal outcome a task settled into, as recorded in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    Completed,
    Error,
    Removed,
}

impl HistoryStatus {
    /// `completed` and `error` are the two statuses the notification
    /// reconciler ever pushes; `removed` never produces a notification.
    pub fn is_notifiable(self) -> bool {
        matches!(self, HistoryStatus::Completed | HistoryStatus::Error)
    }
}

/// A persisted, terminal task outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub gid: String,
    pub name: String,
    pub status: HistoryStatus,
    /// Epoch seconds.
    pub timestamp: i64,
    pub size: Option<i64>,
    pub error_code: Option<i64>,
    pub error_message: Option<String>,
    pub files: Vec<FileEntry>,
    pub notified: bool,
    /// Opaque extra payload, round-tripped without interpretation.
    pub extra: Option<String>,
}

// ===================================================
// PAGINATION
// ===================================================

/// Which listing a page cursor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewType {
    History,
    Search,
    Status,
}

/// `page_size` results with a 1-indexed `page` and a floor-of-1 `total_pages`.
pub fn total_pages(total: u64, page_size: u64) -> u64 {
    if page_size == 0 || total == 0 {
        return 1;
    }
    total.div_ceil(page_size).max(1)
}

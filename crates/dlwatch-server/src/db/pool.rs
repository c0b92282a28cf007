// src/db/pool.rs
// Async connection pool for the history store (deadpool-sqlite + rusqlite).
//
// # Usage
//
// Use `pool.run()` from handler- and loop-level code — it converts
// `rusqlite::Error` into `AppError` automatically:
// ```ignore
// let records = pool.run(move |conn| history::list(conn, page, page_size, None)).await?;
// ```

use crate::error::{AppError, Result};
use deadpool_sqlite::{Config, Runtime};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Pooled connection to the history store's SQLite database.
pub struct HistoryPool {
    pool: deadpool_sqlite::Pool,
    path: Option<PathBuf>,
}

impl HistoryPool {
    /// Open (creating if necessary) a pooled database at `path` and run schema
    /// migrations on a fresh connection before returning.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let cfg = Config::new(path);
        let pool = cfg
            .builder(Runtime::Tokio1)
            .map_err(|e| AppError::Storage(format!("failed to build pool: {e}")))?
            .build()
            .map_err(|e| AppError::Storage(format!("failed to build pool: {e}")))?;

        let this = Self { pool, path: Some(path.to_path_buf()) };
        this.run(|conn| super::schema::run_migrations(conn)).await?;
        Ok(this)
    }

    /// Open a pooled in-memory database (tests only). Uses a shared-cache URI
    /// so every connection in the pool sees the same in-memory state, keyed
    /// by a process-wide counter so concurrent tests in the same test binary
    /// never collide on the same in-memory database.
    pub async fn open_in_memory() -> Result<Self> {
        let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
        let uri = format!(
            "file:dlwatch_memdb_{}_{id}?mode=memory&cache=shared",
            std::process::id()
        );
        let cfg = Config::new(uri);
        let pool = cfg
            .builder(Runtime::Tokio1)
            .map_err(|e| AppError::Storage(format!("failed to build pool: {e}")))?
            .max_size(1)
            .build()
            .map_err(|e| AppError::Storage(format!("failed to build pool: {e}")))?;

        let this = Self { pool, path: None };
        this.run(|conn| super::schema::run_migrations(conn)).await?;
        Ok(this)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a closure on a pooled connection, converting its `rusqlite::Error`
    /// into `AppError::Storage`.
    pub async fn run<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.pool.get().await?;
        conn.interact(move |conn| f(conn)).await?.map_err(AppError::from)
    }
}

// src/db/schema.rs
// Schema for the download_history table (spec §3, §6).

use rusqlite::Connection;

pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS download_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            gid TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            status TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            size INTEGER,
            error_code INTEGER,
            error_message TEXT,
            files TEXT,
            notified INTEGER NOT NULL DEFAULT 0,
            extra TEXT
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_download_history_gid ON download_history(gid);
        CREATE INDEX IF NOT EXISTS idx_download_history_timestamp ON download_history(timestamp DESC);
        CREATE INDEX IF NOT EXISTS idx_download_history_status ON download_history(status);
        ",
    )
}

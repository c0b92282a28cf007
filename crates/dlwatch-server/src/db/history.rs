// src/db/history.rs
// History store operations (spec §4.2).
//
// All functions here are synchronous and run inside `HistoryPool::run`.

use dlwatch_types::{FileEntry, HistoryRecord, HistoryStatus};
use rusqlite::{Connection, OptionalExtension, Row, params};

fn status_str(status: HistoryStatus) -> &'static str {
    match status {
        HistoryStatus::Completed => "completed",
        HistoryStatus::Error => "error",
        HistoryStatus::Removed => "removed",
    }
}

fn parse_status(s: &str) -> rusqlite::Result<HistoryStatus> {
    match s {
        "completed" => Ok(HistoryStatus::Completed),
        "error" => Ok(HistoryStatus::Error),
        "removed" => Ok(HistoryStatus::Removed),
        other => Err(rusqlite::Error::InvalidColumnType(
            0,
            format!("unknown history status {other:?}"),
            rusqlite::types::Type::Text,
        )),
    }
}

fn row_to_record(row: &Row) -> rusqlite::Result<HistoryRecord> {
    let files_json: Option<String> = row.get("files")?;
    let files: Vec<FileEntry> = match files_json {
        Some(s) if !s.is_empty() => serde_json::from_str(&s).unwrap_or_default(),
        _ => Vec::new(),
    };
    let status_text: String = row.get("status")?;
    Ok(HistoryRecord {
        id: row.get("id")?,
        gid: row.get("gid")?,
        name: row.get("name")?,
        status: parse_status(&status_text)?,
        timestamp: row.get("timestamp")?,
        size: row.get("size")?,
        error_code: row.get("error_code")?,
        error_message: row.get("error_message")?,
        files,
        notified: row.get::<_, i64>("notified")? != 0,
        extra: row.get("extra")?,
    })
}

/// Insert a new record, or update the existing one for `gid` in place,
/// preserving its `id`. `notified` is merged with OR against the stored
/// value so this path can never flip a record from notified back to
/// un-notified (spec invariant).
#[allow(clippy::too_many_arguments)]
pub fn upsert(
    conn: &Connection,
    gid: &str,
    name: &str,
    status: HistoryStatus,
    timestamp: i64,
    size: Option<i64>,
    error_code: Option<i64>,
    error_message: Option<&str>,
    files: &[FileEntry],
    notified: bool,
    extra: Option<&str>,
    max_history: u64,
) -> rusqlite::Result<i64> {
    let files_json = if files.is_empty() {
        None
    } else {
        Some(serde_json::to_string(files).unwrap_or_default())
    };

    let id: i64 = conn.query_row(
        "INSERT INTO download_history
            (gid, name, status, timestamp, size, error_code, error_message, files, notified, extra)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(gid) DO UPDATE SET
            name = excluded.name,
            status = excluded.status,
            timestamp = excluded.timestamp,
            size = excluded.size,
            error_code = excluded.error_code,
            error_message = excluded.error_message,
            files = excluded.files,
            notified = download_history.notified OR excluded.notified,
            extra = excluded.extra
         RETURNING id",
        params![
            gid,
            name,
            status_str(status),
            timestamp,
            size,
            error_code,
            error_message,
            files_json,
            notified as i64,
            extra,
        ],
        |row| row.get(0),
    )?;

    trim(conn, max_history)?;
    Ok(id)
}

/// Delete the oldest-by-timestamp rows in excess of `max_history`. A
/// `max_history` of 0 disables the bound.
pub fn trim(conn: &Connection, max_history: u64) -> rusqlite::Result<u64> {
    if max_history == 0 {
        return Ok(0);
    }
    let deleted = conn.execute(
        "DELETE FROM download_history
         WHERE id IN (
            SELECT id FROM download_history
            ORDER BY timestamp ASC, id ASC
            LIMIT MAX(0, (SELECT COUNT(*) FROM download_history) - ?1)
         )",
        params![max_history as i64],
    )?;
    Ok(deleted as u64)
}

fn paginate(page: u64) -> (u64, u64) {
    let page = page.max(1);
    (page, (page - 1)) // (page, page_index)
}

pub fn list(
    conn: &Connection,
    page: u64,
    page_size: u64,
    status_filter: Option<HistoryStatus>,
) -> rusqlite::Result<(Vec<HistoryRecord>, u64)> {
    let (page, page_index) = paginate(page);
    let offset = page_index * page_size;

    let total: u64 = match status_filter {
        Some(s) => conn.query_row(
            "SELECT COUNT(*) FROM download_history WHERE status = ?1",
            params![status_str(s)],
            |r| r.get::<_, i64>(0),
        )? as u64,
        None => conn.query_row("SELECT COUNT(*) FROM download_history", [], |r| {
            r.get::<_, i64>(0)
        })? as u64,
    };

    let records = match status_filter {
        Some(s) => {
            let mut stmt = conn.prepare(
                "SELECT * FROM download_history WHERE status = ?1
                 ORDER BY timestamp DESC, id DESC LIMIT ?2 OFFSET ?3",
            )?;
            stmt.query_map(params![status_str(s), page_size as i64, offset as i64], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT * FROM download_history
                 ORDER BY timestamp DESC, id DESC LIMIT ?1 OFFSET ?2",
            )?;
            stmt.query_map(params![page_size as i64, offset as i64], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        }
    };

    let _ = page;
    Ok((records, total))
}

pub fn get_by_gid(conn: &Connection, gid: &str) -> rusqlite::Result<Option<HistoryRecord>> {
    conn.query_row(
        "SELECT * FROM download_history WHERE gid = ?1",
        params![gid],
        row_to_record,
    )
    .optional()
}

pub fn search(
    conn: &Connection,
    keyword: &str,
    page: u64,
    page_size: u64,
) -> rusqlite::Result<(Vec<HistoryRecord>, u64)> {
    let (_page, page_index) = paginate(page);
    let offset = page_index * page_size;
    let pattern = format!("%{}%", keyword.to_lowercase());

    let total: u64 = conn.query_row(
        "SELECT COUNT(*) FROM download_history
         WHERE LOWER(name) LIKE ?1 OR LOWER(COALESCE(error_message, '')) LIKE ?1",
        params![pattern],
        |r| r.get::<_, i64>(0),
    )? as u64;

    let mut stmt = conn.prepare(
        "SELECT * FROM download_history
         WHERE LOWER(name) LIKE ?1 OR LOWER(COALESCE(error_message, '')) LIKE ?1
         ORDER BY timestamp DESC, id DESC LIMIT ?2 OFFSET ?3",
    )?;
    let records = stmt
        .query_map(params![pattern, page_size as i64, offset as i64], row_to_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok((records, total))
}

pub fn list_unnotified_terminal(conn: &Connection) -> rusqlite::Result<Vec<HistoryRecord>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM download_history
         WHERE notified = 0 AND status IN ('completed', 'error')
         ORDER BY timestamp DESC, id DESC",
    )?;
    stmt.query_map([], row_to_record)?.collect()
}

pub fn mark_notified(conn: &Connection, gid: &str) -> rusqlite::Result<bool> {
    let updated = conn.execute(
        "UPDATE download_history SET notified = 1 WHERE gid = ?1",
        params![gid],
    )?;
    Ok(updated > 0)
}

pub fn clear(conn: &Connection) -> rusqlite::Result<u64> {
    Ok(conn.execute("DELETE FROM download_history", [])? as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::HistoryPool;

    async fn test_pool() -> HistoryPool {
        HistoryPool::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn upsert_idempotence() {
        let pool = test_pool().await;
        let id1 = pool
            .run(|conn| {
                upsert(
                    conn,
                    "0123456789abcdef",
                    "file.bin",
                    HistoryStatus::Completed,
                    1000,
                    Some(2048),
                    None,
                    None,
                    &[],
                    false,
                    None,
                    0,
                )
            })
            .await
            .unwrap();
        let id2 = pool
            .run(|conn| {
                upsert(
                    conn,
                    "0123456789abcdef",
                    "file.bin",
                    HistoryStatus::Completed,
                    1000,
                    Some(2048),
                    None,
                    None,
                    &[],
                    false,
                    None,
                    0,
                )
            })
            .await
            .unwrap();
        assert_eq!(id1, id2);

        let record = pool
            .run(|conn| get_by_gid(conn, "0123456789abcdef"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.id, id1);
        assert_eq!(record.size, Some(2048));
    }

    #[tokio::test]
    async fn upsert_never_unflips_notified() {
        let pool = test_pool().await;
        pool.run(|conn| {
            upsert(
                conn,
                "0123456789abcdef",
                "file.bin",
                HistoryStatus::Completed,
                1000,
                None,
                None,
                None,
                &[],
                false,
                None,
                0,
            )
        })
        .await
        .unwrap();
        pool.run(|conn| mark_notified(conn, "0123456789abcdef")).await.unwrap();

        // A later upsert for the same gid (e.g. a duplicate terminal observation)
        // must not flip notified back to false.
        pool.run(|conn| {
            upsert(
                conn,
                "0123456789abcdef",
                "file.bin",
                HistoryStatus::Completed,
                1001,
                None,
                None,
                None,
                &[],
                false,
                None,
                0,
            )
        })
        .await
        .unwrap();

        let record = pool
            .run(|conn| get_by_gid(conn, "0123456789abcdef"))
            .await
            .unwrap()
            .unwrap();
        assert!(record.notified);
    }

    #[tokio::test]
    async fn pagination_out_of_range_returns_empty_with_true_total() {
        let pool = test_pool().await;
        for i in 0..5u32 {
            let gid = format!("{i:016x}");
            pool.run(move |conn| {
                upsert(
                    conn,
                    &gid,
                    "file.bin",
                    HistoryStatus::Completed,
                    1000 + i as i64,
                    None,
                    None,
                    None,
                    &[],
                    false,
                    None,
                    0,
                )
            })
            .await
            .unwrap();
        }
        let (records, total) = pool.run(|conn| list(conn, 99, 2, None)).await.unwrap();
        assert!(records.is_empty());
        assert_eq!(total, 5);
    }

    #[tokio::test]
    async fn pagination_ordering_is_timestamp_desc() {
        let pool = test_pool().await;
        for i in 0..3u32 {
            let gid = format!("{i:016x}");
            pool.run(move |conn| {
                upsert(
                    conn,
                    &gid,
                    "file.bin",
                    HistoryStatus::Completed,
                    1000 + i as i64,
                    None,
                    None,
                    None,
                    &[],
                    false,
                    None,
                    0,
                )
            })
            .await
            .unwrap();
        }
        let (records, total) = pool.run(|conn| list(conn, 1, 10, None)).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(records[0].gid, "0000000000000002");
        assert_eq!(records[2].gid, "0000000000000000");
    }

    #[tokio::test]
    async fn retention_bound_keeps_newest_records() {
        let pool = test_pool().await;
        for i in 0..10u32 {
            let gid = format!("{i:016x}");
            pool.run(move |conn| {
                upsert(
                    conn,
                    &gid,
                    "file.bin",
                    HistoryStatus::Completed,
                    1000 + i as i64,
                    None,
                    None,
                    None,
                    &[],
                    false,
                    None,
                    5,
                )
            })
            .await
            .unwrap();
        }
        let (records, total) = pool.run(|conn| list(conn, 1, 20, None)).await.unwrap();
        assert_eq!(total, 5);
        let gids: Vec<_> = records.iter().map(|r| r.gid.clone()).collect();
        assert_eq!(
            gids,
            vec![
                "0000000000000009",
                "0000000000000008",
                "0000000000000007",
                "0000000000000006",
                "0000000000000005",
            ]
        );
    }

    #[tokio::test]
    async fn search_matches_name_and_error_message_case_insensitive() {
        let pool = test_pool().await;
        pool.run(|conn| {
            upsert(
                conn,
                "0000000000000001",
                "MyMovie.mkv",
                HistoryStatus::Completed,
                1000,
                None,
                None,
                None,
                &[],
                false,
                None,
                0,
            )
        })
        .await
        .unwrap();
        pool.run(|conn| {
            upsert(
                conn,
                "0000000000000002",
                "other.bin",
                HistoryStatus::Error,
                1001,
                None,
                Some(1),
                Some("connection TIMEOUT"),
                &[],
                false,
                None,
                0,
            )
        })
        .await
        .unwrap();

        let (records, total) = pool.run(|conn| search(conn, "movie", 1, 10)).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(records[0].gid, "0000000000000001");

        let (records, total) = pool.run(|conn| search(conn, "timeout", 1, 10)).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(records[0].gid, "0000000000000002");
    }

    #[tokio::test]
    async fn list_unnotified_terminal_excludes_removed_and_notified() {
        let pool = test_pool().await;
        pool.run(|conn| {
            upsert(
                conn,
                "0000000000000001",
                "a",
                HistoryStatus::Completed,
                1000,
                None,
                None,
                None,
                &[],
                false,
                None,
                0,
            )
        })
        .await
        .unwrap();
        pool.run(|conn| {
            upsert(
                conn,
                "0000000000000002",
                "b",
                HistoryStatus::Removed,
                1001,
                None,
                None,
                None,
                &[],
                false,
                None,
                0,
            )
        })
        .await
        .unwrap();
        pool.run(|conn| {
            upsert(
                conn,
                "0000000000000003",
                "c",
                HistoryStatus::Error,
                1002,
                None,
                Some(1),
                Some("boom"),
                &[],
                true,
                None,
                0,
            )
        })
        .await
        .unwrap();

        let unnotified = pool.run(list_unnotified_terminal).await.unwrap();
        let gids: Vec<_> = unnotified.iter().map(|r| r.gid.clone()).collect();
        assert_eq!(gids, vec!["0000000000000001"]);
    }

    #[tokio::test]
    async fn files_round_trip_through_upsert_and_get() {
        let pool = test_pool().await;
        let files = vec![
            FileEntry { path: "/dl/a.txt".into(), name: "a.txt".into() },
            FileEntry { path: "/dl/b.txt".into(), name: "b.txt".into() },
        ];
        let files_clone = files.clone();
        pool.run(move |conn| {
            upsert(
                conn,
                "0123456789abcdef",
                "bundle",
                HistoryStatus::Completed,
                1000,
                None,
                None,
                None,
                &files_clone,
                false,
                Some("{\"k\":1}"),
                0,
            )
        })
        .await
        .unwrap();

        let record = pool
            .run(|conn| get_by_gid(conn, "0123456789abcdef"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.files, files);
        assert_eq!(record.extra.as_deref(), Some("{\"k\":1}"));
    }

    #[tokio::test]
    async fn clear_deletes_all_and_reports_count() {
        let pool = test_pool().await;
        for i in 0..4u32 {
            let gid = format!("{i:016x}");
            pool.run(move |conn| {
                upsert(
                    conn,
                    &gid,
                    "x",
                    HistoryStatus::Completed,
                    1000,
                    None,
                    None,
                    None,
                    &[],
                    false,
                    None,
                    0,
                )
            })
            .await
            .unwrap();
        }
        let deleted = pool.run(clear).await.unwrap();
        assert_eq!(deleted, 4);
        let (records, total) = pool.run(|conn| list(conn, 1, 10, None)).await.unwrap();
        assert!(records.is_empty());
        assert_eq!(total, 0);
    }
}

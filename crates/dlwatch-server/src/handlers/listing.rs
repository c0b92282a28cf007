// src/handlers/listing.rs
// Pure rendering for the paginated history/search views (spec §4.3, §6).

use crate::chat::{InlineButton, InlineKeyboard, escape_html};
use dlwatch_types::{HistoryRecord, HistoryStatus, TaskSnapshot};

fn status_word(status: HistoryStatus) -> &'static str {
    match status {
        HistoryStatus::Completed => "completed",
        HistoryStatus::Error => "error",
        HistoryStatus::Removed => "removed",
    }
}

fn format_timestamp(epoch_seconds: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(epoch_seconds, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| epoch_seconds.to_string())
}

fn render_record_line(record: &HistoryRecord) -> String {
    format!(
        "• <b>{}</b> — {} · {} (<code>{}</code>)",
        escape_html(&record.name),
        status_word(record.status),
        format_timestamp(record.timestamp),
        escape_html(&record.gid)
    )
}

/// Renders one page of a listing plus a footer with the current/total page
/// and, when there's more than one page, prev/next buttons.
pub fn render_page(
    title: &str,
    records: &[HistoryRecord],
    page: u64,
    total_pages: u64,
    page_action: &str,
) -> (String, Option<InlineKeyboard>) {
    let mut lines = vec![format!("<b>{}</b>", escape_html(title))];
    if records.is_empty() {
        lines.push("(nothing here)".to_string());
    } else {
        lines.extend(records.iter().map(render_record_line));
    }
    lines.push(format!("page {page}/{total_pages}"));
    let text = lines.join("\n");

    if total_pages <= 1 {
        return (text, None);
    }

    let mut row = Vec::new();
    if page > 1 {
        row.push(InlineButton { label: "prev".into(), data: format!("{page_action}:{}", page - 1) });
    }
    row.push(InlineButton { label: format!("{page}/{total_pages}"), data: "page_info:".into() });
    if page < total_pages {
        row.push(InlineButton { label: "next".into(), data: format!("{page_action}:{}", page + 1) });
    }
    (text, Some(vec![row]))
}

fn render_task_line(snapshot: &TaskSnapshot) -> String {
    format!(
        "• <b>{}</b> — {:.1}% (<code>{}</code>)",
        escape_html(&snapshot.name),
        snapshot.progress_percent,
        escape_html(&snapshot.gid)
    )
}

/// Renders one page of the `/status` listing (live snapshots rather than
/// persisted history records — the same page/prev/next shape as
/// [`render_page`]).
pub fn render_status_page(
    snapshots: &[TaskSnapshot],
    page: u64,
    total_pages: u64,
) -> (String, Option<InlineKeyboard>) {
    let mut lines = vec!["<b>active tasks</b>".to_string()];
    if snapshots.is_empty() {
        lines.push("(nothing active)".to_string());
    } else {
        lines.extend(snapshots.iter().map(render_task_line));
    }
    lines.push(format!("page {page}/{total_pages}"));
    let text = lines.join("\n");

    if total_pages <= 1 {
        return (text, None);
    }
    let mut row = Vec::new();
    if page > 1 {
        row.push(InlineButton { label: "prev".into(), data: format!("status_page:{}", page - 1) });
    }
    row.push(InlineButton { label: format!("{page}/{total_pages}"), data: "page_info:".into() });
    if page < total_pages {
        row.push(InlineButton { label: "next".into(), data: format!("status_page:{}", page + 1) });
    }
    (text, Some(vec![row]))
}

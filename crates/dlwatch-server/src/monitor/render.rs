// src/monitor/render.rs
// Pure rendering of a task snapshot into chat message text and buttons
// (spec §1 Non-goals: HTML rendering is a pure function, not in scope for
// the wire format itself — only this formatting is ours).

use crate::chat::{InlineButton, InlineKeyboard, escape_html};
use dlwatch_types::{TaskSnapshot, TaskStatus};

fn human_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn human_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}h{minutes:02}m{secs:02}s")
    } else if minutes > 0 {
        format!("{minutes}m{secs:02}s")
    } else {
        format!("{secs}s")
    }
}

fn status_word(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Active => "active",
        TaskStatus::Waiting => "waiting",
        TaskStatus::Paused => "paused",
        TaskStatus::Complete => "complete",
        TaskStatus::Error => "error",
        TaskStatus::Removed => "removed",
    }
}

/// Renders a live (non-terminal) snapshot. Edited in place while the task
/// continues to run.
pub fn render_live(snapshot: &TaskSnapshot) -> String {
    let mut lines = vec![
        format!("<b>{}</b>", escape_html(&snapshot.name)),
        format!("status: {}", status_word(snapshot.status)),
        format!("progress: {:.1}%", snapshot.progress_percent),
        format!(
            "{} / {}",
            human_bytes(snapshot.completed_length),
            human_bytes(snapshot.total_length)
        ),
        format!("speed: {}/s", human_bytes(snapshot.download_speed)),
    ];
    if let Some(eta) = snapshot.eta_seconds {
        lines.push(format!("eta: {}", human_duration(eta)));
    }
    lines.push(format!("gid: <code>{}</code>", escape_html(&snapshot.gid)));
    lines.join("\n")
}

/// Renders the final message for a task that reached a terminal state by
/// the engine's own reporting (complete / error). Must contain the terminal
/// status word (spec §4.4 terminal rewrite rule).
pub fn render_terminal(snapshot: &TaskSnapshot) -> String {
    let mut lines = vec![
        format!("<b>{}</b>", escape_html(&snapshot.name)),
        format!("status: {}", status_word(snapshot.status)),
    ];
    if snapshot.status == TaskStatus::Complete {
        lines.push(format!("size: {}", human_bytes(snapshot.total_length)));
    }
    if let Some(msg) = &snapshot.error_message {
        lines.push(format!("error: {}", escape_html(msg)));
    }
    lines.push(format!("gid: <code>{}</code>", escape_html(&snapshot.gid)));
    lines.join("\n")
}

/// Renders the final message when the engine no longer knows the gid
/// (`TaskNotFound`): treated as terminal-removed (spec §4.4 step 3).
pub fn render_not_found(gid: &str) -> String {
    format!("task completed or removed\ngid: <code>{}</code>", escape_html(gid))
}

/// Renders the final message for a user-initiated `/remove`.
pub fn render_removed(gid: &str) -> String {
    format!("task removed\ngid: <code>{}</code>", escape_html(gid))
}

/// Live control keyboard: pause/resume toggle + remove. Terminal messages
/// carry no keyboard (spec §4.4 terminal rewrite rule).
pub fn live_keyboard(snapshot: &TaskSnapshot) -> InlineKeyboard {
    let toggle = match snapshot.status {
        TaskStatus::Paused => InlineButton { label: "resume".into(), data: format!("resume:{}", snapshot.gid) },
        _ => InlineButton { label: "pause".into(), data: format!("pause:{}", snapshot.gid) },
    };
    let remove = InlineButton { label: "remove".into(), data: format!("remove:{}", snapshot.gid) };
    vec![vec![toggle, remove]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlwatch_types::FileEntry;

    fn snapshot(status: TaskStatus) -> TaskSnapshot {
        TaskSnapshot::derive(
            "0123456789abcdef".into(),
            status,
            "movie.mkv".into(),
            1000,
            250,
            100,
            0,
            1,
            None,
            None,
            vec![FileEntry { path: "/dl/movie.mkv".into(), name: "movie.mkv".into() }],
            "/dl".into(),
        )
    }

    #[test]
    fn live_render_contains_progress_and_gid() {
        let text = render_live(&snapshot(TaskStatus::Active));
        assert!(text.contains("25.0%"));
        assert!(text.contains("0123456789abcdef"));
    }

    #[test]
    fn terminal_render_contains_status_word() {
        let text = render_terminal(&snapshot(TaskStatus::Complete));
        assert!(text.contains("complete"));
    }

    #[test]
    fn terminal_render_escapes_name() {
        let mut snap = snapshot(TaskStatus::Complete);
        snap.name = "<script>".into();
        let text = render_terminal(&snap);
        assert!(!text.contains("<script>"));
        assert!(text.contains("&lt;script&gt;"));
    }

    #[test]
    fn live_keyboard_shows_pause_when_active() {
        let kb = live_keyboard(&snapshot(TaskStatus::Active));
        assert_eq!(kb[0][0].label, "pause");
    }

    #[test]
    fn live_keyboard_shows_resume_when_paused() {
        let kb = live_keyboard(&snapshot(TaskStatus::Paused));
        assert_eq!(kb[0][0].label, "resume");
    }

    #[test]
    fn human_bytes_scales_units() {
        assert_eq!(human_bytes(500), "500 B");
        assert_eq!(human_bytes(2048), "2.0 KiB");
    }
}

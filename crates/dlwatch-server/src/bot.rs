// src/bot.rs
// The chat-update dispatcher: long-polls `getUpdates` and routes decoded
// commands/callbacks into `AppState` (spec §1 Non-goals: command parsing
// grammar beyond the thin dispatch table is out of scope — this is exactly
// that thin table, nothing more).

use crate::chat::{DispatchTarget, TelegramClient, classify};
use crate::error::AppError;
use crate::handlers::AppState;
use crate::handlers::commands::parse_command;
use std::sync::Arc;
use tokio::sync::watch;

/// Runs until the shutdown channel fires. A transport failure on one
/// `getUpdates` call is logged and retried after a short backoff rather
/// than ending the loop — same "per-entry failures, not loop-fatal"
/// discipline as the monitor and reconciler (spec §7).
pub async fn run_polling(
    client: Arc<TelegramClient>,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("chat update dispatcher started");
    let mut offset: i64 = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let updates = tokio::select! {
            result = client.get_updates(offset) => result,
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };

        let updates = match updates {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!(error = %e, "getUpdates failed, retrying");
                tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let state = state.clone();
            tokio::spawn(async move {
                dispatch(&state, classify(update)).await;
            });
        }
    }
    tracing::info!("chat update dispatcher stopped");
}

async fn dispatch(state: &AppState, target: DispatchTarget) {
    match target {
        DispatchTarget::Ignored => {}
        DispatchTarget::Command { chat_id, user_id, text } => {
            if let Err(e) = dispatch_command(state, chat_id, user_id, &text).await {
                if !matches!(e, AppError::Unauthorized) {
                    tracing::debug!(chat_id, user_id, error = %e, "command handler returned an error");
                }
            }
        }
        DispatchTarget::Callback { chat_id, message_id, user_id, callback_id, data } => {
            if let Err(e) = state.handle_callback(chat_id, message_id, user_id, &callback_id, &data).await {
                tracing::debug!(chat_id, user_id, error = %e, "callback handler returned an error");
            }
        }
    }
}

async fn dispatch_command(
    state: &AppState,
    chat_id: i64,
    user_id: i64,
    text: &str,
) -> crate::error::Result<()> {
    let Some((name, arg)) = parse_command(text) else {
        return Ok(());
    };

    match name {
        "start" => state.cmd_start(chat_id, user_id).await,
        "help" => state.cmd_help(chat_id, user_id).await,
        "add" => state.cmd_add(chat_id, user_id, arg).await,
        "status" => state.cmd_status(chat_id, user_id, arg).await,
        "pause" => state.cmd_pause(chat_id, user_id, arg).await,
        "unpause" => state.cmd_unpause(chat_id, user_id, arg).await,
        "remove" => state.cmd_remove(chat_id, user_id, arg).await,
        "pauseall" => state.cmd_pause_all(chat_id, user_id).await,
        "unpauseall" => state.cmd_unpause_all(chat_id, user_id).await,
        "history" => state.cmd_history(chat_id, user_id).await,
        "searchhistory" => state.cmd_search_history(chat_id, user_id, arg).await,
        "clearhistory" => state.cmd_clear_history(chat_id, user_id).await,
        "globalstatus" => state.cmd_global_status(chat_id, user_id).await,
        _ => Ok(()),
    }
}

// src/chat/updates.rs
// Long-poll `getUpdates` surface and the thin shapes the dispatcher needs to
// decode a webhook/long-poll update into `(user_id, chat_id, text)` or
// `(user_id, chat_id, message_id, callback_id, data)` (spec §1 Non-goals:
// the chat-protocol wire format itself is delegated here, kept minimal).

use crate::error::Result;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const LONG_POLL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
    #[serde(default)]
    pub callback_query: Option<IncomingCallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct IncomingCallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<CallbackMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackMessage {
    pub message_id: i64,
    pub chat: Chat,
}

impl super::client::TelegramClient {
    /// Long-polls `getUpdates` starting after `offset`, waiting up to
    /// [`LONG_POLL_TIMEOUT_SECS`] for at least one update. Acknowledging an
    /// update is implicit: the next call's `offset` is the caller's
    /// responsibility (highest `update_id` seen + 1).
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let body = json!({
            "offset": offset,
            "timeout": LONG_POLL_TIMEOUT_SECS,
            "allowed_updates": ["message", "callback_query"],
        });
        self.call_with_timeout(
            "getUpdates",
            body,
            Duration::from_secs(LONG_POLL_TIMEOUT_SECS + 10),
        )
        .await
    }
}

/// What the dispatcher does with one decoded update.
pub enum DispatchTarget {
    Command { chat_id: i64, user_id: i64, text: String },
    Callback { chat_id: i64, message_id: i64, user_id: i64, callback_id: String, data: String },
    Ignored,
}

pub fn classify(update: Update) -> DispatchTarget {
    if let Some(msg) = update.message {
        if let (Some(from), Some(text)) = (msg.from, msg.text) {
            return DispatchTarget::Command { chat_id: msg.chat.id, user_id: from.id, text };
        }
        return DispatchTarget::Ignored;
    }
    if let Some(cb) = update.callback_query {
        if let (Some(message), Some(data)) = (cb.message, cb.data) {
            return DispatchTarget::Callback {
                chat_id: message.chat.id,
                message_id: message.message_id,
                user_id: cb.from.id,
                callback_id: cb.id,
                data,
            };
        }
        return DispatchTarget::Ignored;
    }
    DispatchTarget::Ignored
}

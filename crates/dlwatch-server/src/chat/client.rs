// src/chat/client.rs
// Thin facade over the chat service's Bot API (spec §6), shaped after the
// engine client (`engine::client::Aria2Client`) and the teacher's
// `LlmHttpClient`: one small `reqwest::Client`, one `call` helper, a closed
// error taxonomy at the edge.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// A pressable button: `(label, callback_data)`.
#[derive(Debug, Clone)]
pub struct InlineButton {
    pub label: String,
    pub data: String,
}

/// A single row of buttons; a keyboard is `Vec<Vec<InlineButton>>`.
pub type InlineKeyboard = Vec<Vec<InlineButton>>;

fn keyboard_markup(keyboard: &InlineKeyboard) -> Value {
    let rows: Vec<Vec<Value>> = keyboard
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| json!({"text": b.label, "callback_data": b.data}))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

/// Surface consumed from the chat service (spec §6): send, edit, and
/// acknowledge callbacks. A trait so C4/C5/handlers can be driven against an
/// in-memory fake in tests.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Returns the new message's id.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<i64>;

    /// `MessageNotModified` is returned as `Ok(())` by implementations — it
    /// is a no-op edit, not a failure (spec §7).
    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}

/// Real facade, backed by `{api_base}/bot{token}/{method}`.
pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    parameters: Option<ApiResponseParameters>,
}

#[derive(Deserialize)]
struct ApiResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: i64,
}

impl TelegramClient {
    pub fn new(token: String, api_base_url: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let api_base = api_base_url.unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Self { http, api_base, token }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base.trim_end_matches('/'), self.token, method)
    }

    async fn call<T: for<'de> Deserialize<'de>>(&self, method: &str, body: Value) -> Result<T> {
        self.call_with_timeout(method, body, REQUEST_TIMEOUT).await
    }

    /// Same as [`Self::call`] but with a per-request timeout override, used
    /// by the long-poll `getUpdates` call which legitimately blocks for
    /// longer than the client's default request timeout.
    pub(super) async fn call_with_timeout<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: Value,
        timeout: Duration,
    ) -> Result<T> {
        let response = self
            .http
            .post(self.url(method))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Connection(e.to_string()))?;

        let parsed: ApiResponse<T> =
            response.json().await.map_err(|e| AppError::Request(e.to_string()))?;

        if parsed.ok {
            return parsed
                .result
                .ok_or_else(|| AppError::Request("missing result in Bot API reply".into()));
        }

        if let Some(retry_after) = parsed.parameters.and_then(|p| p.retry_after) {
            return Err(AppError::RateLimited(retry_after));
        }

        let lower = parsed.description.to_lowercase();
        if lower.contains("message is not modified") {
            return Err(AppError::MessageNotModified);
        }
        if lower.contains("message to edit not found")
            || lower.contains("message to delete not found")
            || lower.contains("chat not found")
            || lower.contains("bot was blocked")
            || lower.contains("user is deactivated")
        {
            return Err(AppError::MessageGone);
        }

        Err(AppError::Request(format!("{} ({})", parsed.description, parsed.error_code)))
    }
}

#[async_trait]
impl ChatClient for TelegramClient {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<i64> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(kb) = keyboard {
            body["reply_markup"] = keyboard_markup(kb);
        }
        let sent: SentMessage = self.call("sendMessage", body).await?;
        Ok(sent.message_id)
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        let mut body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "HTML",
        });
        body["reply_markup"] = match keyboard {
            Some(kb) => keyboard_markup(kb),
            None => json!({"inline_keyboard": []}),
        };
        match self.call::<Value>("editMessageText", body).await {
            Ok(_) => Ok(()),
            Err(AppError::MessageNotModified) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        let mut body = json!({ "callback_query_id": callback_id });
        if let Some(t) = text {
            body["text"] = json!(t);
        }
        self.call::<Value>("answerCallbackQuery", body).await.map(|_| ())
    }
}

/// Escapes `&`, `<`, `>` for HTML parse mode (spec §6: rendering is a pure
/// function, escaping happens at the boundary).
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

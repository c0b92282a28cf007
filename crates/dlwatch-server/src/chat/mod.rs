// src/chat/mod.rs
// Chat service facade consumed by the monitor, reconciler, and handlers.

pub mod client;
pub mod updates;

pub use client::{ChatClient, InlineButton, InlineKeyboard, TelegramClient, escape_html};
pub use updates::{DispatchTarget, Update, classify};

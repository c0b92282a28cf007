// src/engine/rpc.rs
// JSON-RPC 2.0 envelope for the download engine's HTTP endpoint (spec §6).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: &'static str,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self { jsonrpc: "2.0", id: "dlwatch", method: method.into(), params }
    }
}

#[derive(Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcErrorBody>,
}

#[derive(Deserialize)]
pub struct JsonRpcErrorBody {
    #[serde(default)]
    pub code: i64,
    pub message: String,
}

/// aria2 reports a missing gid as a plain-text JSON-RPC error rather than a
/// distinct error code; match on its wording.
pub fn is_task_not_found(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("is not found") || lower.contains("not found")
}

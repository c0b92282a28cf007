// src/engine/client.rs
// Typed async facade over the download engine's JSON-RPC surface (spec §4.1).

use super::parse::{parse_global_stats, parse_snapshot, parse_snapshots};
use super::rpc::{JsonRpcRequest, JsonRpcResponse, is_task_not_found};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use dlwatch_types::{GlobalStats, TaskSnapshot};
use serde_json::{Value, json};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Keys requested from `tellStatus`/`tellActive`/etc. Restricting the field
/// set keeps each poll small; this is what spec §4.1 calls "with keys filter".
const STATUS_KEYS: &[&str] = &[
    "gid",
    "status",
    "totalLength",
    "completedLength",
    "downloadSpeed",
    "uploadSpeed",
    "connections",
    "errorCode",
    "errorMessage",
    "dir",
    "files",
    "bittorrent",
];

/// Capability set exposed by the download engine (spec §4.1).
///
/// A trait so C4/C5 can be driven against an in-memory fake in tests without
/// a real aria2 instance.
#[async_trait]
pub trait EngineClient: Send + Sync {
    async fn add(&self, uris: Vec<String>, options: Option<Value>) -> Result<String>;
    async fn get(&self, gid: &str) -> Result<TaskSnapshot>;
    async fn list_active(&self) -> Result<Vec<TaskSnapshot>>;
    async fn list_waiting(&self, offset: u32, limit: u32) -> Result<Vec<TaskSnapshot>>;
    async fn list_stopped(&self, limit: u32) -> Result<Vec<TaskSnapshot>>;
    async fn pause(&self, gid: &str) -> Result<()>;
    async fn resume(&self, gid: &str) -> Result<()>;
    async fn remove(&self, gid: &str) -> Result<()>;
    async fn pause_all(&self) -> Result<()>;
    async fn resume_all(&self) -> Result<()>;
    async fn global_stats(&self) -> Result<GlobalStats>;
}

/// Real facade, backed by an HTTP POST to `{host}:{port}/jsonrpc`.
pub struct Aria2Client {
    http: reqwest::Client,
    endpoint: String,
    secret: Option<String>,
}

impl Aria2Client {
    pub fn new(host: &str, port: u16, secret: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http, endpoint: format!("http://{host}:{port}/jsonrpc"), secret }
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let mut full_params = Vec::with_capacity(params.len() + 1);
        if let Some(secret) = &self.secret {
            full_params.push(json!(format!("token:{secret}")));
        }
        full_params.extend(params);

        let body = JsonRpcRequest::new(method, json!(full_params));

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Connection(e.to_string()))?;

        let parsed: JsonRpcResponse =
            response.json().await.map_err(|e| AppError::Request(e.to_string()))?;

        if let Some(err) = parsed.error {
            if is_task_not_found(&err.message) {
                return Err(AppError::TaskNotFound);
            }
            return Err(AppError::Request(err.message));
        }

        parsed.result.ok_or_else(|| AppError::Request("missing result in JSON-RPC reply".into()))
    }

    fn status_keys() -> Value {
        json!(STATUS_KEYS)
    }
}

#[async_trait]
impl EngineClient for Aria2Client {
    async fn add(&self, uris: Vec<String>, options: Option<Value>) -> Result<String> {
        let options = options.unwrap_or_else(|| json!({}));
        let result = self.call("aria2.addUri", vec![json!(uris), options]).await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AppError::Request("addUri did not return a gid".into()))
    }

    async fn get(&self, gid: &str) -> Result<TaskSnapshot> {
        let result = self
            .call("aria2.tellStatus", vec![json!(gid), Self::status_keys()])
            .await?;
        parse_snapshot(&result)
    }

    async fn list_active(&self) -> Result<Vec<TaskSnapshot>> {
        let result = self.call("aria2.tellActive", vec![Self::status_keys()]).await?;
        parse_snapshots(&result)
    }

    async fn list_waiting(&self, offset: u32, limit: u32) -> Result<Vec<TaskSnapshot>> {
        let result = self
            .call(
                "aria2.tellWaiting",
                vec![json!(offset), json!(limit), Self::status_keys()],
            )
            .await?;
        parse_snapshots(&result)
    }

    async fn list_stopped(&self, limit: u32) -> Result<Vec<TaskSnapshot>> {
        let result = self
            .call(
                "aria2.tellStopped",
                vec![json!(0), json!(limit), Self::status_keys()],
            )
            .await?;
        parse_snapshots(&result)
    }

    async fn pause(&self, gid: &str) -> Result<()> {
        self.call("aria2.pause", vec![json!(gid)]).await.map(|_| ())
    }

    async fn resume(&self, gid: &str) -> Result<()> {
        self.call("aria2.unpause", vec![json!(gid)]).await.map(|_| ())
    }

    async fn remove(&self, gid: &str) -> Result<()> {
        // forceRemove covers active/waiting/paused tasks; removeDownloadResult
        // covers stopped ones. Try the former, fall back to the latter, and
        // treat its own failure to purge the results bucket as non-fatal.
        match self.call("aria2.forceRemove", vec![json!(gid)]).await {
            Ok(_) => {
                if let Err(e) = self.call("aria2.removeDownloadResult", vec![json!(gid)]).await {
                    tracing::warn!(gid = %gid, error = %e, "failed to purge aria2 results bucket");
                }
                Ok(())
            }
            Err(AppError::TaskNotFound) => {
                self.call("aria2.removeDownloadResult", vec![json!(gid)]).await.map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    async fn pause_all(&self) -> Result<()> {
        self.call("aria2.pauseAll", vec![]).await.map(|_| ())
    }

    async fn resume_all(&self) -> Result<()> {
        self.call("aria2.unpauseAll", vec![]).await.map(|_| ())
    }

    async fn global_stats(&self) -> Result<GlobalStats> {
        let stat = self.call("aria2.getGlobalStat", vec![]).await?;
        let version = self.call("aria2.getVersion", vec![]).await?;
        Ok(parse_global_stats(&stat, &version))
    }
}

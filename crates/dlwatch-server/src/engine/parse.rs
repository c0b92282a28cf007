// src/engine/parse.rs
// Maps aria2's wire representation (strings for numbers, a files array, an
// optional bittorrent.info.name) onto dlwatch_types::TaskSnapshot.

use crate::error::{AppError, Result};
use dlwatch_types::{FileEntry, GlobalStats, TaskSnapshot, TaskStatus};
use serde_json::Value;

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_string)
}

fn u64_field(v: &Value, key: &str) -> u64 {
    v.get(key)
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0)
}

fn parse_status(s: &str) -> Result<TaskStatus> {
    match s {
        "active" => Ok(TaskStatus::Active),
        "waiting" => Ok(TaskStatus::Waiting),
        "paused" => Ok(TaskStatus::Paused),
        "complete" => Ok(TaskStatus::Complete),
        "error" => Ok(TaskStatus::Error),
        "removed" => Ok(TaskStatus::Removed),
        other => Err(AppError::Request(format!("unknown aria2 status {other:?}"))),
    }
}

fn basename(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

fn parse_files(v: &Value) -> Vec<FileEntry> {
    v.get("files")
        .and_then(Value::as_array)
        .map(|files| {
            files
                .iter()
                .filter_map(|f| {
                    let path = f.get("path")?.as_str()?.to_string();
                    let name = basename(&path);
                    Some(FileEntry { path, name })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Derives the display name: a torrent's advertised name, else the first
/// file's basename, else the bare gid.
fn derive_name(v: &Value, files: &[FileEntry], gid: &str) -> String {
    if let Some(name) = v
        .get("bittorrent")
        .and_then(|bt| bt.get("info"))
        .and_then(|info| info.get("name"))
        .and_then(Value::as_str)
    {
        return name.to_string();
    }
    if let Some(first) = files.first() {
        if !first.name.is_empty() {
            return first.name.clone();
        }
    }
    gid.to_string()
}

pub fn parse_snapshot(v: &Value) -> Result<TaskSnapshot> {
    let gid = str_field(v, "gid").ok_or_else(|| AppError::Request("missing gid".into()))?;
    let status_str = str_field(v, "status").ok_or_else(|| AppError::Request("missing status".into()))?;
    let status = parse_status(&status_str)?;
    let files = parse_files(v);
    let name = derive_name(v, &files, &gid);
    let dir = str_field(v, "dir").unwrap_or_default();
    let error_code = str_field(v, "errorCode");
    let error_message = str_field(v, "errorMessage");

    Ok(TaskSnapshot::derive(
        gid,
        status,
        name,
        u64_field(v, "totalLength"),
        u64_field(v, "completedLength"),
        u64_field(v, "downloadSpeed"),
        u64_field(v, "uploadSpeed"),
        u64_field(v, "connections") as u32,
        error_code,
        error_message,
        files,
        dir,
    ))
}

pub fn parse_snapshots(v: &Value) -> Result<Vec<TaskSnapshot>> {
    v.as_array()
        .ok_or_else(|| AppError::Request("expected array of tasks".into()))?
        .iter()
        .map(parse_snapshot)
        .collect()
}

pub fn parse_global_stats(stat: &Value, version: &Value) -> GlobalStats {
    GlobalStats {
        download_speed: u64_field(stat, "downloadSpeed"),
        upload_speed: u64_field(stat, "uploadSpeed"),
        num_active: u64_field(stat, "numActive") as u32,
        num_waiting: u64_field(stat, "numWaiting") as u32,
        num_stopped: u64_field(stat, "numStopped") as u32,
        version: str_field(version, "version").unwrap_or_default(),
    }
}

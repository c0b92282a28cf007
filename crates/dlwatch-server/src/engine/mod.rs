// src/engine/mod.rs
// C1: facade over the aria2 JSON-RPC engine.

pub mod client;
pub mod parse;
pub mod rpc;

pub use client::{Aria2Client, EngineClient};

//! Rate-limiting stdio guard for a Notion MCP server.
//!
//! `notion-guard` sits between an MCP client and a backend Notion MCP server
//! process, proxying line-delimited JSON-RPC traffic in both directions.
//! Along the way it:
//!
//! - classifies mutating tool calls and enforces a sliding one-hour rate
//!   limit over them, answering denied requests with a JSON-RPC error
//!   instead of forwarding
//! - splits oversized block-append calls into paced sub-batches so a single
//!   request cannot burst-write hundreds of blocks
//! - records every mutating operation (pending, then success or failed once
//!   the backend responds) in an append-only in-memory log, mirrored to
//!   daily JSONL files
//!
//! Anything it cannot parse passes through untouched: the guard fails open
//! so protocol evolution on either side never breaks the session.

pub mod batch;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod oplog;
pub mod pipeline;
pub mod proxy;
pub mod ratelimit;

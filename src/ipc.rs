//! IPC client for communication with the Bassbox audio engine.
//!
//! The engine runs as a child process and speaks JSON-RPC 2.0 over its
//! stdio, one JSON document per line.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   stdin: request lines    ┌─────────────────────┐
//! │   RpcClient     │ ─────────────────────────►│      bassbox        │
//! │  + Namespace    │ ◄─────────────────────────│   (audio engine)    │
//! └─────────────────┘   stdout: response lines  └─────────────────────┘
//! ```
//!
//! - [`LineReader`] splits the engine's output into lines.
//! - [`RpcClient`] writes requests and correlates responses by id.
//! - [`Namespace`] maps dotted paths like `audioPlayer.play` onto calls.
//!
//! # Protocol
//!
//! ```text
//! → {"jsonrpc":"2.0","id":0,"method":"audioPlayer.setVolume","params":[0.5]}
//! ← {"id":0,"result":null}
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use bassbox_rpc::ipc::{Namespace, RpcClient};
//! use serde_json::json;
//!
//! let (client, _pump) = RpcClient::spawn(child_stdout, child_stdin);
//! let root = Namespace::root(client, ["audioPlayer", "audioGraph"]);
//! root.call_path("audioPlayer.setVolume", vec![json!(0.5)]).await?;
//! ```

mod client;
mod framing;
mod namespace;

pub use client::{RpcClient, RpcError};
pub use framing::{drive, write_line, LineReader};
pub use namespace::{Member, Namespace, RemoteMethod};

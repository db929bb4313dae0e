//! Bassbox RPC Library
//!
//! Client side of the line-framed JSON-RPC protocol spoken by the Bassbox
//! audio engine:
//!
//! - `ipc` - line framing, request/response correlation, namespace routing
//! - `engine` - typed wrappers for the `audioPlayer` and `audioGraph` services
//! - `models` - wire frames and audio graph data models
//! - `config` - engine location and client settings from the environment
//!
//! ```ignore
//! use bassbox_rpc::{engine::Bassbox, ipc::RpcClient};
//!
//! let (client, _pump) = RpcClient::spawn(child_stdout, child_stdin);
//! let bassbox = Bassbox::new(client);
//! bassbox.audio_player().enqueue_file("song.mp3").await?;
//! ```

pub mod config;
pub mod engine;
pub mod ipc;
pub mod models;

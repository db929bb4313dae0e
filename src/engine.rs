//! Typed access to the Bassbox services.
//!
//! Thin wrappers over [`Namespace`] for the methods the front-end uses. Any
//! other method stays reachable through [`Bassbox::namespace`]. Paths are
//! resolved structurally, so the wrappers work whether or not the service
//! names were declared as scopes.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::ipc::{Namespace, RpcClient, RpcError};
use crate::models::{AudioGraphSnapshot, AudioNode};

/// Services exposed by the engine.
pub const DEFAULT_SCOPES: [&str; 2] = ["audioPlayer", "audioGraph"];

const AUDIO_PLAYER: &str = "audioPlayer";
const AUDIO_GRAPH: &str = "audioGraph";

fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, RpcError> {
    serde_json::from_value(value)
        .map_err(|e| RpcError::Protocol(format!("Unexpected result from {}: {}", method, e)))
}

/// Root handle on a running engine.
#[derive(Clone)]
pub struct Bassbox {
    root: Namespace,
}

impl Bassbox {
    /// Wrap a client, declaring the engine's default service scopes.
    pub fn new(client: RpcClient) -> Self {
        Self::with_scopes(client, DEFAULT_SCOPES)
    }

    pub fn with_scopes<I, S>(client: RpcClient, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            root: Namespace::root(client, scopes),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.root
    }

    pub fn audio_player(&self) -> AudioPlayer {
        AudioPlayer {
            root: self.root.clone(),
        }
    }

    pub fn audio_graph(&self) -> AudioGraph {
        AudioGraph {
            root: self.root.clone(),
        }
    }
}

/// The `audioPlayer` service.
#[derive(Clone)]
pub struct AudioPlayer {
    root: Namespace,
}

impl AudioPlayer {
    /// Queue an audio file for playback.
    pub async fn enqueue_file(&self, path: impl AsRef<Path>) -> Result<Value, RpcError> {
        let path = path.as_ref().to_string_lossy().into_owned();
        let method = format!("{}.enqueueFile", AUDIO_PLAYER);
        self.root.call_path(&method, vec![json!(path)]).await
    }

    pub async fn set_volume(&self, level: f64) -> Result<Value, RpcError> {
        let method = format!("{}.setVolume", AUDIO_PLAYER);
        self.root.call_path(&method, vec![json!(level)]).await
    }
}

/// The `audioGraph` service.
#[derive(Clone)]
pub struct AudioGraph {
    root: Namespace,
}

impl AudioGraph {
    /// Fetch the current nodes and edges.
    pub async fn get(&self) -> Result<AudioGraphSnapshot, RpcError> {
        let method = format!("{}.get", AUDIO_GRAPH);
        let value = self.root.call_path(&method, vec![]).await?;
        decode(&method, value)
    }

    /// Add a node and return its index in the graph.
    pub async fn add_node(&self, node: &AudioNode) -> Result<usize, RpcError> {
        let node = serde_json::to_value(node)
            .map_err(|e| RpcError::Protocol(format!("Failed to serialize node: {}", e)))?;
        let method = format!("{}.addNode", AUDIO_GRAPH);
        let value = self.root.call_path(&method, vec![node]).await?;
        decode(&method, value)
    }
}

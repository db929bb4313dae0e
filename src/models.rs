//! Data models for the Bassbox JSON-RPC protocol.
//!
//! Wire frames exchanged with the engine, plus the audio graph types returned
//! by the `audioGraph` service. Field names follow the engine's camelCase JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version sent in every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Outbound JSON-RPC 2.0 request with positional parameters.
///
/// Field order matches the serialized frame:
/// `{"jsonrpc":"2.0","id":0,"method":"audioPlayer.setVolume","params":[0.5]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Vec<Value>,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Vec<Value>, id: u64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// What a response frame says about its call.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// `result` was present (possibly `null`).
    Result(Value),
    /// `error` was present and well formed.
    Error(JsonRpcError),
    /// `error` was present but not a `{code, message}` object.
    InvalidError(String),
    /// Neither `result` nor `error` was present.
    Missing,
}

/// Inbound response frame.
///
/// Parsed from a generic JSON value rather than derived, so that
/// `"result": null` is distinguishable from a missing `result`.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcResponse {
    /// Correlation id, if the frame carried a usable one.
    pub id: Option<u64>,
    pub outcome: ResponseOutcome,
}

impl JsonRpcResponse {
    /// Parse a single response line.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is not valid JSON. Valid JSON that is not
    /// a response object yields `id: None`.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::from_value(value))
    }

    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut fields) = value else {
            return Self {
                id: None,
                outcome: ResponseOutcome::Missing,
            };
        };

        let id = fields.get("id").and_then(parse_id);

        // `result` wins when both are present
        let outcome = if let Some(result) = fields.remove("result") {
            ResponseOutcome::Result(result)
        } else if let Some(error) = fields.remove("error") {
            match serde_json::from_value::<JsonRpcError>(error.clone()) {
                Ok(err) => ResponseOutcome::Error(err),
                Err(_) => ResponseOutcome::InvalidError(error.to_string()),
            }
        } else {
            ResponseOutcome::Missing
        };

        Self { id, outcome }
    }
}

/// Accept integer ids, whole floats (`7.0`) and decimal string ids (`"7"`).
fn parse_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && *f < u64::MAX as f64 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// =============================================================================
// Audio graph
// =============================================================================

/// A processing node in the engine's audio graph.
///
/// Serialized with a `type` tag, e.g. `{"type":"Volume","level":1.0}`.
/// Node types this client does not know deserialize as `Unknown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AudioNode {
    Empty,
    Silence,
    Volume {
        level: f64,
    },
    #[serde(rename_all = "camelCase")]
    File {
        file_path: String,
        paused: bool,
    },
    #[serde(rename = "IIRLowpass", rename_all = "camelCase")]
    IirLowpass {
        cutoff_hz: f64,
        disabled: bool,
    },
    #[serde(rename = "IIRHighpass", rename_all = "camelCase")]
    IirHighpass {
        cutoff_hz: f64,
        disabled: bool,
    },
    /// Forward-compatible fallback for node types added to the engine
    #[serde(other)]
    Unknown,
}

impl AudioNode {
    /// Default-configured instances of every node type the engine accepts.
    pub fn templates() -> Vec<AudioNode> {
        vec![
            AudioNode::Empty,
            AudioNode::Silence,
            AudioNode::Volume { level: 1.0 },
            AudioNode::File {
                file_path: String::new(),
                paused: false,
            },
            AudioNode::IirLowpass {
                cutoff_hz: 200.0,
                disabled: false,
            },
            AudioNode::IirHighpass {
                cutoff_hz: 14000.0,
                disabled: false,
            },
        ]
    }

    /// Default-configured node for a wire type name.
    pub fn template(type_name: &str) -> Option<AudioNode> {
        Self::templates()
            .into_iter()
            .find(|node| node.type_name() == type_name)
    }

    /// The wire `type` tag of this node.
    pub fn type_name(&self) -> &'static str {
        match self {
            AudioNode::Empty => "Empty",
            AudioNode::Silence => "Silence",
            AudioNode::Volume { .. } => "Volume",
            AudioNode::File { .. } => "File",
            AudioNode::IirLowpass { .. } => "IIRLowpass",
            AudioNode::IirHighpass { .. } => "IIRHighpass",
            AudioNode::Unknown => "Unknown",
        }
    }
}

/// Directed connection between two nodes, by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioEdge {
    pub src: usize,
    pub dest: usize,
}

/// The graph as reported by `audioGraph.get`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioGraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<AudioNode>,
    #[serde(default)]
    pub edges: Vec<AudioEdge>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_request_serializes_in_wire_order() {
        let request = JsonRpcRequest::new("audioPlayer.setVolume", vec![json!(0.5)], 0);
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"jsonrpc":"2.0","id":0,"method":"audioPlayer.setVolume","params":[0.5]}"#
        );
    }

    #[test]
    fn test_null_result_is_a_result() {
        let response = JsonRpcResponse::parse(r#"{"id":0,"result":null}"#).unwrap();
        assert_eq!(response.id, Some(0));
        assert_eq!(response.outcome, ResponseOutcome::Result(Value::Null));
    }

    #[test]
    fn test_error_response() {
        let response =
            JsonRpcResponse::parse(r#"{"id":5,"error":{"code":-1,"message":"boom"}}"#).unwrap();
        assert_eq!(response.id, Some(5));
        assert_eq!(
            response.outcome,
            ResponseOutcome::Error(JsonRpcError {
                code: -1,
                message: "boom".to_string(),
                data: None,
            })
        );
    }

    #[test]
    fn test_malformed_error_object() {
        let response = JsonRpcResponse::parse(r#"{"id":1,"error":"nope"}"#).unwrap();
        assert_eq!(
            response.outcome,
            ResponseOutcome::InvalidError("\"nope\"".to_string())
        );
    }

    #[test]
    fn test_missing_result_and_error() {
        let response = JsonRpcResponse::parse(r#"{"id":3}"#).unwrap();
        assert_eq!(response.outcome, ResponseOutcome::Missing);
    }

    #[test]
    fn test_id_forms() {
        assert_eq!(JsonRpcResponse::parse(r#"{"id":"7","result":1}"#).unwrap().id, Some(7));
        assert_eq!(JsonRpcResponse::parse(r#"{"id":-1,"result":1}"#).unwrap().id, None);
        assert_eq!(JsonRpcResponse::parse(r#"{"id":1.0,"result":1}"#).unwrap().id, Some(1));
        assert_eq!(JsonRpcResponse::parse(r#"{"id":1.5,"result":1}"#).unwrap().id, None);
        assert_eq!(JsonRpcResponse::parse(r#"{"result":1}"#).unwrap().id, None);
        assert_eq!(JsonRpcResponse::parse("[1,2]").unwrap().id, None);
    }

    #[test]
    fn test_not_json() {
        assert!(JsonRpcResponse::parse("engine starting...").is_err());
    }

    #[test]
    fn test_node_wire_format() {
        let node = AudioNode::template("IIRLowpass").unwrap();
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({"type": "IIRLowpass", "cutoffHz": 200.0, "disabled": false})
        );

        let file: AudioNode =
            serde_json::from_value(json!({"type": "File", "filePath": "a.mp3", "paused": true}))
                .unwrap();
        assert_eq!(
            file,
            AudioNode::File {
                file_path: "a.mp3".to_string(),
                paused: true,
            }
        );
    }

    #[test]
    fn test_unknown_node_type() {
        let node: AudioNode = serde_json::from_value(json!({"type": "Reverb"})).unwrap();
        assert_eq!(node, AudioNode::Unknown);
    }

    #[test]
    fn test_graph_snapshot() {
        let graph: AudioGraphSnapshot = serde_json::from_value(json!({
            "nodes": [{"type": "File", "filePath": "", "paused": false}, {"type": "Volume", "level": 0.8}],
            "edges": [{"src": 0, "dest": 1}]
        }))
        .unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges, vec![AudioEdge { src: 0, dest: 1 }]);
    }

    #[test]
    fn test_templates_round_trip_type_names() {
        for node in AudioNode::templates() {
            assert_eq!(AudioNode::template(node.type_name()), Some(node.clone()));
        }
        assert_eq!(AudioNode::template("Unknown"), None);
    }
}

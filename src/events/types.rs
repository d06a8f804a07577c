//! Payload structures, one per known event tag.
//!
//! Field names match the service's wire schema. Every struct is
//! `#[serde(default)]` so missing fields take their zero value, and unknown
//! fields are ignored. An explicit `null` is read as the zero value too.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Read `null` as `T::default()`.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// ── status ──────────────────────────────────────────────────────────────────

/// Queue status, sent on connect and whenever the queue length changes.
///
/// Wire layout: `{"status": {"exec_info": {"queue_remaining": 1}}, "sid": "..."}`.
/// The `sid` is only present on the first status after connecting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusData {
    #[serde(deserialize_with = "nullable")]
    pub status: QueueStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStatus {
    #[serde(deserialize_with = "nullable")]
    pub exec_info: ExecInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecInfo {
    #[serde(deserialize_with = "nullable")]
    pub queue_remaining: i64,
}

impl StatusData {
    pub fn queue_remaining(&self) -> i64 {
        self.status.exec_info.queue_remaining
    }

    /// Session id assigned by the service to this socket, if announced.
    pub fn session_id(&self) -> Option<&str> {
        self.sid.as_deref()
    }
}

// ── execution lifecycle ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionStart {
    #[serde(deserialize_with = "nullable")]
    pub prompt_id: String,
}

/// Nodes whose outputs were served from cache and will not execute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionCached {
    #[serde(deserialize_with = "nullable")]
    pub nodes: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub prompt_id: String,
}

/// A node started executing. `node` is `None` once the whole prompt is done.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Executing {
    pub node: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub prompt_id: String,
}

/// Step progress inside a long-running node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Progress {
    #[serde(deserialize_with = "nullable")]
    pub value: i64,
    #[serde(deserialize_with = "nullable")]
    pub max: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

impl Progress {
    /// Completed fraction in `0.0..=1.0`; zero when `max` is not positive.
    pub fn fraction(&self) -> f64 {
        if self.max <= 0 {
            return 0.0;
        }
        (self.value as f64 / self.max as f64).clamp(0.0, 1.0)
    }
}

/// A node finished and produced output files.
///
/// One `executed` event arrives per output node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Executed {
    #[serde(deserialize_with = "nullable")]
    pub node: String,
    #[serde(deserialize_with = "nullable")]
    pub prompt_id: String,
    /// Output kind (e.g. `"images"`) to the files produced under it.
    #[serde(deserialize_with = "nullable")]
    pub output: BTreeMap<String, Vec<OutputFile>>,
}

impl Executed {
    /// All output files, across every output kind.
    pub fn files(&self) -> impl Iterator<Item = &OutputFile> {
        self.output.values().flatten()
    }
}

/// Reference to a file the service wrote; retrieval is up to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputFile {
    #[serde(deserialize_with = "nullable")]
    pub filename: String,
    #[serde(deserialize_with = "nullable")]
    pub subfolder: String,
    /// Storage class reported by the service (`output`, `temp`, `input`).
    #[serde(rename = "type", deserialize_with = "nullable")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionInterrupted {
    #[serde(deserialize_with = "nullable")]
    pub prompt_id: String,
    #[serde(deserialize_with = "nullable")]
    pub node_id: String,
    #[serde(deserialize_with = "nullable")]
    pub node_type: String,
    /// Nodes that had already run when the interrupt landed.
    #[serde(deserialize_with = "nullable")]
    pub executed: Vec<String>,
}

/// A node raised; the prompt is aborted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionError {
    #[serde(deserialize_with = "nullable")]
    pub prompt_id: String,
    #[serde(deserialize_with = "nullable")]
    pub node_id: String,
    #[serde(deserialize_with = "nullable")]
    pub node_type: String,
    #[serde(deserialize_with = "nullable")]
    pub executed: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub exception_message: String,
    #[serde(deserialize_with = "nullable")]
    pub exception_type: String,
    #[serde(deserialize_with = "nullable")]
    pub traceback: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub current_inputs: Map<String, Value>,
    #[serde(deserialize_with = "nullable")]
    pub current_outputs: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSuccess {
    #[serde(deserialize_with = "nullable")]
    pub prompt_id: String,
}

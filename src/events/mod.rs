//! Typed events decoded from the service's tag-dispatched stream.
//!
//! ## Wire format
//!
//! Every text frame is a JSON envelope:
//!
//! ```json
//! {"type": "progress", "data": {"value": 18, "max": 20}}
//! ```
//!
//! The `type` field selects the payload structure. Tags this crate does not
//! know decode to [`Event::Unknown`] so newer servers never break the stream.

mod decoder;
mod types;

pub use decoder::EventDecoder;
pub use types::{
    ExecInfo, Executed, Executing, ExecutionCached, ExecutionError, ExecutionInterrupted,
    ExecutionStart, ExecutionSuccess, OutputFile, Progress, QueueStatus, StatusData,
};

use serde_json::{Value, json};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Known event tags, as they appear in the frame `type` field.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum EventTag {
    /// Queue status update.
    Status,
    /// A prompt began executing.
    ExecutionStart,
    /// Nodes skipped because their outputs were cached.
    ExecutionCached,
    /// A node began executing.
    Executing,
    /// Step progress within a node.
    Progress,
    /// A node produced output.
    Executed,
    /// The prompt was interrupted.
    ExecutionInterrupted,
    /// A node failed.
    ExecutionError,
    /// The prompt finished successfully.
    ExecutionSuccess,
}

impl EventTag {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Status(StatusData),
    ExecutionStart(ExecutionStart),
    ExecutionCached(ExecutionCached),
    Executing(Executing),
    Progress(Progress),
    Executed(Executed),
    ExecutionInterrupted(ExecutionInterrupted),
    ExecutionError(ExecutionError),
    ExecutionSuccess(ExecutionSuccess),
    /// A tag outside [`EventTag`]; the payload is not interpreted.
    Unknown { tag: String },
}

impl Event {
    /// The known tag for this event, or `None` for [`Event::Unknown`].
    pub fn event_tag(&self) -> Option<EventTag> {
        Some(match self {
            Self::Status(_) => EventTag::Status,
            Self::ExecutionStart(_) => EventTag::ExecutionStart,
            Self::ExecutionCached(_) => EventTag::ExecutionCached,
            Self::Executing(_) => EventTag::Executing,
            Self::Progress(_) => EventTag::Progress,
            Self::Executed(_) => EventTag::Executed,
            Self::ExecutionInterrupted(_) => EventTag::ExecutionInterrupted,
            Self::ExecutionError(_) => EventTag::ExecutionError,
            Self::ExecutionSuccess(_) => EventTag::ExecutionSuccess,
            Self::Unknown { .. } => return None,
        })
    }

    /// The tag string exactly as it appeared on the wire.
    pub fn tag(&self) -> &str {
        match self {
            Self::Unknown { tag } => tag,
            other => other.event_tag().map(EventTag::as_str).unwrap_or_default(),
        }
    }

    /// Prompt this event belongs to, when the payload names one.
    pub fn prompt_id(&self) -> Option<&str> {
        match self {
            Self::ExecutionStart(d) => Some(&d.prompt_id),
            Self::ExecutionCached(d) => Some(&d.prompt_id),
            Self::Executing(d) => Some(&d.prompt_id),
            Self::Progress(d) => d.prompt_id.as_deref(),
            Self::Executed(d) => Some(&d.prompt_id),
            Self::ExecutionInterrupted(d) => Some(&d.prompt_id),
            Self::ExecutionError(d) => Some(&d.prompt_id),
            Self::ExecutionSuccess(d) => Some(&d.prompt_id),
            Self::Status(_) | Self::Unknown { .. } => None,
        }
    }

    /// Whether this event ends a prompt's execution, successfully or not.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::ExecutionSuccess(_)
            | Self::ExecutionError(_)
            | Self::ExecutionInterrupted(_) => true,
            Self::Executing(d) => d.node.is_none(),
            _ => false,
        }
    }

    /// Re-encode into the wire envelope.
    pub fn to_frame(&self) -> serde_json::Result<Value> {
        let data = match self {
            Self::Status(d) => serde_json::to_value(d)?,
            Self::ExecutionStart(d) => serde_json::to_value(d)?,
            Self::ExecutionCached(d) => serde_json::to_value(d)?,
            Self::Executing(d) => serde_json::to_value(d)?,
            Self::Progress(d) => serde_json::to_value(d)?,
            Self::Executed(d) => serde_json::to_value(d)?,
            Self::ExecutionInterrupted(d) => serde_json::to_value(d)?,
            Self::ExecutionError(d) => serde_json::to_value(d)?,
            Self::ExecutionSuccess(d) => serde_json::to_value(d)?,
            Self::Unknown { .. } => json!({}),
        };
        Ok(json!({ "type": self.tag(), "data": data }))
    }
}

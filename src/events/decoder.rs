use super::{Event, EventTag};
use crate::error::FrameError;
use serde_json::{Map, Value};
use std::collections::HashMap;
use strum::IntoEnumIterator;

type DecodeFn = fn(Value) -> serde_json::Result<Event>;

/// Decodes raw frames into [`Event`]s.
///
/// The tag → payload registry is built once in [`EventDecoder::new`] and is
/// read-only afterwards, so one decoder can be shared behind an `Arc` by
/// any number of tasks and connectors.
#[derive(Debug, Clone)]
pub struct EventDecoder {
    registry: HashMap<&'static str, DecodeFn>,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDecoder {
    pub fn new() -> Self {
        let registry = EventTag::iter()
            .map(|tag| (tag.as_str(), decode_fn(tag)))
            .collect();
        Self { registry }
    }

    /// Whether `tag` has a typed payload.
    pub fn is_registered(&self, tag: &str) -> bool {
        self.registry.contains_key(tag)
    }

    /// Decode one frame.
    ///
    /// The tag is read before the payload is looked at. A tag missing from
    /// the registry yields [`Event::Unknown`]; a missing or non-string tag
    /// is a [`FrameError`].
    pub fn decode(&self, frame: &str) -> Result<Event, FrameError> {
        let value: Value = serde_json::from_str(frame).map_err(FrameError::NotJson)?;
        let Value::Object(mut envelope) = value else {
            return Err(FrameError::MissingTag);
        };

        let tag = match envelope.remove("type") {
            Some(Value::String(tag)) => tag,
            Some(_) => return Err(FrameError::TagNotString),
            None => return Err(FrameError::MissingTag),
        };

        let Some(decode) = self.registry.get(tag.as_str()) else {
            return Ok(Event::Unknown { tag });
        };

        let data = match envelope.remove("data") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(data) => data,
        };
        decode(data).map_err(|source| FrameError::Payload { tag, source })
    }
}

fn decode_fn(tag: EventTag) -> DecodeFn {
    match tag {
        EventTag::Status => |data| serde_json::from_value(data).map(Event::Status),
        EventTag::ExecutionStart => |data| serde_json::from_value(data).map(Event::ExecutionStart),
        EventTag::ExecutionCached => {
            |data| serde_json::from_value(data).map(Event::ExecutionCached)
        }
        EventTag::Executing => |data| serde_json::from_value(data).map(Event::Executing),
        EventTag::Progress => |data| serde_json::from_value(data).map(Event::Progress),
        EventTag::Executed => |data| serde_json::from_value(data).map(Event::Executed),
        EventTag::ExecutionInterrupted => {
            |data| serde_json::from_value(data).map(Event::ExecutionInterrupted)
        }
        EventTag::ExecutionError => |data| serde_json::from_value(data).map(Event::ExecutionError),
        EventTag::ExecutionSuccess => {
            |data| serde_json::from_value(data).map(Event::ExecutionSuccess)
        }
    }
}

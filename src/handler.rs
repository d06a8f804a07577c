//! The seam between the session manager and the decode path.

use crate::error::Result;
use crate::events::EventDecoder;
use crate::queue::EventSender;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

/// Called by the listen task once per inbound frame, in wire order.
///
/// An error drops that frame only; the connection stays up.
#[async_trait]
pub trait FrameHandler: Send + Sync {
    async fn handle(&self, frame: &str) -> Result<()>;
}

/// Decodes each frame and pushes the event onto the delivery queue.
#[derive(Debug, Clone)]
pub struct EventSink {
    decoder: Arc<EventDecoder>,
    queue: EventSender,
}

impl EventSink {
    pub fn new(decoder: Arc<EventDecoder>, queue: EventSender) -> Self {
        Self { decoder, queue }
    }
}

#[async_trait]
impl FrameHandler for EventSink {
    async fn handle(&self, frame: &str) -> Result<()> {
        let event = self.decoder.decode(frame)?;
        trace!(tag = event.tag(), "Decoded frame");
        self.queue.push(event)
    }
}

//! Error types for the connector.
//!
//! Steady-state network trouble is recovered by the session manager and only
//! shows up in logs; the variants a caller actually sees are configuration
//! problems and misuse of a torn-down connector.

use tokio_tungstenite::tungstenite;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the connector.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Dial or read failure on the streaming transport.
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    /// A frame could not be decoded into an event.
    #[error("malformed frame: {0}")]
    Format(#[from] FrameError),

    #[error("invalid server address: {0}")]
    Url(#[from] url::ParseError),

    #[error("unsupported scheme `{0}` (expected http, https, ws or wss)")]
    UnsupportedScheme(String),

    #[error("bearer token is not a valid header value")]
    InvalidCredential,

    #[error("connector already started")]
    AlreadyStarted,

    #[error("connector is closed")]
    Closed,

    /// The event consumer went away.
    #[error("event queue closed")]
    QueueClosed,
}

/// Reasons a single frame fails to decode.
///
/// An unknown tag is deliberately absent: it decodes to
/// [`Event::Unknown`](crate::events::Event::Unknown).
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not a JSON object: {0}")]
    NotJson(#[source] serde_json::Error),

    #[error("frame has no `type` field")]
    MissingTag,

    #[error("frame `type` field is not a string")]
    TagNotString,

    #[error("payload for `{tag}` does not match its schema: {source}")]
    Payload {
        tag: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Whether trying again unchanged can succeed. Dial bursts stop early on
    /// anything else, and such errors are logged at `error` level.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Format(_))
    }
}

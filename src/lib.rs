pub mod args;
pub mod config;
pub mod connector;
pub mod error;
pub mod events;
pub mod handler;
pub mod logging;
pub mod queue;
pub mod retry;
pub mod secret;
pub mod session;
pub mod state;
pub mod transport;

// Re-export the caller-facing types at crate root for convenience
pub use config::ConnectorConfig;
pub use connector::Connector;
pub use error::{Error, FrameError, Result};
pub use events::{Event, EventDecoder, EventTag};
pub use queue::EventReceiver;
pub use secret::SecretString;
pub use state::Phase;

//! Caller-facing façade.
//!
//! A [`Connector`] owns one decoder, one delivery queue, one connection
//! state cell and one session manager. Construction hands back the
//! [`EventReceiver`]; everything else goes through the connector.
//!
//! ```rust,ignore
//! let (connector, mut events) = Connector::new(&ConnectorConfig::default())?;
//! connector.start()?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! ```

use crate::config::ConnectorConfig;
use crate::error::Result;
use crate::events::EventDecoder;
use crate::handler::EventSink;
use crate::queue::{self, EventReceiver};
use crate::secret::SecretString;
use crate::session::{SessionConfig, SessionManager};
use crate::state::{ConnectionState, Phase};
use crate::transport::{Dialer, WsDialer};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug)]
pub struct Connector {
    session: SessionManager,
}

impl Connector {
    /// Build a WebSocket connector from configuration.
    pub fn new(config: &ConnectorConfig) -> Result<(Self, EventReceiver)> {
        Self::with_dialer(config, Arc::new(WsDialer))
    }

    pub fn with_dialer(
        config: &ConnectorConfig,
        dialer: Arc<dyn Dialer>,
    ) -> Result<(Self, EventReceiver)> {
        Ok(Self::from_session_config(config.session_config()?, dialer))
    }

    /// Build from an already-resolved session configuration.
    pub fn from_session_config(
        config: SessionConfig,
        dialer: Arc<dyn Dialer>,
    ) -> (Self, EventReceiver) {
        let (tx, rx) = queue::channel();
        let sink = EventSink::new(Arc::new(EventDecoder::new()), tx);
        let session = SessionManager::with_dialer(config, Arc::new(sink), dialer);
        (Self { session }, rx)
    }

    /// Begin connecting in the background. Returns immediately.
    pub fn start(&self) -> Result<()> {
        self.session.start()
    }

    /// Close the transport and stop reconnecting. The event queue ends once
    /// the connector is dropped and the consumer has drained it.
    pub async fn close(&self) -> Result<()> {
        self.session.close().await
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    pub fn state(&self) -> Arc<ConnectionState> {
        self.session.state()
    }

    /// Wait up to `timeout` for a connection.
    ///
    /// `Ok(true)` once connected, `Ok(false)` on timeout, [`Error::Closed`]
    /// if the connector is closed while waiting.
    ///
    /// [`Error::Closed`]: crate::Error::Closed
    pub async fn wait_until_connected(&self, timeout: Duration) -> Result<bool> {
        match tokio::time::timeout(timeout, self.session.wait_until_connected()).await {
            Ok(result) => result.map(|()| true),
            Err(_) => Ok(false),
        }
    }

    /// The streaming address being dialed.
    pub fn stream_url(&self) -> &Url {
        self.session.url()
    }

    /// Rotate the credential; takes effect on the next dial.
    pub async fn set_bearer_token(&self, token: Option<SecretString>) -> Result<()> {
        self.session.set_bearer_token(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::transport::{DialRequest, FrameStream};
    use async_trait::async_trait;
    use tokio_tungstenite::tungstenite;

    struct Unreachable;

    #[async_trait]
    impl Dialer for Unreachable {
        async fn dial(&self, _request: &DialRequest) -> Result<Box<dyn FrameStream>> {
            Err(Error::Transport(tungstenite::Error::ConnectionClosed))
        }
    }

    fn config() -> ConnectorConfig {
        ConnectorConfig {
            server_url: "https://gpu.example.com".into(),
            client_id: Some("client-1".into()),
            ..Default::default()
        }
    }

    #[test]
    fn stream_url_comes_from_config() {
        let (connector, _events) = Connector::with_dialer(&config(), Arc::new(Unreachable)).unwrap();
        assert_eq!(
            connector.stream_url().as_str(),
            "wss://gpu.example.com/ws?clientId=client-1"
        );
        assert_eq!(connector.phase(), Phase::Idle);
        assert!(!connector.is_connected());
    }

    #[test]
    fn bad_server_url_fails_construction() {
        let config = ConnectorConfig {
            server_url: "gopher://example.com".into(),
            ..Default::default()
        };
        let err = Connector::with_dialer(&config, Arc::new(Unreachable)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedScheme(_)));
    }

    #[tokio::test]
    async fn wait_times_out_while_unreachable() {
        let (connector, _events) = Connector::with_dialer(&config(), Arc::new(Unreachable)).unwrap();
        connector.start().unwrap();
        let connected = connector
            .wait_until_connected(Duration::from_millis(50))
            .await
            .unwrap();
        assert!(!connected);
        assert_eq!(connector.phase(), Phase::Connecting);
        connector.close().await.unwrap();
        assert!(matches!(
            connector.wait_until_connected(Duration::from_millis(50)).await,
            Err(Error::Closed)
        ));
    }
}

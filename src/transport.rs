//! Streaming transport consumed by the session manager.
//!
//! [`Dialer`] and [`FrameStream`] are the seam: the session only ever dials,
//! reads text frames and closes. [`WsDialer`] implements them on
//! `tokio-tungstenite`.

use crate::error::{Error, Result};
use crate::secret::{ExposeSecret, SecretString};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::Once;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

/// Query parameter carrying the per-client identifier.
pub const CLIENT_ID_PARAM: &str = "clientId";
/// Path segment of the streaming endpoint.
pub const STREAM_PATH: &str = "ws";

/// Derive the streaming address from a base HTTP(S) address.
///
/// `http` becomes `ws` and `https` becomes `wss` (`ws`/`wss` are kept), the
/// `ws` path segment is appended and `clientId` is set. Other query
/// parameters survive.
pub fn stream_url(base: &str, client_id: &str) -> Result<Url> {
    let mut url = Url::parse(base)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(Error::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::UnsupportedScheme(url.scheme().to_string()))?;

    let trimmed = url.path().trim_end_matches('/');
    let path = if trimmed.ends_with(&format!("/{STREAM_PATH}")) {
        trimmed.to_string()
    } else {
        format!("{trimmed}/{STREAM_PATH}")
    };
    url.set_path(&path);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != CLIENT_ID_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(CLIENT_ID_PARAM, client_id);

    Ok(url)
}

/// Everything a dialer needs for one attempt.
#[derive(Debug, Clone)]
pub struct DialRequest {
    pub url: Url,
    pub bearer_token: Option<SecretString>,
}

impl DialRequest {
    /// `Authorization` header value, when a credential is set.
    pub fn authorization(&self) -> Option<String> {
        self.bearer_token
            .as_ref()
            .map(|token| format!("Bearer {}", token.expose_secret()))
    }
}

/// An open connection, read one frame at a time.
#[async_trait]
pub trait FrameStream: Send {
    /// Next text frame. `None` once the peer has closed the stream.
    async fn next_frame(&mut self) -> Option<Result<String>>;

    /// Close the connection. Closing an already-closed stream is not an error.
    async fn close(&mut self) -> Result<()>;
}

/// Opens connections for the session manager.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, request: &DialRequest) -> Result<Box<dyn FrameStream>>;
}

/// Install `ring` as the process-wide rustls provider unless the embedding
/// application already installed one.
fn ensure_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        if rustls::crypto::CryptoProvider::get_default().is_none() {
            let _ = rustls::crypto::ring::default_provider().install_default();
        }
    });
}

/// WebSocket dialer (`ws://` and `wss://`).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsDialer;

#[async_trait]
impl Dialer for WsDialer {
    async fn dial(&self, request: &DialRequest) -> Result<Box<dyn FrameStream>> {
        if request.url.scheme() == "wss" {
            ensure_crypto_provider();
        }
        let mut http_request = request.url.as_str().into_client_request()?;
        if let Some(value) = request.authorization() {
            let value = HeaderValue::from_str(&value).map_err(|_| Error::InvalidCredential)?;
            http_request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws, response) = tokio_tungstenite::connect_async(http_request).await?;
        debug!(url = %request.url, status = %response.status(), "WebSocket handshake complete");
        Ok(Box::new(WsStream { inner: ws }))
    }
}

/// A live WebSocket connection.
pub struct WsStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameStream for WsStream {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                    Ok(text) => return Some(Ok(text.to_owned())),
                    Err(_) => {
                        debug!(len = bytes.len(), "Skipping non-UTF-8 binary frame");
                    }
                },
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Peer sent close frame");
                    return None;
                }
                // ping/pong are answered by tungstenite
                Ok(_) => {}
                Err(err) => return Some(Err(err.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self.inner.close(None).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

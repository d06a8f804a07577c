//! Reconnecting session manager.
//!
//! Two cooperating tasks:
//!
//! - the **supervisor** runs forever: whenever the session is not connected
//!   it dials a burst of attempts, spawns a listener on success, then waits
//!   one fixed interval before looking again;
//! - the **listener** reads frames from one connection and hands each to the
//!   [`FrameHandler`] until the read fails or the peer closes, then marks the
//!   session disconnected and exits.
//!
//! They share only the [`ConnectionState`] cell and the handler (whose queue
//! sender is the single cross-task hand-off of data). Teardown is signalled
//! with a [`CancellationToken`]; [`SessionManager::close`] is the only way to
//! stop the supervisor.

use crate::error::{Error, Result};
use crate::handler::FrameHandler;
use crate::retry::{self, ReconnectPolicy};
use crate::secret::SecretString;
use crate::state::{ConnectionState, Phase};
use crate::transport::{DialRequest, Dialer, FrameStream, WsDialer};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// Static configuration of a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Streaming address, see [`crate::transport::stream_url`].
    pub url: Url,
    pub policy: ReconnectPolicy,
    /// Sent as `Authorization: Bearer <token>` on every dial.
    pub bearer_token: Option<SecretString>,
}

impl SessionConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            policy: ReconnectPolicy::default(),
            bearer_token: None,
        }
    }
}

/// Owns the connect / retry / listen lifecycle of one streaming connection.
///
/// Dropping the manager tears the session down like [`close`](Self::close),
/// without waiting for the background tasks to finish.
pub struct SessionManager {
    inner: Arc<Inner>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    url: Url,
    policy: ReconnectPolicy,
    credential: RwLock<Option<SecretString>>,
    handler: Arc<dyn FrameHandler>,
    dialer: Arc<dyn Dialer>,
    state: Arc<ConnectionState>,
    cancel: CancellationToken,
    started: AtomicBool,
}

impl SessionManager {
    /// Session over WebSocket.
    pub fn new(config: SessionConfig, handler: Arc<dyn FrameHandler>) -> Self {
        Self::with_dialer(config, handler, Arc::new(WsDialer))
    }

    /// Session over a custom transport.
    pub fn with_dialer(
        config: SessionConfig,
        handler: Arc<dyn FrameHandler>,
        dialer: Arc<dyn Dialer>,
    ) -> Self {
        let inner = Inner {
            url: config.url,
            policy: config.policy,
            credential: RwLock::new(config.bearer_token),
            handler,
            dialer,
            state: Arc::new(ConnectionState::new()),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
        };
        Self {
            inner: Arc::new(inner),
            supervisor: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.inner.policy
    }

    /// Shared handle on the connection state, for observers.
    pub fn state(&self) -> Arc<ConnectionState> {
        self.inner.state.clone()
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.phase()
    }

    /// Non-blocking readiness check.
    pub fn is_connected(&self) -> bool {
        self.inner.state.is_connected()
    }

    /// Spawn the supervision loop and return immediately.
    ///
    /// Must be called from within a Tokio runtime. Fails if the session was
    /// already started or has been closed.
    pub fn start(&self) -> Result<()> {
        if self.inner.state.is_closed() {
            return Err(Error::Closed);
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }

        self.inner.state.set(Phase::Connecting);
        info!(url = %self.inner.url, "Starting session");
        let handle = tokio::spawn(supervise(self.inner.clone()));
        *self.supervisor.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
        Ok(())
    }

    /// Wait until a connection is up. Fails with [`Error::Closed`] if the
    /// session is closed first.
    pub async fn wait_until_connected(&self) -> Result<()> {
        self.inner.state.wait_until_connected().await
    }

    /// Replace the credential used by the next dial attempt. The current
    /// connection, if any, is not affected.
    pub async fn set_bearer_token(&self, token: Option<SecretString>) -> Result<()> {
        if self.inner.state.is_closed() {
            return Err(Error::Closed);
        }
        *self.inner.credential.write().await = token;
        debug!(url = %self.inner.url, "Bearer token rotated");
        Ok(())
    }

    /// Close the transport and stop reconnecting.
    ///
    /// Waits for the background tasks to finish. Closing twice fails with
    /// [`Error::Closed`].
    pub async fn close(&self) -> Result<()> {
        if self.inner.state.set(Phase::Closed) == Phase::Closed {
            return Err(Error::Closed);
        }
        self.inner.cancel.cancel();

        let handle = self
            .supervisor
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(url = %self.inner.url, error = %err, "Supervisor task ended abnormally");
            }
        }

        info!(url = %self.inner.url, "Session closed");
        Ok(())
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.inner.state.set(Phase::Closed);
        self.inner.cancel.cancel();
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("url", &self.inner.url.as_str())
            .field("policy", &self.inner.policy)
            .field("phase", &self.inner.state.phase())
            .finish()
    }
}

impl Inner {
    async fn dial_request(&self) -> DialRequest {
        DialRequest {
            url: self.url.clone(),
            bearer_token: self.credential.read().await.clone(),
        }
    }

    /// One burst of back-to-back dials. Failures are logged, never returned.
    async fn connect(&self) -> Option<Box<dyn FrameStream>> {
        let result = retry::dial_burst(
            &self.policy,
            |attempt| async move {
                debug!(url = %self.url, attempt, "Dialing");
                let request = self.dial_request().await;
                self.dialer.dial(&request).await
            },
            |err: &Error| err.is_transient(),
            |info, err| {
                if err.is_transient() {
                    warn!(
                        url = %self.url,
                        attempt = info.attempt,
                        of = info.of,
                        error = %err,
                        "Connection attempt failed"
                    );
                } else {
                    error!(
                        url = %self.url,
                        attempt = info.attempt,
                        error = %err,
                        "Connection attempt cannot succeed with the current settings"
                    );
                }
            },
        )
        .await;

        match result {
            Ok(stream) => Some(stream),
            Err(_) => {
                warn!(
                    url = %self.url,
                    retry_in = ?self.policy.interval,
                    "All connection attempts failed"
                );
                None
            }
        }
    }
}

async fn supervise(inner: Arc<Inner>) {
    let mut listener: Option<JoinHandle<()>> = None;

    loop {
        if !inner.state.is_connected() {
            inner.state.set(Phase::Connecting);
            let stream = tokio::select! {
                _ = inner.cancel.cancelled() => break,
                dialed = AssertUnwindSafe(inner.connect()).catch_unwind() => {
                    dialed.unwrap_or_else(|panic| {
                        error!(url = %inner.url, panic = panic_message(&*panic), "Dialer panicked");
                        None
                    })
                }
            };
            if let Some(stream) = stream {
                if inner.state.transition(Phase::Connecting, Phase::Connected) {
                    info!(url = %inner.url, "Connected");
                }
                listener = Some(tokio::spawn(run_listener(inner.clone(), stream)));
            }
        }

        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            _ = tokio::time::sleep(inner.policy.interval) => {}
        }
    }

    if let Some(handle) = listener.take() {
        let _ = handle.await;
    }
    inner.state.set(Phase::Closed);
}

/// Run [`listen`], turning a panic in the transport or handler into a
/// disconnect so the supervisor redials.
async fn run_listener(inner: Arc<Inner>, stream: Box<dyn FrameStream>) {
    if let Err(panic) = AssertUnwindSafe(listen(inner.clone(), stream))
        .catch_unwind()
        .await
    {
        error!(url = %inner.url, panic = panic_message(&*panic), "Listener panicked");
        inner.state.transition(Phase::Connected, Phase::Disconnected);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

async fn listen(inner: Arc<Inner>, mut stream: Box<dyn FrameStream>) {
    loop {
        let next = tokio::select! {
            _ = inner.cancel.cancelled() => None,
            next = stream.next_frame() => Some(next),
        };
        let Some(next) = next else {
            debug!(url = %inner.url, "Listener cancelled");
            break;
        };

        match next {
            Some(Ok(frame)) => {
                match inner.handler.handle(&frame).await {
                    Ok(()) => {}
                    Err(err) if err.is_transient() => {
                        warn!(url = %inner.url, error = %err, len = frame.len(), "Dropping frame");
                    }
                    Err(err) => {
                        error!(url = %inner.url, error = %err, "Frame handler failed");
                    }
                }
            }
            Some(Err(err)) => {
                warn!(url = %inner.url, error = %err, "Read failed");
                break;
            }
            None => {
                info!(url = %inner.url, "Server closed the connection");
                break;
            }
        }
    }

    if inner.state.transition(Phase::Connected, Phase::Disconnected) {
        info!(url = %inner.url, retry_in = ?inner.policy.interval, "Disconnected");
    }
    if let Err(err) = stream.close().await {
        debug!(url = %inner.url, error = %err, "Error closing stream");
    }
}

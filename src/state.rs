//! Connection state shared between the session tasks and observers.
//!
//! The whole lifecycle lives in one atomic, so `is_connected` never blocks
//! and always reflects the latest transition. `Closed` is terminal: once
//! set, no other transition is accepted.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU8, Ordering};
use strum::Display;
use tokio::sync::Notify;

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum Phase {
    /// Constructed, supervision loop not started.
    Idle = 0,
    /// Dialing, or waiting to retry after a failed burst.
    Connecting = 1,
    Connected = 2,
    /// The last connection dropped; a new burst follows after the interval.
    Disconnected = 3,
    /// Torn down. Terminal.
    Closed = 4,
}

impl Phase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Disconnected,
            _ => Self::Closed,
        }
    }
}

/// Atomically readable connection state with change notification.
#[derive(Debug)]
pub struct ConnectionState {
    phase: AtomicU8,
    changed: Notify,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(Phase::Idle as u8),
            changed: Notify::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn is_connected(&self) -> bool {
        self.phase() == Phase::Connected
    }

    pub fn is_closed(&self) -> bool {
        self.phase() == Phase::Closed
    }

    /// Move to `next` unless already closed. Returns the previous phase.
    pub(crate) fn set(&self, next: Phase) -> Phase {
        let prev = self
            .phase
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
                (cur != Phase::Closed as u8).then_some(next as u8)
            })
            .unwrap_or_else(|closed| closed);
        let prev = Phase::from_u8(prev);
        if prev != next {
            self.changed.notify_waiters();
        }
        prev
    }

    /// Move from `from` to `to` only if the current phase is `from`.
    pub(crate) fn transition(&self, from: Phase, to: Phase) -> bool {
        let swapped = self
            .phase
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if swapped && from != to {
            self.changed.notify_waiters();
        }
        swapped
    }

    /// Wait until connected. Fails with [`Error::Closed`] if the session is
    /// torn down first.
    pub async fn wait_until_connected(&self) -> Result<()> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.phase() {
                Phase::Connected => return Ok(()),
                Phase::Closed => return Err(Error::Closed),
                _ => {}
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn starts_idle_and_disconnected() {
        let state = ConnectionState::new();
        assert_eq!(state.phase(), Phase::Idle);
        assert!(!state.is_connected());
    }

    #[test]
    fn closed_is_terminal() {
        let state = ConnectionState::new();
        state.set(Phase::Connected);
        assert_eq!(state.set(Phase::Closed), Phase::Connected);
        assert_eq!(state.set(Phase::Connecting), Phase::Closed);
        assert!(state.is_closed());
        assert!(!state.transition(Phase::Connected, Phase::Disconnected));
    }

    #[test]
    fn transition_requires_expected_phase() {
        let state = ConnectionState::new();
        assert!(!state.transition(Phase::Connected, Phase::Disconnected));
        state.set(Phase::Connected);
        assert!(state.transition(Phase::Connected, Phase::Disconnected));
        assert_eq!(state.phase(), Phase::Disconnected);
    }

    #[test]
    fn phase_displays_snake_case() {
        assert_eq!(Phase::Disconnected.to_string(), "disconnected");
    }

    #[tokio::test]
    async fn waiter_wakes_on_connect() {
        let state = Arc::new(ConnectionState::new());
        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.wait_until_connected().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        state.set(Phase::Connecting);
        state.set(Phase::Connected);
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn waiter_fails_on_close() {
        let state = Arc::new(ConnectionState::new());
        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.wait_until_connected().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        state.set(Phase::Closed);
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(matches!(result, Err(Error::Closed)));
    }
}

//! Per-operation timeouts that shut a connection down.
//!
//! Each connection owns a [`ShutdownSwitch`]; all of its guarded I/O races
//! the switch and fails as soon as it trips. Before an I/O step a session arms
//! a [`TimeoutGuard`], which spawns a timer that trips the switch when the
//! deadline passes. Completing the step cancels the guard. Afterwards
//! [`TimeoutGuard::fired`] tells a timeout apart from an ordinary transport
//! failure.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::protocol::HttpError;

/// A one-way shutdown line shared by a connection and the timers guarding it.
///
/// Once tripped it stays tripped; a reconnect does not reset it.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSwitch {
    token: CancellationToken,
}

impl ShutdownSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trip(&self) {
        self.token.cancel();
    }

    pub fn is_tripped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once the switch is tripped.
    pub async fn tripped(&self) {
        self.token.cancelled().await;
    }
}

/// A timer bound to one I/O step.
///
/// A zero timeout produces an inert guard that never fires. Dropping a guard
/// cancels it, and cancelling twice, or after it fired, does nothing.
#[derive(Debug)]
pub struct TimeoutGuard {
    timer: Option<JoinHandle<()>>,
    fired: Arc<AtomicBool>,
    stage: &'static str,
    timeout: Duration,
}

impl TimeoutGuard {
    /// Starts a timer that trips `switch` after `timeout`.
    ///
    /// Must be called from within a tokio runtime unless `timeout` is zero.
    pub fn arm(switch: &ShutdownSwitch, timeout: Duration, stage: &'static str) -> Self {
        let fired = Arc::new(AtomicBool::new(false));
        if timeout.is_zero() {
            return Self { timer: None, fired, stage, timeout };
        }

        let switch = switch.clone();
        let flag = Arc::clone(&fired);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            debug!(?timeout, stage, "timeout fired, shutting connection down");
            flag.store(true, Ordering::SeqCst);
            switch.trip();
        });

        Self { timer: Some(timer), fired, stage, timeout }
    }

    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Classifies the error of a guarded step: a timeout if this guard fired,
    /// a transport error otherwise.
    pub fn classify(&self, e: io::Error) -> HttpError {
        if self.fired() { HttpError::timeout(self.stage, self.timeout) } else { HttpError::from(e) }
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorKind;

    #[tokio::test]
    async fn fires_and_trips() {
        let switch = ShutdownSwitch::new();
        let guard = TimeoutGuard::arm(&switch, Duration::from_millis(20), "reading");

        tokio::time::timeout(Duration::from_secs(5), switch.tripped()).await.unwrap();
        assert!(guard.fired());
        assert_eq!(guard.classify(io::Error::from(io::ErrorKind::ConnectionAborted)).kind(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let switch = ShutdownSwitch::new();
        let mut guard = TimeoutGuard::arm(&switch, Duration::from_millis(20), "writing");
        guard.cancel();
        guard.cancel();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!guard.fired());
        assert!(!switch.is_tripped());
        assert_eq!(guard.classify(io::Error::from(io::ErrorKind::BrokenPipe)).kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn cancel_after_fire_is_noop() {
        let switch = ShutdownSwitch::new();
        let mut guard = TimeoutGuard::arm(&switch, Duration::from_millis(1), "connecting");
        switch.tripped().await;
        guard.cancel();
        assert!(guard.fired());
        assert!(switch.is_tripped());
    }

    #[tokio::test]
    async fn zero_timeout_is_inert() {
        let switch = ShutdownSwitch::new();
        let guard = TimeoutGuard::arm(&switch, Duration::ZERO, "reading");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!guard.fired());
        assert!(!switch.is_tripped());
    }

    #[tokio::test]
    async fn drop_cancels() {
        let switch = ShutdownSwitch::new();
        drop(TimeoutGuard::arm(&switch, Duration::from_millis(10), "reading"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!switch.is_tripped());
    }
}

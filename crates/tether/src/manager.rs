//! Connection manager owning one socket lifecycle.
//!
//! Tracks connection state, delivers lifecycle notifications to the host,
//! and reconnects automatically with exponential backoff when an
//! established connection is lost unexpectedly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::SocketError;
use crate::notify::Notifier;
use crate::retry::{
    ManagerContext, cancel_pending_retry, open_link, set_retrying, set_state,
};
use crate::transport::Transport;
use crate::types::{ManagerConfig, Payload, SocketState};
use crate::ws::WsTransport;

/// Manager for a single logical WebSocket connection.
///
/// Created once by the host and kept for the host's lifetime; the
/// underlying socket comes and goes across `open`/`close` cycles and
/// automatic reconnects. All lifecycle outcomes, including every error,
/// are delivered through the [`Notifier`], never raised.
pub struct ConnectionManager {
    ctx: ManagerContext,
}

impl ConnectionManager {
    /// Creates a manager backed by the real WebSocket transport.
    ///
    /// Nothing connects at construction time; call [`open`](Self::open),
    /// or use the auto setters.
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_transport(config, Arc::new(WsTransport))
    }

    /// Creates a manager over a caller-supplied transport.
    pub fn with_transport(config: ManagerConfig, transport: Arc<dyn Transport>) -> Self {
        let ctx = ManagerContext {
            transport,
            url: Arc::new(RwLock::new(config.url)),
            message: Arc::new(Mutex::new(None)),
            auto: Arc::new(AtomicBool::new(config.auto)),
            no_retry: Arc::new(AtomicBool::new(config.no_retry)),
            retry: config.retry,
            state: Arc::new(RwLock::new(SocketState::Uninitialized)),
            link: Arc::new(Mutex::new(None)),
            manual_close: Arc::new(AtomicBool::new(false)),
            retrying: Arc::new(AtomicBool::new(false)),
            retry_count: Arc::new(AtomicU32::new(0)),
            retry_cancel: Arc::new(std::sync::Mutex::new(None)),
            pump_cancel: Arc::new(std::sync::Mutex::new(None)),
            epoch: Arc::new(AtomicU64::new(0)),
            gate: Arc::new(Mutex::new(())),
            notifier: Notifier::default(),
        };
        Self { ctx }
    }

    /// Registration surface for lifecycle notifications.
    pub fn notifier(&self) -> &Notifier {
        &self.ctx.notifier
    }

    /// Attempts to connect to the configured url.
    ///
    /// An existing connection is closed first, along with any pending
    /// reconnect timer. A handle-acquisition failure is reported on the
    /// error channel and leaves the state untouched.
    pub async fn open(&self) {
        open_link(&self.ctx).await;
    }

    /// Closes the connection.
    ///
    /// Any pending reconnect timer is cancelled first; beyond that the
    /// call is a no-op when no live connection exists. `code` is passed to
    /// the transport only when it is 1000 or within `[3000, 5000)`; other
    /// values are dropped together with `reason`.
    pub async fn close(&self, code: Option<u16>, reason: Option<String>) {
        let _gate = self.ctx.gate.lock().await;
        cancel_pending_retry(&self.ctx.retry_cancel);
        set_retrying(&self.ctx, false).await;

        let link = self.ctx.link.lock().await;
        let Some(link) = link.as_ref() else {
            return;
        };
        self.ctx.manual_close.store(true, Ordering::Relaxed);
        set_state(&self.ctx, SocketState::Closing).await;

        let (code, reason) = match permitted_close_code(code) {
            Some(code) => (Some(code), reason),
            None => (None, None),
        };
        info!(?code, "closing connection");
        link.close(code, reason).await;
    }

    /// Transmits the assigned message.
    ///
    /// Reports NotConnected on the error channel when the socket is not
    /// open; a transport-level send failure is reported the same way and
    /// leaves the connection up.
    pub async fn send(&self) {
        if *self.ctx.state.read().await != SocketState::Open {
            self.ctx.notifier.error(SocketError::NotConnected).await;
            return;
        }
        let payload = self.ctx.message.lock().await.clone();
        let Some(payload) = payload else {
            debug!("send called with no message assigned");
            return;
        };

        let link = self.ctx.link.lock().await;
        match link.as_ref() {
            Some(link) => {
                if let Err(e) = link.send(payload).await {
                    self.ctx.notifier.error(e).await;
                }
            }
            None => self.ctx.notifier.error(SocketError::NotConnected).await,
        }
    }

    /// Sets the destination url. Assigning the current value is ignored;
    /// in auto mode a non-empty url triggers [`open`](Self::open).
    pub async fn set_url(&self, url: impl Into<String>) {
        let url = url.into();
        {
            let mut current = self.ctx.url.write().await;
            if *current == url {
                return;
            }
            *current = url.clone();
        }
        if self.ctx.auto.load(Ordering::Relaxed) && !url.is_empty() {
            self.open().await;
        }
    }

    /// Assigns the message to transmit. Assigning the current value is
    /// ignored; in auto mode a non-empty payload triggers
    /// [`send`](Self::send).
    pub async fn set_message(&self, payload: impl Into<Payload>) {
        let payload = payload.into();
        {
            let mut current = self.ctx.message.lock().await;
            if current.as_ref() == Some(&payload) {
                return;
            }
            *current = Some(payload.clone());
        }
        if self.ctx.auto.load(Ordering::Relaxed) && !payload.is_empty() {
            self.send().await;
        }
    }

    /// Turns auto mode on or off. Turning it on re-evaluates both
    /// triggers: a non-empty url opens, a non-empty message sends.
    pub async fn set_auto(&self, auto: bool) {
        if self.ctx.auto.swap(auto, Ordering::Relaxed) == auto || !auto {
            return;
        }
        if !self.ctx.url.read().await.is_empty() {
            self.open().await;
        }
        let pending = self
            .ctx
            .message
            .lock()
            .await
            .as_ref()
            .is_some_and(|p| !p.is_empty());
        if pending {
            self.send().await;
        }
    }

    /// Suppresses (or re-allows) automatic reconnection. Turning it on
    /// cancels any pending reconnect and resets the retry counter.
    pub async fn set_no_retry(&self, no_retry: bool) {
        if self.ctx.no_retry.swap(no_retry, Ordering::Relaxed) == no_retry {
            return;
        }
        if no_retry {
            cancel_pending_retry(&self.ctx.retry_cancel);
            set_retrying(&self.ctx, false).await;
            self.ctx.retry_count.store(0, Ordering::Relaxed);
        }
    }

    /// Current socket state.
    pub async fn state(&self) -> SocketState {
        *self.ctx.state.read().await
    }

    /// True while an automatic reconnect is scheduled or in flight.
    pub fn retrying(&self) -> bool {
        self.ctx.retrying.load(Ordering::Relaxed)
    }

    /// Consecutive automatic retries since the last successful open.
    pub fn retry_count(&self) -> u32 {
        self.ctx.retry_count.load(Ordering::Relaxed)
    }

    /// True when the current close was requested by the owner.
    pub fn manual_close(&self) -> bool {
        self.ctx.manual_close.load(Ordering::Relaxed)
    }

    /// Whether a transport handle currently exists.
    pub async fn has_connection(&self) -> bool {
        self.ctx.link.lock().await.is_some()
    }

    /// The configured destination url.
    pub async fn url(&self) -> String {
        self.ctx.url.read().await.clone()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        cancel_pending_retry(&self.ctx.retry_cancel);
        if let Ok(mut guard) = self.ctx.pump_cancel.lock()
            && let Some(token) = guard.take()
        {
            token.cancel();
        }
        // Dropping the link tears its connection down.
        if let Ok(mut guard) = self.ctx.link.try_lock() {
            guard.take();
        }
    }
}

/// Close codes a caller may pass through to the peer: normal closure or
/// the application-reserved range.
fn permitted_close_code(code: Option<u16>) -> Option<u16> {
    code.filter(|code| *code == 1000 || (3000..5000).contains(code))
}

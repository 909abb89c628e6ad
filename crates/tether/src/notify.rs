//! Lifecycle notifications delivered to the host.
//!
//! Each named channel holds at most one handler; registering a new handler
//! replaces (and effectively unregisters) the previous one. Handlers are
//! plain `Fn` callbacks invoked from the manager's event processing, so they
//! should hand work off quickly, typically with a `try_send` into the
//! host's own channel.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::SocketError;
use crate::types::Payload;

/// Callback for the `connected` channel.
pub type ConnectedHandler = Box<dyn Fn() + Send + Sync>;
/// Callback for the `disconnected` channel.
pub type DisconnectedHandler = Box<dyn Fn() + Send + Sync>;
/// Callback for the `retrying` channel; receives the new flag value.
pub type RetryingHandler = Box<dyn Fn(bool) + Send + Sync>;
/// Callback for the `message` channel; receives the inbound payload.
pub type MessageHandler = Box<dyn Fn(Payload) + Send + Sync>;
/// Callback for the `error` channel.
pub type ErrorHandler = Box<dyn Fn(SocketError) + Send + Sync>;

/// Named lifecycle channels with single-registration semantics.
#[derive(Clone, Default)]
pub struct Notifier {
    on_connected: Arc<Mutex<Option<ConnectedHandler>>>,
    on_disconnected: Arc<Mutex<Option<DisconnectedHandler>>>,
    on_retrying: Arc<Mutex<Option<RetryingHandler>>>,
    on_message: Arc<Mutex<Option<MessageHandler>>>,
    on_error: Arc<Mutex<Option<ErrorHandler>>>,
}

impl Notifier {
    /// Sets the `connected` handler, replacing any previous one.
    pub async fn set_connected(&self, cb: ConnectedHandler) {
        *self.on_connected.lock().await = Some(cb);
    }

    /// Sets the `disconnected` handler, replacing any previous one.
    pub async fn set_disconnected(&self, cb: DisconnectedHandler) {
        *self.on_disconnected.lock().await = Some(cb);
    }

    /// Sets the `retrying` handler, replacing any previous one.
    pub async fn set_retrying(&self, cb: RetryingHandler) {
        *self.on_retrying.lock().await = Some(cb);
    }

    /// Sets the `message` handler, replacing any previous one.
    pub async fn set_message(&self, cb: MessageHandler) {
        *self.on_message.lock().await = Some(cb);
    }

    /// Sets the `error` handler, replacing any previous one.
    pub async fn set_error(&self, cb: ErrorHandler) {
        *self.on_error.lock().await = Some(cb);
    }

    pub(crate) async fn connected(&self) {
        if let Some(cb) = self.on_connected.lock().await.as_ref() {
            cb();
        }
    }

    pub(crate) async fn disconnected(&self) {
        if let Some(cb) = self.on_disconnected.lock().await.as_ref() {
            cb();
        }
    }

    pub(crate) async fn retrying(&self, value: bool) {
        if let Some(cb) = self.on_retrying.lock().await.as_ref() {
            cb(value);
        }
    }

    pub(crate) async fn message(&self, payload: Payload) {
        if let Some(cb) = self.on_message.lock().await.as_ref() {
            cb(payload);
        }
    }

    pub(crate) async fn error(&self, err: SocketError) {
        tracing::warn!("{err}");
        if let Some(cb) = self.on_error.lock().await.as_ref() {
            cb(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn emit_without_handler_is_silent() {
        let notifier = Notifier::default();
        notifier.connected().await;
        notifier.disconnected().await;
        notifier.retrying(true).await;
        notifier.message(Payload::from("hi")).await;
        notifier.error(SocketError::NotConnected).await;
    }

    #[tokio::test]
    async fn handler_receives_event() {
        let notifier = Notifier::default();
        let hits = Arc::new(AtomicU32::new(0));
        let h = hits.clone();
        notifier
            .set_connected(Box::new(move || {
                h.fetch_add(1, Ordering::Relaxed);
            }))
            .await;

        notifier.connected().await;
        notifier.connected().await;
        assert_eq!(hits.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn registering_replaces_previous_handler() {
        let notifier = Notifier::default();
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));

        let f = first.clone();
        notifier
            .set_message(Box::new(move |_| {
                f.fetch_add(1, Ordering::Relaxed);
            }))
            .await;
        let s = second.clone();
        notifier
            .set_message(Box::new(move |_| {
                s.fetch_add(1, Ordering::Relaxed);
            }))
            .await;

        notifier.message(Payload::from("data")).await;
        assert_eq!(first.load(Ordering::Relaxed), 0, "old handler detached");
        assert_eq!(second.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn retrying_handler_sees_flag_value() {
        let notifier = Notifier::default();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let s = seen.clone();
        notifier
            .set_retrying(Box::new(move |value| {
                s.lock().unwrap().push(value);
            }))
            .await;

        notifier.retrying(true).await;
        notifier.retrying(false).await;
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }
}

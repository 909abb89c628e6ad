//! Transport seam between the manager and the socket primitive.
//!
//! The manager never touches a socket directly: it asks a [`Transport`] for
//! a [`TransportLink`] and consumes that link's [`TransportEvent`] stream.
//! Production code plugs in [`WsTransport`](crate::ws::WsTransport); tests
//! plug in a scripted mock.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SocketError;
use crate::types::Payload;

/// Notifications emitted by a transport link, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection handshake completed.
    Opened,
    /// A payload arrived from the peer.
    Message(Payload),
    /// An unsolicited transport-level error. Non-terminal by itself.
    Error(String),
    /// The connection is gone. Terminal; nothing follows it.
    Closed,
}

/// Factory for transport links.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Acquires a handle for `url` and its notification stream.
    ///
    /// Fails synchronously only when the address itself is unusable;
    /// connection failures arrive later as `Error` + `Closed` events.
    async fn open(
        &self,
        url: &str,
    ) -> Result<(Box<dyn TransportLink>, mpsc::Receiver<TransportEvent>), SocketError>;
}

/// One live connection handle.
#[async_trait]
pub trait TransportLink: Send + Sync {
    /// Queues a payload for transmission.
    async fn send(&self, payload: Payload) -> Result<(), SocketError>;

    /// Requests a close, optionally with an application status code and
    /// reason. Completion is reported via [`TransportEvent::Closed`].
    async fn close(&self, code: Option<u16>, reason: Option<String>);
}

//! Error types surfaced through the notifier.

/// Errors produced while managing the connection.
///
/// None of these are fatal to the manager; every variant is delivered
/// through the notifier's error channel instead of being returned or
/// panicking.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SocketError {
    #[error("invalid address: {0}")]
    BadAddress(String),

    #[error("socket is not connected")]
    NotConnected,

    #[error("send failed: {0}")]
    Send(String),

    #[error("transport error: {0}")]
    Transport(String),
}

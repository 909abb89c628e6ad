//! Public types for the connection manager.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection state of the managed socket.
///
/// The numeric codes match the readyState-style values hosts expect:
/// `-1` before the first open, then the usual `0..=3` progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i8)]
pub enum SocketState {
    /// No connection has been attempted yet.
    Uninitialized = -1,
    /// Transport handle acquired, handshake in progress.
    Connecting = 0,
    /// Connected and ready to communicate.
    Open = 1,
    /// A close was requested and is in progress.
    Closing = 2,
    /// The connection is closed or could not be opened.
    Closed = 3,
}

impl SocketState {
    /// Numeric code for the state, as exposed to hosts.
    pub const fn code(self) -> i8 {
        self as i8
    }
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SocketState::Uninitialized => "uninitialized",
            SocketState::Connecting => "connecting",
            SocketState::Open => "open",
            SocketState::Closing => "closing",
            SocketState::Closed => "closed",
        };
        write!(f, "{name}")
    }
}

/// A payload travelling over the socket, in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    /// An empty payload never triggers an automatic send.
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Text(s) => s.is_empty(),
            Payload::Binary(b) => b.is_empty(),
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_owned())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Payload::Binary(b)
    }
}

/// Backoff policy for automatic reconnection.
///
/// The delay doubles on every consecutive attempt and is never capped:
/// base, base×2, base×4, base×8 and so on until a connection opens or the
/// cycle is cancelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first reconnection attempt. A zero value falls
    /// back to one second.
    pub base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay for the next attempt, given how many automatic retries have
    /// already been scheduled since the last successful open.
    pub fn delay_for_attempt(&self, completed: u32) -> Duration {
        let base = if self.base.is_zero() {
            Duration::from_secs(1)
        } else {
            self.base
        };
        // Shift saturates at u64::MAX millis rather than wrapping; the
        // doubling itself is intentionally unbounded.
        let factor = 1u128 << completed.min(63);
        let millis = base.as_millis().saturating_mul(factor);
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }
}

/// Configuration for a [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Destination URL. Changing it while connected does not affect the
    /// live socket until the next open.
    pub url: String,
    /// When true, assigning a non-empty url opens the connection and
    /// assigning a non-empty message sends it.
    pub auto: bool,
    /// Suppresses automatic reconnection after connection loss.
    pub no_retry: bool,
    /// Reconnection backoff policy.
    pub retry: RetryPolicy,
}

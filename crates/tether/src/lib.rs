//! Keeps a single WebSocket connection alive on behalf of a host.
//!
//! One [`ConnectionManager`] owns one socket at a time: it opens the
//! connection, tracks its state, hands inbound payloads and errors to the
//! host through the [`Notifier`] channels, and reconnects with exponential
//! backoff when an established connection is lost unexpectedly.
//!
//! ```no_run
//! use ws_tether::{ConnectionManager, ManagerConfig};
//!
//! # async fn demo() {
//! let manager = ConnectionManager::new(ManagerConfig {
//!     url: "wss://example.test/live".into(),
//!     ..Default::default()
//! });
//! manager
//!     .notifier()
//!     .set_message(Box::new(|payload| println!("{payload:?}")))
//!     .await;
//! manager.open().await;
//! # }
//! ```

pub mod error;
pub mod manager;
pub mod notify;
pub(crate) mod pumps;
pub(crate) mod retry;
pub mod transport;
pub mod types;
pub mod ws;

pub use error::SocketError;
pub use manager::ConnectionManager;
pub use notify::{
    ConnectedHandler, DisconnectedHandler, ErrorHandler, MessageHandler, Notifier,
    RetryingHandler,
};
pub use transport::{Transport, TransportEvent, TransportLink};
pub use types::{ManagerConfig, Payload, RetryPolicy, SocketState};
pub use ws::WsTransport;

//! WebSocket transport built on `tokio-tungstenite`.
//!
//! `open` validates the address synchronously, then connects in a
//! background task. Handshake completion, inbound payloads, errors, and
//! closure all arrive on the returned [`TransportEvent`] stream.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::SocketError;
use crate::pumps;
use crate::transport::{Transport, TransportEvent, TransportLink};
use crate::types::Payload;

/// Largest frame/message accepted from the peer.
pub(crate) const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const WRITE_CHANNEL_CAPACITY: usize = 256;

/// [`Transport`] implementation over `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn open(
        &self,
        url: &str,
    ) -> Result<(Box<dyn TransportLink>, mpsc::Receiver<TransportEvent>), SocketError> {
        let request = url
            .into_client_request()
            .map_err(|e| SocketError::BadAddress(e.to_string()))?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(WRITE_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        tokio::spawn(run_connection(
            request,
            events_tx,
            write_tx.clone(),
            write_rx,
            cancel.clone(),
        ));

        Ok((Box::new(WsLink { write_tx, cancel }), events_rx))
    }
}

/// Live handle to one WebSocket connection.
struct WsLink {
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
}

#[async_trait]
impl TransportLink for WsLink {
    async fn send(&self, payload: Payload) -> Result<(), SocketError> {
        let msg = match payload {
            Payload::Text(text) => tungstenite::Message::Text(text.into()),
            Payload::Binary(bytes) => tungstenite::Message::Binary(bytes.into()),
        };
        self.write_tx
            .send(msg)
            .await
            .map_err(|_| SocketError::Send("connection is gone".into()))
    }

    async fn close(&self, code: Option<u16>, reason: Option<String>) {
        let frame = code.map(|code| CloseFrame {
            code: CloseCode::from(code),
            reason: reason.unwrap_or_default().into(),
        });
        // Queue the close frame first so the write pump flushes it, then
        // cancel so a connection stuck mid-handshake still terminates.
        let _ = self
            .write_tx
            .send(tungstenite::Message::Close(frame))
            .await;
        self.cancel.cancel();
    }
}

impl Drop for WsLink {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Connects, then runs the pumps until the connection dies. Always emits a
/// terminal [`TransportEvent::Closed`].
async fn run_connection(
    request: tungstenite::handshake::client::Request,
    events_tx: mpsc::Sender<TransportEvent>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) {
    let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
    ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
    ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);

    let connect = tokio_tungstenite::connect_async_with_config(request, Some(ws_config), false);
    let stream = tokio::select! {
        _ = cancel.cancelled() => {
            debug!("connect cancelled");
            let _ = events_tx.send(TransportEvent::Closed).await;
            return;
        }
        result = connect => match result {
            Ok((stream, _response)) => stream,
            Err(e) => {
                let _ = events_tx.send(TransportEvent::Error(e.to_string())).await;
                let _ = events_tx.send(TransportEvent::Closed).await;
                return;
            }
        },
    };

    let _ = events_tx.send(TransportEvent::Opened).await;

    let (write, read) = stream.split();
    let write_handle = tokio::spawn(pumps::write::write_pump(write, write_rx, cancel.clone()));

    pumps::read::read_pump(read, events_tx.clone(), write_tx, cancel.clone()).await;

    cancel.cancel();
    let _ = write_handle.await;
    let _ = events_tx.send(TransportEvent::Closed).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_rejects_malformed_address() {
        let result = WsTransport.open("not a url at all").await;
        assert!(matches!(result, Err(SocketError::BadAddress(_))));
    }

    #[tokio::test]
    async fn unreachable_host_reports_error_then_closed() {
        // Port 1 on localhost refuses immediately.
        let (_link, mut events) = WsTransport.open("ws://127.0.0.1:1").await.unwrap();
        let first = events.recv().await.unwrap();
        assert!(matches!(first, TransportEvent::Error(_)));
        let second = events.recv().await.unwrap();
        assert_eq!(second, TransportEvent::Closed);
    }

    #[tokio::test]
    async fn closing_mid_handshake_emits_closed() {
        // A bound listener that never accepts keeps the handshake pending.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (link, mut events) = WsTransport.open(&format!("ws://{addr}")).await.unwrap();
        link.close(None, None).await;

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
            .await
            .expect("closed event should arrive")
            .unwrap();
        // Depending on how far the handshake got, an error may precede the
        // terminal Closed.
        match event {
            TransportEvent::Closed => {}
            TransportEvent::Error(_) => {
                assert_eq!(events.recv().await.unwrap(), TransportEvent::Closed);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}

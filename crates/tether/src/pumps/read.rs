//! WebSocket read pump, turning inbound frames into transport events.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::transport::TransportEvent;
use crate::types::Payload;

/// Reads frames until the connection dies, forwarding payloads and errors.
///
/// Control frames are handled here: pings are answered, a close frame ends
/// the pump. The terminal `Closed` event is emitted by the caller once the
/// pump returns.
pub(crate) async fn read_pump<S>(
    mut read: S,
    events_tx: mpsc::Sender<TransportEvent>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = read.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        trace!(len = text.len(), "text frame");
                        let payload = Payload::Text(text.as_str().to_owned());
                        let _ = events_tx.send(TransportEvent::Message(payload)).await;
                    }
                    Some(Ok(tungstenite::Message::Binary(bytes))) => {
                        trace!(len = bytes.len(), "binary frame");
                        let payload = Payload::Binary(bytes.to_vec());
                        let _ = events_tx.send(TransportEvent::Message(payload)).await;
                    }
                    Some(Ok(tungstenite::Message::Ping(data))) => {
                        trace!("received ping, sending pong");
                        let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                    }
                    Some(Ok(tungstenite::Message::Pong(_))) => {
                        trace!("received pong");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        debug!(?frame, "received close frame");
                        break;
                    }
                    Some(Ok(_)) => {} // Raw frames are not surfaced.
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        let _ = events_tx.send(TransportEvent::Error(e.to_string())).await;
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn channels() -> (
        mpsc::Sender<TransportEvent>,
        mpsc::Receiver<TransportEvent>,
        mpsc::Sender<tungstenite::Message>,
        mpsc::Receiver<tungstenite::Message>,
    ) {
        let (events_tx, events_rx) = mpsc::channel(16);
        let (write_tx, write_rx) = mpsc::channel(16);
        (events_tx, events_rx, write_tx, write_rx)
    }

    #[tokio::test]
    async fn forwards_text_and_binary_payloads() {
        let (events_tx, mut events_rx, write_tx, _write_rx) = channels();
        let frames: Vec<Result<tungstenite::Message, tungstenite::Error>> = vec![
            Ok(tungstenite::Message::Text("hello".into())),
            Ok(tungstenite::Message::Binary(vec![1u8, 2, 3].into())),
        ];
        let read = stream::iter(frames);

        read_pump(read, events_tx, write_tx, CancellationToken::new()).await;

        assert_eq!(
            events_rx.recv().await.unwrap(),
            TransportEvent::Message(Payload::Text("hello".into()))
        );
        assert_eq!(
            events_rx.recv().await.unwrap(),
            TransportEvent::Message(Payload::Binary(vec![1, 2, 3]))
        );
    }

    #[tokio::test]
    async fn answers_ping_with_pong() {
        let (events_tx, _events_rx, write_tx, mut write_rx) = channels();
        let frames: Vec<Result<tungstenite::Message, tungstenite::Error>> =
            vec![Ok(tungstenite::Message::Ping(vec![7u8].into()))];
        let read = stream::iter(frames);

        read_pump(read, events_tx, write_tx, CancellationToken::new()).await;

        let reply = write_rx.recv().await.unwrap();
        assert!(matches!(reply, tungstenite::Message::Pong(_)));
    }

    #[tokio::test]
    async fn close_frame_ends_pump_without_message_event() {
        let (events_tx, mut events_rx, write_tx, _write_rx) = channels();
        let frames: Vec<Result<tungstenite::Message, tungstenite::Error>> =
            vec![Ok(tungstenite::Message::Close(None))];
        let read = stream::iter(frames);

        read_pump(read, events_tx, write_tx, CancellationToken::new()).await;

        assert!(events_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn read_error_is_surfaced() {
        let (events_tx, mut events_rx, write_tx, _write_rx) = channels();
        let frames: Vec<Result<tungstenite::Message, tungstenite::Error>> =
            vec![Err(tungstenite::Error::ConnectionClosed)];
        let read = stream::iter(frames);

        read_pump(read, events_tx, write_tx, CancellationToken::new()).await;

        assert!(matches!(
            events_rx.recv().await.unwrap(),
            TransportEvent::Error(_)
        ));
    }

    #[tokio::test]
    async fn cancellation_stops_a_silent_stream() {
        let (events_tx, _events_rx, write_tx, _write_rx) = channels();
        let read = stream::pending::<Result<tungstenite::Message, tungstenite::Error>>();
        let cancel = CancellationToken::new();

        let c = cancel.clone();
        let handle = tokio::spawn(async move {
            read_pump(Box::pin(read), events_tx, write_tx, c).await;
        });

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");
    }
}

//! Connection lifecycle internals: shared context, the per-link event pump,
//! and reconnect scheduling with exponential backoff.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use tokio::sync::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SocketError;
use crate::notify::Notifier;
use crate::transport::{Transport, TransportEvent, TransportLink};
use crate::types::{Payload, RetryPolicy, SocketState};

/// Shared state passed to free functions for link setup, event handling,
/// and reconnection. Avoids threading a dozen separate Arc parameters.
#[derive(Clone)]
pub(crate) struct ManagerContext {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) url: Arc<RwLock<String>>,
    pub(crate) message: Arc<Mutex<Option<Payload>>>,
    pub(crate) auto: Arc<AtomicBool>,
    pub(crate) no_retry: Arc<AtomicBool>,
    pub(crate) retry: RetryPolicy,
    pub(crate) state: Arc<RwLock<SocketState>>,
    pub(crate) link: Arc<Mutex<Option<Box<dyn TransportLink>>>>,
    /// Set only by an explicit `close()` call; cleared on every `open()`.
    pub(crate) manual_close: Arc<AtomicBool>,
    pub(crate) retrying: Arc<AtomicBool>,
    pub(crate) retry_count: Arc<AtomicU32>,
    /// Cancel token for the pending reconnect timer, if any.
    pub(crate) retry_cancel: Arc<std::sync::Mutex<Option<CancellationToken>>>,
    /// Cancel token for the current link's event pump.
    pub(crate) pump_cancel: Arc<std::sync::Mutex<Option<CancellationToken>>>,
    /// Connection generation; fences events from replaced links.
    pub(crate) epoch: Arc<AtomicU64>,
    /// Serialises open/close so a timer-fired reopen cannot interleave
    /// with a host-initiated one.
    pub(crate) gate: Arc<Mutex<()>>,
    pub(crate) notifier: Notifier,
}

/// Cancels the pending reconnect timer, if one exists.
pub(crate) fn cancel_pending_retry(
    retry_cancel: &std::sync::Mutex<Option<CancellationToken>>,
) {
    if let Ok(mut guard) = retry_cancel.lock()
        && let Some(token) = guard.take()
    {
        token.cancel();
    }
}

/// Updates the retrying flag, notifying the host only on actual change.
pub(crate) async fn set_retrying(ctx: &ManagerContext, value: bool) {
    if ctx.retrying.swap(value, Ordering::Relaxed) != value {
        debug!(retrying = value, "retrying flag changed");
        ctx.notifier.retrying(value).await;
    }
}

/// Replaces the socket state, returning the previous one.
pub(crate) async fn set_state(ctx: &ManagerContext, next: SocketState) -> SocketState {
    let mut state = ctx.state.write().await;
    let prev = *state;
    *state = next;
    if prev != next {
        debug!(from = %prev, to = %next, "socket state changed");
    }
    prev
}

/// Opens a fresh link for the configured url.
///
/// Resets prior connection resources first: the pending reconnect timer is
/// cancelled, the previous link's event pump is detached, the previous link
/// is force-closed, and the manual-close flag is cleared. A failure to
/// acquire the handle surfaces as an error notification and leaves `state`
/// untouched.
pub(crate) fn open_link<'a>(
    ctx: &'a ManagerContext,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
    let _gate = ctx.gate.lock().await;
    cancel_pending_retry(&ctx.retry_cancel);
    if let Ok(mut guard) = ctx.pump_cancel.lock()
        && let Some(token) = guard.take()
    {
        token.cancel();
    }
    if let Some(old) = ctx.link.lock().await.take() {
        debug!("closing previous link");
        old.close(None, None).await;
    }
    ctx.manual_close.store(false, Ordering::Relaxed);

    // Anything still in flight from an older link is now stale.
    let epoch = ctx.epoch.fetch_add(1, Ordering::Relaxed) + 1;

    let url = ctx.url.read().await.clone();
    match ctx.transport.open(&url).await {
        Ok((link, events)) => {
            *ctx.link.lock().await = Some(link);
            set_state(ctx, SocketState::Connecting).await;
            info!(%url, "connecting");

            let cancel = CancellationToken::new();
            if let Ok(mut guard) = ctx.pump_cancel.lock() {
                *guard = Some(cancel.clone());
            }
            tokio::spawn(event_pump(events, epoch, cancel, ctx.clone()));
        }
        Err(e) => {
            warn!(%url, error = %e, "failed to acquire transport handle");
            ctx.notifier.error(e).await;
        }
    }
    })
}

/// Processes one link's notifications to completion, in emission order.
pub(crate) async fn event_pump(
    mut events: mpsc::Receiver<TransportEvent>,
    epoch: u64,
    cancel: CancellationToken,
    ctx: ManagerContext,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let terminal = event == TransportEvent::Closed;
        handle_event(event, epoch, &ctx).await;
        if terminal {
            break;
        }
    }
}

async fn handle_event(event: TransportEvent, epoch: u64, ctx: &ManagerContext) {
    if ctx.epoch.load(Ordering::Relaxed) != epoch {
        debug!(?event, "dropping event from replaced link");
        return;
    }

    match event {
        TransportEvent::Opened => {
            set_state(ctx, SocketState::Open).await;
            ctx.retry_count.store(0, Ordering::Relaxed);
            set_retrying(ctx, false).await;
            info!("connected");
            ctx.notifier.connected().await;
        }
        TransportEvent::Message(payload) => {
            ctx.notifier.message(payload).await;
        }
        TransportEvent::Error(cause) => {
            ctx.notifier.error(SocketError::Transport(cause)).await;
        }
        TransportEvent::Closed => {
            let prev = set_state(ctx, SocketState::Closed).await;
            ctx.link.lock().await.take();
            info!("disconnected");
            ctx.notifier.disconnected().await;

            let manual = ctx.manual_close.load(Ordering::Relaxed);
            let suppressed = ctx.no_retry.load(Ordering::Relaxed);
            // Only a connection that actually reached OPEN starts a retry
            // cycle; an already-running cycle keeps going when an attempt
            // dies before opening.
            let recoverable =
                prev == SocketState::Open || ctx.retrying.load(Ordering::Relaxed);

            if !manual && !suppressed && recoverable {
                schedule_retry(ctx).await;
            } else {
                set_retrying(ctx, false).await;
            }
        }
    }
}

/// Schedules the next automatic reconnect attempt.
///
/// Delay is the backoff base doubled once per retry already attempted since
/// the last successful open; the counter increments after the delay is
/// computed. The one-shot timer owns a cancel token recorded in the context
/// so `open()`, `close()`, and no-retry suppression can stop it.
pub(crate) async fn schedule_retry(ctx: &ManagerContext) {
    let completed = ctx.retry_count.load(Ordering::Relaxed);
    let delay = ctx.retry.delay_for_attempt(completed);
    ctx.retry_count.store(completed + 1, Ordering::Relaxed);
    set_retrying(ctx, true).await;

    cancel_pending_retry(&ctx.retry_cancel);
    let cancel = CancellationToken::new();
    if let Ok(mut guard) = ctx.retry_cancel.lock() {
        *guard = Some(cancel.clone());
    }

    info!(
        attempt = completed + 1,
        delay_ms = delay.as_millis() as u64,
        "scheduling reconnect"
    );

    let ctx = ctx.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("reconnect cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
        // The timer has fired; it no longer needs its own cancellation.
        if let Ok(mut guard) = ctx.retry_cancel.lock() {
            guard.take();
        }
        open_link(&ctx).await;
    });
}

//! Hub: negotiation, connection loop and registry bookkeeping.
//!
//! DESIGN
//! ======
//! The hub owns everything shared between connections: the negotiation
//! config, the registry, the default handler list and the shutdown token.
//! `Hub` is a cheap `Arc` clone handed to every route and task.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade request → reject if ineligible, else negotiate and accept
//! 2. Wrap the write half in a `Connection`, install handlers, register it
//! 3. Loop: read frame → reassemble → decode (raw bytes on failure) → run
//!    handlers in order
//! 4. Peer close → ack (mirroring the peer's reason) → exit
//! 5. Transport error → mark closed → exit
//! 6. Shutdown → close with 1001 → exit
//! 7. Every exit → handlers' `on_close` → deregister
//!
//! Deregistration is tied to a drop guard, so a connection leaves the
//! registry exactly once on every exit path, including task abort.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use frames::{CLOSE_GOING_AWAY, CLOSE_MESSAGE_TOO_BIG, CloseReason, Event, Message, Reassembler, ReassemblyError};
use futures::FutureExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::connection::{Connection, ConnectionId, SendError};
use crate::handler::{EchoHandler, HandlerError, HandlerRef};
use crate::negotiate::{Selection, resolve};
use crate::registry::Registry;
use crate::transport::{Accepted, TransportError, UpgradeRequest};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    /// The request does not ask for a websocket upgrade.
    #[error("request is not a websocket upgrade")]
    Ineligible,
    #[error("upgrade failed: {0}")]
    Accept(#[source] TransportError),
}

/// How a connection ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum CloseKind {
    /// The peer sent a close frame.
    Peer(Option<CloseReason>),
    /// The transport failed or disconnected without a close handshake.
    Abrupt,
    /// The hub was shut down.
    Shutdown,
    /// The hub closed the connection after a protocol violation.
    Protocol(CloseReason),
}

/// Per-connection counters returned when the loop exits.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    pub id: ConnectionId,
    pub subprotocol: String,
    pub negotiated: bool,
    /// Complete messages reassembled.
    pub messages: u64,
    /// Messages the subprotocol refused to decode. They are still
    /// dispatched with their raw bytes.
    pub decode_failures: u64,
    /// Handler invocations that returned an error or panicked.
    pub handler_failures: u64,
    pub close: CloseKind,
}

// =============================================================================
// HUB
// =============================================================================

#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    config: HubConfig,
    registry: Arc<Registry>,
    handlers: Vec<HandlerRef>,
    shutdown: CancellationToken,
}

impl Hub {
    /// Hub that echoes every message back to its sender.
    #[must_use]
    pub fn new(config: HubConfig, registry: Arc<Registry>) -> Self {
        Self::with_handlers(config, registry, Vec::new())
    }

    /// Hub that installs `handlers` on every connection. An empty list falls
    /// back to [`EchoHandler`].
    #[must_use]
    pub fn with_handlers(config: HubConfig, registry: Arc<Registry>, handlers: Vec<HandlerRef>) -> Self {
        let handlers = if handlers.is_empty() { vec![Arc::new(EchoHandler) as HandlerRef] } else { handlers };
        Self {
            inner: Arc::new(HubInner { config, registry, handlers, shutdown: CancellationToken::new() }),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Pick the descriptor for a client offer, falling back to the default.
    #[must_use]
    pub fn negotiate<S: AsRef<str>>(&self, offered: &[S]) -> Selection {
        let config = &self.inner.config;
        resolve(offered, &config.supported, &config.default)
    }

    /// Upgrade `request` and serve it until the connection ends.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::Ineligible`] for non-upgrade requests, without
    /// creating a connection, and [`HandleError::Accept`] when the handshake
    /// fails.
    pub async fn handle<R: UpgradeRequest>(&self, request: R) -> Result<ConnectionSummary, HandleError> {
        if !request.is_upgrade() {
            return Err(HandleError::Ineligible);
        }

        let selection = self.negotiate(&request.offered_subprotocols());
        let accepted = request
            .accept(selection.header_value().map(str::to_owned))
            .await
            .map_err(HandleError::Accept)?;

        Ok(self.run(accepted, selection).await)
    }

    /// Serve an already-accepted transport until it closes.
    pub async fn run(&self, accepted: Accepted, selection: Selection) -> ConnectionSummary {
        let Accepted { mut source, sink } = accepted;
        let connection = Arc::new(Connection::new(selection.descriptor, sink));
        for handler in &self.inner.handlers {
            connection.add_handler(handler.clone());
        }

        let registration = Registration::new(&self.inner.registry, connection.clone());
        let mut reassembler = match self.inner.config.max_message_bytes {
            Some(limit) => Reassembler::with_limit(limit),
            None => Reassembler::new(),
        };
        let mut summary = ConnectionSummary {
            id: connection.id(),
            subprotocol: connection.subprotocol().name().to_owned(),
            negotiated: selection.negotiated,
            messages: 0,
            decode_failures: 0,
            handler_failures: 0,
            close: CloseKind::Abrupt,
        };

        info!(
            conn_id = %summary.id,
            subprotocol = %summary.subprotocol,
            negotiated = summary.negotiated,
            "ws: connection opened"
        );

        let close = loop {
            let frame = tokio::select! {
                biased;
                () = self.inner.shutdown.cancelled() => {
                    send_close(&connection, Some(CloseReason::new(CLOSE_GOING_AWAY, "server shutting down"))).await;
                    break CloseKind::Shutdown;
                }
                frame = source.read_frame() => frame,
            };

            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(conn_id = %summary.id, error = %e, "ws: transport read ended");
                    connection.mark_closed();
                    break CloseKind::Abrupt;
                }
            };

            match reassembler.push(frame) {
                Ok(Event::Pending) => {}
                Ok(Event::Message(message)) => dispatch(&connection, message, &mut summary).await,
                Ok(Event::Closed { reason, discarded }) => {
                    if discarded > 0 {
                        debug!(conn_id = %summary.id, discarded, "ws: dropped partial message on close");
                    }
                    send_close(&connection, reason.clone()).await;
                    break CloseKind::Peer(reason);
                }
                Err(ReassemblyError::MessageTooLarge { limit, size }) => {
                    warn!(conn_id = %summary.id, limit, size, "ws: inbound message too large");
                    let reason = CloseReason::new(CLOSE_MESSAGE_TOO_BIG, "message too big");
                    send_close(&connection, Some(reason.clone())).await;
                    break CloseKind::Protocol(reason);
                }
                Err(ReassemblyError::Closed) => {
                    connection.mark_closed();
                    break CloseKind::Abrupt;
                }
            }
        };

        summary.close = close;
        for handler in connection.handlers() {
            handler.on_close(&connection).await;
        }
        drop(registration);
        info!(
            conn_id = %summary.id,
            messages = summary.messages,
            decode_failures = summary.decode_failures,
            handler_failures = summary.handler_failures,
            close = ?summary.close,
            "ws: connection closed"
        );
        summary
    }

    /// Close every live connection with 1001 and stop their loops.
    pub fn shutdown(&self) {
        info!(connections = self.inner.registry.len(), "ws: hub shutting down");
        self.inner.shutdown.cancel();
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

// =============================================================================
// LOOP HELPERS
// =============================================================================

/// Keeps a connection in the registry for as long as it is alive.
///
/// Only removes the entry it added; if the id was already present the guard
/// is inert and the existing entry is left alone.
struct Registration {
    registry: Arc<Registry>,
    id: ConnectionId,
    armed: bool,
}

impl Registration {
    fn new(registry: &Arc<Registry>, connection: Arc<Connection>) -> Self {
        let id = connection.id();
        let armed = registry.add(connection);
        if !armed {
            warn!(conn_id = %id, "ws: connection id already registered");
        }
        Self { registry: registry.clone(), id, armed }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.armed {
            self.registry.remove(&self.id);
        }
    }
}

/// Decode one message and hand it to every handler in order. A payload the
/// subprotocol rejects is dispatched as received.
async fn dispatch(connection: &Arc<Connection>, message: Message, summary: &mut ConnectionSummary) {
    summary.messages += 1;

    let message = match connection.subprotocol().decode(&message.payload) {
        Ok(payload) => Message { opcode: message.opcode, payload },
        Err(e) => {
            summary.decode_failures += 1;
            warn!(conn_id = %summary.id, subprotocol = %summary.subprotocol, error = %e, "ws: undecodable message, dispatching raw bytes");
            message
        }
    };

    for handler in connection.handlers() {
        let outcome = AssertUnwindSafe(handler.on_message(connection, &message))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(panic.as_ref()))));

        if let Err(e) = outcome {
            summary.handler_failures += 1;
            warn!(conn_id = %summary.id, handler = handler.name(), error = %e, "ws: handler failed");
        }
    }
}

async fn send_close(connection: &Connection, reason: Option<CloseReason>) {
    match connection.close(reason).await {
        Ok(_) => {}
        Err(SendError::Transport(TransportError::Closed | TransportError::Disconnected)) => {
            debug!(conn_id = %connection.id(), "ws: transport gone before close frame");
        }
        Err(e) => warn!(conn_id = %connection.id(), error = %e, "ws: close frame failed"),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod tests;

//! Receive handlers.
//!
//! DESIGN
//! ======
//! Every complete inbound message is handed to the connection's handlers in
//! registration order. Handlers run inside the connection loop, so anything
//! long-running must be spawned rather than awaited inline; a slow handler
//! delays the close handshake.
//!
//! When the application installs no handler, [`EchoHandler`] is installed so
//! each message goes straight back to its sender.
//!
//! [`BroadcastHandler`] keeps fan-out off the read loop: each sender gets a
//! relay task fed through an unbounded channel, so a peer with a stuck
//! transport delays that relay but never the sender's own loop. Messages
//! from one sender reach every peer in the order they were received.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use frames::{Frame, Message};
use tokio::sync::mpsc;
use tracing::debug;

use crate::connection::{Connection, ConnectionId, SendError};
use crate::registry::Registry;

/// Shared handle to a handler.
pub type HandlerRef = Arc<dyn ReceiveHandler>;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("handler failed: {0}")]
    Failed(String),
    #[error("handler panicked: {0}")]
    Panicked(String),
    #[error("handler send failed: {0}")]
    Send(#[from] SendError),
}

/// Callback invoked with each reassembled message. The payload is the
/// subprotocol's decoded form, or the raw bytes when decoding failed.
#[async_trait]
pub trait ReceiveHandler: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    async fn on_message(&self, connection: &Arc<Connection>, message: &Message) -> Result<(), HandlerError>;

    /// Called once when the connection loop exits, before deregistration.
    async fn on_close(&self, _connection: &Arc<Connection>) {}
}

// =============================================================================
// ECHO
// =============================================================================

/// Sends every message back to the connection it came from, byte for byte
/// and with the opcode it arrived on.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

#[async_trait]
impl ReceiveHandler for EchoHandler {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn on_message(&self, connection: &Arc<Connection>, message: &Message) -> Result<(), HandlerError> {
        let frame = Frame::Data { opcode: message.opcode, payload: message.payload.clone(), is_final: true };
        connection.send_frame(frame).await?;
        Ok(())
    }
}

// =============================================================================
// BROADCAST
// =============================================================================

/// Relays every message to all other live connections in a registry.
///
/// Peers that close mid-broadcast are skipped; the sender is never echoed.
#[derive(Debug)]
pub struct BroadcastHandler {
    registry: Arc<Registry>,
    relays: DashMap<ConnectionId, mpsc::UnboundedSender<Vec<u8>>>,
}

impl BroadcastHandler {
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry, relays: DashMap::new() }
    }

    /// Relay queue for `sender`, spawning its task on first use.
    fn relay(&self, sender: ConnectionId) -> mpsc::UnboundedSender<Vec<u8>> {
        self.relays
            .entry(sender)
            .or_insert_with(|| {
                let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
                let registry = self.registry.clone();
                tokio::spawn(async move {
                    while let Some(payload) = rx.recv().await {
                        let delivered = registry.broadcast(&payload, Some(sender)).await;
                        debug!(conn_id = %sender, delivered, "ws: broadcast relayed");
                    }
                });
                tx
            })
            .clone()
    }
}

#[async_trait]
impl ReceiveHandler for BroadcastHandler {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    async fn on_message(&self, connection: &Arc<Connection>, message: &Message) -> Result<(), HandlerError> {
        self.relay(connection.id())
            .send(message.payload.clone())
            .map_err(|_| HandlerError::Failed("broadcast relay stopped".into()))
    }

    /// Drops the sender's queue; its relay drains what is left and exits.
    async fn on_close(&self, connection: &Arc<Connection>) {
        self.relays.remove(&connection.id());
    }
}

#[cfg(test)]
#[path = "handler_test.rs"]
mod tests;

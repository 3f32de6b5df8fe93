//! Connection entity: one accepted transport plus its negotiated protocol.
//!
//! DESIGN
//! ======
//! A `Connection` is created by the hub's loop once the upgrade completes and
//! is shared as `Arc<Connection>` with the registry and with handlers. The
//! loop keeps the read half; the write half lives here behind an async mutex
//! so echo replies, broadcasts and close acknowledgements never have two
//! writes in flight on the same transport.
//!
//! The closed flag is checked under the send lock, so once a close frame has
//! been written no data frame can follow it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use frames::{CloseReason, Frame};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::handler::HandlerRef;
use crate::subprotocol::{SubprotocolError, SubprotocolRef};
use crate::transport::{FrameSink, TransportError};

/// Unique connection identifier.
pub type ConnectionId = Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The connection was closed before the send.
    #[error("connection closed")]
    Closed,
    #[error("payload rejected by subprotocol: {0}")]
    Encode(#[from] SubprotocolError),
    #[error("transport write failed: {0}")]
    Transport(#[from] TransportError),
}

pub struct Connection {
    id: ConnectionId,
    subprotocol: SubprotocolRef,
    sink: Mutex<Box<dyn FrameSink>>,
    handlers: RwLock<Vec<HandlerRef>>,
    closed: AtomicBool,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("subprotocol", &self.subprotocol.name())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap the write half of an accepted transport.
    pub fn new(subprotocol: SubprotocolRef, sink: Box<dyn FrameSink>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subprotocol,
            sink: Mutex::new(sink),
            handlers: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn subprotocol(&self) -> &SubprotocolRef {
        &self.subprotocol
    }

    /// Append a receive handler. Handlers run in the order they were added.
    pub fn add_handler(&self, handler: HandlerRef) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    /// Snapshot of the installed handlers.
    #[must_use]
    pub fn handlers(&self) -> Vec<HandlerRef> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Encode `payload` through the subprotocol and write it as one message.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Closed`] after close, [`SendError::Encode`] when
    /// the subprotocol rejects the payload, and [`SendError::Transport`] when
    /// the write fails.
    pub async fn send(&self, payload: &[u8]) -> Result<(), SendError> {
        let encoded = self.subprotocol.encode(payload)?;
        let frame = Frame::Data { opcode: self.subprotocol.opcode(), payload: encoded, is_final: true };
        self.send_frame(frame).await
    }

    /// Write a raw data frame, bypassing the subprotocol encoder.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::send`] minus encoding.
    pub async fn send_frame(&self, frame: Frame) -> Result<(), SendError> {
        let mut sink = self.sink.lock().await;
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        sink.write_frame(frame).await?;
        Ok(())
    }

    /// Send a close frame and refuse further sends.
    ///
    /// Returns `Ok(false)` without writing if the connection was already
    /// closed, `Ok(true)` once the close frame has been written.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Transport`] when writing the close frame fails.
    /// The connection counts as closed either way.
    pub async fn close(&self, reason: Option<CloseReason>) -> Result<bool, SendError> {
        let mut sink = self.sink.lock().await;
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        sink.close(reason).await?;
        Ok(true)
    }

    /// Flag the connection closed without writing anything. Used when the
    /// transport is already gone.
    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;

#[cfg(test)]
pub mod test_helpers {
    use std::sync::Arc;

    use super::*;
    use crate::subprotocol::TextSubprotocol;
    use crate::transport::test_helpers::RecordingSink;

    /// A text connection over a recording sink. Returns the sink for assertions.
    #[must_use]
    pub fn text_connection() -> (Arc<Connection>, RecordingSink) {
        let sink = RecordingSink::new();
        let connection = Connection::new(Arc::new(TextSubprotocol), Box::new(sink.clone()));
        (Arc::new(connection), sink)
    }
}

//! Transport capability consumed by the hub.
//!
//! DESIGN
//! ======
//! The host performs the upgrade handshake and hands the hub a duplex frame
//! stream already split in two halves:
//! - [`FrameSource`] is owned by the connection loop. Only the loop reads, so
//!   reads on one transport are strictly sequential.
//! - [`FrameSink`] is owned by the [`Connection`](crate::connection::Connection)
//!   behind its send lock, so concurrent senders never interleave writes.
//!
//! [`UpgradeRequest`] is the pull-style entry used by
//! [`Hub::handle`](crate::hub::Hub::handle). Hosts with a callback-style
//! upgrade (axum) call the negotiation and loop pieces directly.

use async_trait::async_trait;
use frames::{CloseReason, Frame};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer went away without a close handshake.
    #[error("transport disconnected")]
    Disconnected,
    /// The transport has already been closed locally.
    #[error("transport closed")]
    Closed,
    /// Underlying I/O or protocol failure.
    #[error("transport i/o failed: {0}")]
    Io(String),
}

/// Read half of an accepted transport.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next frame.
    async fn read_frame(&mut self) -> Result<Frame, TransportError>;
}

/// Write half of an accepted transport.
#[async_trait]
pub trait FrameSink: Send {
    async fn write_frame(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Send a close frame. Implementations may also shut the write side.
    async fn close(&mut self, reason: Option<CloseReason>) -> Result<(), TransportError> {
        self.write_frame(Frame::Close(reason)).await
    }
}

/// Both halves of an accepted transport.
pub struct Accepted {
    pub source: Box<dyn FrameSource>,
    pub sink: Box<dyn FrameSink>,
}

impl Accepted {
    pub fn new(source: impl FrameSource + 'static, sink: impl FrameSink + 'static) -> Self {
        Self { source: Box::new(source), sink: Box::new(sink) }
    }
}

/// An inbound request that may be upgraded to a frame transport.
#[async_trait]
pub trait UpgradeRequest: Send + Sized {
    /// Whether the request asks for an upgrade at all.
    fn is_upgrade(&self) -> bool;

    /// Subprotocol names offered by the client, in the client's order.
    fn offered_subprotocols(&self) -> Vec<String>;

    /// Complete the upgrade, advertising `subprotocol` if one was negotiated.
    async fn accept(self, subprotocol: Option<String>) -> Result<Accepted, TransportError>;
}

// =============================================================================
// TEST HELPERS
// =============================================================================

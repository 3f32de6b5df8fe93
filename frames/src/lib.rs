//! Shared frame model and reassembly state machine for the hub transport.
//!
//! This crate owns the wire-level vocabulary used by the hub: a [`Frame`] is
//! one unit read from or written to a transport, a [`Message`] is what a
//! [`Reassembler`] produces once every fragment of a logical message has
//! arrived. Nothing here performs I/O.

mod reassembler;

pub use reassembler::{Event, Reassembler, ReassemblyError};

use serde::{Deserialize, Serialize};

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint is going away (server shutdown).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Peer sent a message the endpoint cannot accept.
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;
/// Message exceeded the configured size limit.
pub const CLOSE_MESSAGE_TOO_BIG: u16 = 1009;

/// Payload interpretation carried on data frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Opcode {
    /// UTF-8 text payload.
    Text,
    /// Opaque binary payload.
    Binary,
}

/// Status code and description carried by a close frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self { code, reason: reason.into() }
    }

    /// Normal closure with an empty description.
    #[must_use]
    pub fn normal() -> Self {
        Self::new(CLOSE_NORMAL, "")
    }
}

/// A single unit on the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A data chunk. `is_final` marks the last chunk of a message.
    Data {
        opcode: Opcode,
        payload: Vec<u8>,
        is_final: bool,
    },
    /// Close handshake frame, optionally carrying a status.
    Close(Option<CloseReason>),
}

impl Frame {
    /// A complete (single-fragment) text frame.
    #[must_use]
    pub fn text(payload: impl Into<Vec<u8>>) -> Self {
        Self::Data { opcode: Opcode::Text, payload: payload.into(), is_final: true }
    }

    /// A complete (single-fragment) binary frame.
    #[must_use]
    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Self::Data { opcode: Opcode::Binary, payload: payload.into(), is_final: true }
    }

    /// One fragment of a larger message.
    #[must_use]
    pub fn fragment(opcode: Opcode, payload: impl Into<Vec<u8>>, is_final: bool) -> Self {
        Self::Data { opcode, payload: payload.into(), is_final }
    }

    /// A close frame with a status.
    #[must_use]
    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Self::Close(Some(CloseReason::new(code, reason)))
    }

    #[must_use]
    pub fn is_close(&self) -> bool {
        matches!(self, Self::Close(_))
    }
}

/// A fully reassembled application message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Opcode of the first fragment.
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

impl Message {
    #[must_use]
    pub fn new(opcode: Opcode, payload: impl Into<Vec<u8>>) -> Self {
        Self { opcode, payload: payload.into() }
    }

    /// Payload as UTF-8, if it is valid UTF-8.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;

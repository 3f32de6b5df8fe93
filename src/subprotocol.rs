//! Subprotocol descriptors.
//!
//! DESIGN
//! ======
//! A descriptor names one application protocol and knows how to interpret
//! inbound payloads and produce outbound ones. Descriptors are immutable once
//! handed to [`HubConfig`](crate::config::HubConfig) and shared between
//! connections as `Arc<dyn Subprotocol>`.
//!
//! Three descriptors ship with the crate. Applications register their own by
//! implementing [`Subprotocol`].

use std::fmt;
use std::sync::Arc;

use frames::Opcode;

pub const TEXT_SUBPROTOCOL: &str = "wshub.text";
pub const JSON_SUBPROTOCOL: &str = "wshub.json";
pub const BINARY_SUBPROTOCOL: &str = "wshub.binary";

/// Shared handle to a descriptor.
pub type SubprotocolRef = Arc<dyn Subprotocol>;

#[derive(Debug, thiserror::Error)]
pub enum SubprotocolError {
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// One negotiable application protocol.
pub trait Subprotocol: Send + Sync + fmt::Debug {
    /// Name as it appears in `Sec-WebSocket-Protocol`.
    fn name(&self) -> &str;

    /// Opcode used for outbound data frames.
    fn opcode(&self) -> Opcode;

    /// Validate or transform an inbound message payload. The hub still
    /// dispatches the raw bytes when this fails.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload does not conform to this protocol.
    fn decode(&self, payload: &[u8]) -> Result<Vec<u8>, SubprotocolError>;

    /// Produce the wire payload for an outbound message.
    ///
    /// # Errors
    ///
    /// Returns an error when `payload` cannot be represented in this protocol.
    fn encode(&self, payload: &[u8]) -> Result<Vec<u8>, SubprotocolError>;
}

/// Look up a built-in descriptor by name.
#[must_use]
pub fn builtin(name: &str) -> Option<SubprotocolRef> {
    match name {
        TEXT_SUBPROTOCOL => Some(Arc::new(TextSubprotocol)),
        JSON_SUBPROTOCOL => Some(Arc::new(JsonSubprotocol)),
        BINARY_SUBPROTOCOL => Some(Arc::new(BinarySubprotocol)),
        _ => None,
    }
}

// =============================================================================
// TEXT
// =============================================================================

/// UTF-8 text; payloads pass through unchanged once validated.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextSubprotocol;

impl Subprotocol for TextSubprotocol {
    fn name(&self) -> &str {
        TEXT_SUBPROTOCOL
    }

    fn opcode(&self) -> Opcode {
        Opcode::Text
    }

    fn decode(&self, payload: &[u8]) -> Result<Vec<u8>, SubprotocolError> {
        std::str::from_utf8(payload).map_err(|_| SubprotocolError::InvalidUtf8)?;
        Ok(payload.to_vec())
    }

    fn encode(&self, payload: &[u8]) -> Result<Vec<u8>, SubprotocolError> {
        std::str::from_utf8(payload).map_err(|_| SubprotocolError::InvalidUtf8)?;
        Ok(payload.to_vec())
    }
}

// =============================================================================
// JSON
// =============================================================================

/// JSON documents over text frames.
///
/// Inbound payloads must parse. Outbound payloads that already parse are sent
/// as-is; any other UTF-8 text is sent as a JSON string.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSubprotocol;

impl Subprotocol for JsonSubprotocol {
    fn name(&self) -> &str {
        JSON_SUBPROTOCOL
    }

    fn opcode(&self) -> Opcode {
        Opcode::Text
    }

    fn decode(&self, payload: &[u8]) -> Result<Vec<u8>, SubprotocolError> {
        serde_json::from_slice::<serde::de::IgnoredAny>(payload)?;
        Ok(payload.to_vec())
    }

    fn encode(&self, payload: &[u8]) -> Result<Vec<u8>, SubprotocolError> {
        if serde_json::from_slice::<serde::de::IgnoredAny>(payload).is_ok() {
            return Ok(payload.to_vec());
        }
        let text = std::str::from_utf8(payload).map_err(|_| SubprotocolError::InvalidUtf8)?;
        Ok(serde_json::to_vec(text)?)
    }
}

// =============================================================================
// BINARY
// =============================================================================

/// Opaque bytes over binary frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinarySubprotocol;

impl Subprotocol for BinarySubprotocol {
    fn name(&self) -> &str {
        BINARY_SUBPROTOCOL
    }

    fn opcode(&self) -> Opcode {
        Opcode::Binary
    }

    fn decode(&self, payload: &[u8]) -> Result<Vec<u8>, SubprotocolError> {
        Ok(payload.to_vec())
    }

    fn encode(&self, payload: &[u8]) -> Result<Vec<u8>, SubprotocolError> {
        Ok(payload.to_vec())
    }
}

#[cfg(test)]
#[path = "subprotocol_test.rs"]
mod tests;

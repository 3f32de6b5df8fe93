//! Fragment reassembly.
//!
//! DESIGN
//! ======
//! Two live states plus a terminal one:
//! - `Idle`: no message in progress. A final data frame is emitted as-is; a
//!   non-final one seeds the accumulator.
//! - `Accumulating`: fragments are appended to one growable buffer until a
//!   final frame arrives, then the whole buffer is emitted.
//! - `Closed`: a close frame was seen. Any partial buffer is dropped and no
//!   further frames are accepted.
//!
//! A message is never emitted before its final fragment, and a partial buffer
//! is never emitted at all.

use crate::{CloseReason, Frame, Message, Opcode};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReassemblyError {
    /// The message in progress grew past the configured limit.
    #[error("message of {size} bytes exceeds limit of {limit} bytes")]
    MessageTooLarge { limit: usize, size: usize },
    /// A frame arrived after the close frame.
    #[error("frame received after close")]
    Closed,
}

/// Outcome of feeding one frame to the [`Reassembler`].
#[derive(Debug, PartialEq, Eq)]
pub enum Event {
    /// A complete message is ready for dispatch.
    Message(Message),
    /// The fragment was buffered; the message is not complete yet.
    Pending,
    /// The peer sent a close frame. `discarded` counts buffered bytes dropped.
    Closed { reason: Option<CloseReason>, discarded: usize },
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    Accumulating {
        opcode: Opcode,
        buffer: Vec<u8>,
    },
    Closed,
}

/// Per-connection fragment reassembler.
#[derive(Debug, Default)]
pub struct Reassembler {
    state: State,
    max_message_bytes: Option<usize>,
}

impl Reassembler {
    /// Reassembler without a size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reassembler that rejects messages larger than `limit` bytes.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self { state: State::Idle, max_message_bytes: Some(limit) }
    }

    /// True while a fragmented message is partially buffered.
    #[must_use]
    pub fn is_accumulating(&self) -> bool {
        matches!(self.state, State::Accumulating { .. })
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    /// Bytes currently buffered for the message in progress.
    #[must_use]
    pub fn buffered(&self) -> usize {
        match &self.state {
            State::Accumulating { buffer, .. } => buffer.len(),
            State::Idle | State::Closed => 0,
        }
    }

    /// Feed one frame.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyError::MessageTooLarge`] when the message in
    /// progress exceeds the limit (the reassembler is closed afterwards), and
    /// [`ReassemblyError::Closed`] for any frame after a close frame.
    pub fn push(&mut self, frame: Frame) -> Result<Event, ReassemblyError> {
        let state = std::mem::take(&mut self.state);

        match (state, frame) {
            (State::Closed, _) => {
                self.state = State::Closed;
                Err(ReassemblyError::Closed)
            }
            (State::Idle, Frame::Close(reason)) => {
                self.state = State::Closed;
                Ok(Event::Closed { reason, discarded: 0 })
            }
            (State::Accumulating { buffer, .. }, Frame::Close(reason)) => {
                self.state = State::Closed;
                Ok(Event::Closed { reason, discarded: buffer.len() })
            }
            (State::Idle, Frame::Data { opcode, payload, is_final }) => {
                self.check_limit(payload.len())?;
                if is_final {
                    Ok(Event::Message(Message { opcode, payload }))
                } else {
                    self.state = State::Accumulating { opcode, buffer: payload };
                    Ok(Event::Pending)
                }
            }
            (State::Accumulating { opcode, mut buffer }, Frame::Data { payload, is_final, .. }) => {
                self.check_limit(buffer.len() + payload.len())?;
                buffer.extend_from_slice(&payload);
                if is_final {
                    Ok(Event::Message(Message { opcode, payload: buffer }))
                } else {
                    self.state = State::Accumulating { opcode, buffer };
                    Ok(Event::Pending)
                }
            }
        }
    }

    /// Fails and closes the reassembler when `size` is over the limit.
    /// Called with `self.state` already taken, so the partial buffer is dropped.
    fn check_limit(&mut self, size: usize) -> Result<(), ReassemblyError> {
        match self.max_message_bytes {
            Some(limit) if size > limit => {
                self.state = State::Closed;
                Err(ReassemblyError::MessageTooLarge { limit, size })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "reassembler_test.rs"]
mod tests;

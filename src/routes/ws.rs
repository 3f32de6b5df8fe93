//! WebSocket route: axum adapter for the hub.
//!
//! DESIGN
//! ======
//! axum performs the handshake itself and calls back once the socket is
//! upgraded, so the route negotiates up front, tells axum which subprotocol
//! to advertise, and hands the split socket to [`Hub::run`].
//!
//! axum delivers whole messages and answers pings itself, so every frame
//! read here is final and control frames other than close never reach the
//! hub.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::extract::State;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::http::header::SEC_WEBSOCKET_PROTOCOL;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use frames::{CloseReason, Frame, Opcode};
use futures::stream::SplitStream;
use futures::{Sink, SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::hub::{HandleError, Hub};
use crate::negotiate::parse_offered;
use crate::transport::{Accepted, FrameSink, FrameSource, TransportError};

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(hub): State<Hub>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!(error = %rejection, "ws: not an upgrade request");
            return HandleError::Ineligible.into_response();
        }
    };

    if hub.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }

    let offered = parse_offered(
        headers
            .get_all(SEC_WEBSOCKET_PROTOCOL)
            .iter()
            .filter_map(|value| value.to_str().ok()),
    );
    let selection = hub.negotiate(&offered);

    let ws = match selection.header_value().map(str::to_owned) {
        Some(name) => ws.protocols([name]),
        None => ws,
    };

    ws.on_failed_upgrade(|e| warn!(error = %e, "ws: upgrade failed"))
        .on_upgrade(move |socket| async move {
            let (sink, source) = socket.split();
            let peer_closed = Arc::new(AtomicBool::new(false));
            let source = AxumSource { stream: source, peer_closed: peer_closed.clone() };
            let sink = AxumSink { sink, peer_closed };
            hub.run(Accepted::new(source, sink), selection).await;
        })
}

impl IntoResponse for HandleError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Ineligible => StatusCode::BAD_REQUEST,
            Self::Accept(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

// =============================================================================
// TRANSPORT ADAPTERS
// =============================================================================

/// Read half. Flags `peer_closed` once the peer's close frame arrives.
struct AxumSource {
    stream: SplitStream<WebSocket>,
    peer_closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSource for AxumSource {
    async fn read_frame(&mut self) -> Result<Frame, TransportError> {
        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(TransportError::Io(e.to_string())),
                None => return Err(TransportError::Disconnected),
            };

            match message {
                Message::Text(text) => return Ok(Frame::text(text.as_str())),
                Message::Binary(bytes) => return Ok(Frame::binary(bytes.to_vec())),
                Message::Close(frame) => {
                    self.peer_closed.store(true, Ordering::Release);
                    let reason = frame.map(|f| CloseReason::new(f.code, f.reason.as_str()));
                    return Ok(Frame::Close(reason));
                }
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    }
}

/// Write half, generic over the sink so tests can stand in for the socket.
struct AxumSink<S> {
    sink: S,
    peer_closed: Arc<AtomicBool>,
}

#[async_trait]
impl<S> FrameSink for AxumSink<S>
where
    S: Sink<Message, Error = axum::Error> + Send + Unpin,
{
    async fn write_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Data { is_final: false, .. } => {
                return Err(TransportError::Io("fragmented writes are not supported".into()));
            }
            Frame::Data { opcode: Opcode::Text, payload, .. } => {
                let text = String::from_utf8(payload)
                    .map_err(|_| TransportError::Io("text frame is not valid UTF-8".into()))?;
                Message::Text(text.into())
            }
            Frame::Data { opcode: Opcode::Binary, payload, .. } => Message::Binary(payload.into()),
            Frame::Close(reason) => close_message(reason),
        };
        self.sink
            .send(message)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self, reason: Option<CloseReason>) -> Result<(), TransportError> {
        // After a peer close the socket answers on its own, so a failed write
        // only means the handshake already finished.
        self.sink.send(close_message(reason)).await.map_err(|e| {
            if self.peer_closed.load(Ordering::Acquire) {
                debug!(error = %e, "ws: close frame not written, handshake done");
                TransportError::Closed
            } else {
                TransportError::Io(e.to_string())
            }
        })
    }
}

fn close_message(reason: Option<CloseReason>) -> Message {
    Message::Close(reason.map(|r| CloseFrame { code: r.code, reason: r.reason.into() }))
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;

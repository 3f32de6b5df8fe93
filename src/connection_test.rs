use std::sync::Arc;

use frames::{CLOSE_NORMAL, Message, Opcode};

use super::test_helpers::text_connection;
use super::*;
use crate::handler::{EchoHandler, HandlerError, ReceiveHandler};
use crate::subprotocol::BinarySubprotocol;
use crate::transport::test_helpers::RecordingSink;

struct Tagged(&'static str);

#[async_trait::async_trait]
impl ReceiveHandler for Tagged {
    fn name(&self) -> &'static str {
        self.0
    }

    async fn on_message(&self, _connection: &Arc<Connection>, _message: &Message) -> Result<(), HandlerError> {
        Ok(())
    }
}

#[tokio::test]
async fn send_writes_one_final_frame_with_subprotocol_opcode() {
    let (conn, sink) = text_connection();
    conn.send(b"hello").await.expect("send");
    assert_eq!(sink.frames(), vec![Frame::text("hello")]);
}

#[tokio::test]
async fn binary_subprotocol_sends_binary_frames() {
    let sink = RecordingSink::new();
    let conn = Connection::new(Arc::new(BinarySubprotocol), Box::new(sink.clone()));
    conn.send(&[1, 2, 3]).await.expect("send");
    assert_eq!(
        sink.frames(),
        vec![Frame::Data { opcode: Opcode::Binary, payload: vec![1, 2, 3], is_final: true }]
    );
}

#[tokio::test]
async fn send_rejected_by_subprotocol_writes_nothing() {
    let (conn, sink) = text_connection();
    let err = conn.send(&[0xff]).await.expect_err("invalid utf-8");
    assert!(matches!(err, SendError::Encode(_)));
    assert!(sink.frames().is_empty());
}

#[tokio::test]
async fn send_after_close_fails_without_writing() {
    let (conn, sink) = text_connection();
    assert!(conn.close(None).await.expect("close"));
    let err = conn.send(b"late").await.expect_err("closed");
    assert!(matches!(err, SendError::Closed));
    assert_eq!(sink.frames(), vec![Frame::Close(None)]);
}

#[tokio::test]
async fn close_is_written_once() {
    let (conn, sink) = text_connection();
    let reason = CloseReason::new(CLOSE_NORMAL, "done");
    assert!(conn.close(Some(reason.clone())).await.expect("first close"));
    assert!(!conn.close(Some(reason.clone())).await.expect("second close"));
    assert_eq!(sink.frames(), vec![Frame::Close(Some(reason))]);
    assert!(conn.is_closed());
}

#[tokio::test]
async fn failed_close_still_marks_connection_closed() {
    let conn = Connection::new(Arc::new(BinarySubprotocol), Box::new(RecordingSink::failing()));
    let err = conn.close(None).await.expect_err("write should fail");
    assert!(matches!(err, SendError::Transport(_)));
    assert!(conn.is_closed());
}

#[tokio::test]
async fn write_failure_surfaces_as_transport_error() {
    let conn = Connection::new(Arc::new(BinarySubprotocol), Box::new(RecordingSink::failing()));
    let err = conn.send(b"x").await.expect_err("write should fail");
    assert!(matches!(err, SendError::Transport(TransportError::Io(_))));
    assert!(!conn.is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sends_never_overlap_on_the_transport() {
    let (conn, sink) = text_connection();
    let mut tasks = Vec::new();
    for i in 0..32 {
        let conn = conn.clone();
        tasks.push(tokio::spawn(async move {
            conn.send(format!("m{i}").as_bytes()).await.expect("send");
        }));
    }
    for task in tasks {
        task.await.expect("task");
    }
    assert_eq!(sink.frames().len(), 32);
    assert_eq!(sink.overlaps(), 0);
}

#[test]
fn handlers_keep_registration_order() {
    let (conn, _sink) = text_connection();
    conn.add_handler(Arc::new(Tagged("first")));
    conn.add_handler(Arc::new(EchoHandler));
    conn.add_handler(Arc::new(Tagged("last")));
    let names: Vec<&str> = conn.handlers().iter().map(|h| h.name()).collect();
    assert_eq!(names, vec!["first", "echo", "last"]);
}

#[test]
fn debug_output_names_subprotocol() {
    let (conn, _sink) = text_connection();
    let rendered = format!("{conn:?}");
    assert!(rendered.contains("wshub.text"));
    assert!(rendered.contains(&conn.id().to_string()));
}

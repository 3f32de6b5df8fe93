use frames::Frame;

use super::*;
use crate::connection::test_helpers::text_connection;

#[test]
fn add_get_remove_round_trip() {
    let registry = Registry::new();
    let (conn, _sink) = text_connection();
    let id = conn.id();

    assert!(registry.add(conn.clone()));
    assert!(registry.contains(&id));
    assert_eq!(registry.get(&id).map(|c| c.id()), Some(id));
    assert_eq!(registry.len(), 1);

    assert!(registry.remove(&id).is_some());
    assert!(registry.get(&id).is_none());
    assert!(registry.is_empty());
}

#[test]
fn duplicate_add_keeps_single_entry() {
    let registry = Registry::new();
    let (conn, _sink) = text_connection();
    assert!(registry.add(conn.clone()));
    assert!(!registry.add(conn));
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.stats(), RegistryStats { added: 1, removed: 0 });
}

#[test]
fn remove_absent_id_is_noop() {
    let registry = Registry::new();
    let (conn, _sink) = text_connection();
    assert!(registry.remove(&conn.id()).is_none());
    registry.add(conn.clone());
    registry.remove(&conn.id());
    assert!(registry.remove(&conn.id()).is_none());
    assert_eq!(registry.stats(), RegistryStats { added: 1, removed: 1 });
}

#[test]
fn for_each_visits_every_connection() {
    let registry = Registry::new();
    let mut ids = Vec::new();
    for _ in 0..5 {
        let (conn, _sink) = text_connection();
        ids.push(conn.id());
        registry.add(conn);
    }
    let mut seen = Vec::new();
    registry.for_each(|c| seen.push(c.id()));
    seen.sort();
    ids.sort();
    assert_eq!(seen, ids);
}

#[test]
fn for_each_callback_may_mutate_registry() {
    let registry = Registry::new();
    for _ in 0..3 {
        let (conn, _sink) = text_connection();
        registry.add(conn);
    }
    registry.for_each(|c| {
        registry.remove(&c.id());
    });
    assert!(registry.is_empty());
}

#[tokio::test]
async fn broadcast_skips_excluded_and_closed_connections() {
    let registry = Registry::new();
    let (sender, sender_sink) = text_connection();
    let (open, open_sink) = text_connection();
    let (closed, closed_sink) = text_connection();
    closed.close(None).await.expect("close");
    registry.add(sender.clone());
    registry.add(open);
    registry.add(closed);

    let delivered = registry.broadcast(b"hi", Some(sender.id())).await;

    assert_eq!(delivered, 1);
    assert!(sender_sink.frames().is_empty());
    assert_eq!(open_sink.frames(), vec![Frame::text("hi")]);
    assert_eq!(closed_sink.frames(), vec![Frame::Close(None)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_add_and_remove_balance_out() {
    let registry = Arc::new(Registry::new());
    let mut tasks = Vec::new();
    for _ in 0..64 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            let (conn, _sink) = text_connection();
            let id = conn.id();
            assert!(registry.add(conn));
            tokio::task::yield_now().await;
            let _ = registry.snapshot();
            assert!(registry.remove(&id).is_some());
        }));
    }
    for task in tasks {
        task.await.expect("task");
    }
    assert!(registry.is_empty());
    assert_eq!(registry.stats(), RegistryStats { added: 64, removed: 64 });
}

//! Connection registry: every live connection, keyed by id.
//!
//! DESIGN
//! ======
//! The registry is the only state shared between connection loops. It is a
//! sharded `DashMap`, so adds and removes from different loops rarely contend.
//! The host owns the instance and injects it into the hub; there is no global.
//!
//! Iteration works on a snapshot of `Arc<Connection>` clones taken up front,
//! so callbacks never run while a shard lock is held. A connection closing
//! concurrently may still show up once in a snapshot; sending to it fails
//! with `SendError::Closed`, which broadcast treats as benign.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::join_all;
use serde::Serialize;
use tracing::debug;

use crate::connection::{Connection, ConnectionId, SendError};

/// Lifetime add/remove counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub added: u64,
    pub removed: u64,
}

#[derive(Debug, Default)]
pub struct Registry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    added: AtomicU64,
    removed: AtomicU64,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection. Returns `false` (leaving the existing entry in
    /// place) if the id is already registered.
    pub fn add(&self, connection: Arc<Connection>) -> bool {
        match self.connections.entry(connection.id()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(connection);
                self.added.fetch_add(1, Ordering::Relaxed);
                true
            }
        }
    }

    /// Remove a connection. Absent ids are a no-op.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let removed = self.connections.remove(id).map(|(_, conn)| conn);
        if removed.is_some() {
            self.removed.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            added: self.added.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
        }
    }

    /// Clones of every registered connection at this instant.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Run `f` over a snapshot of the registry.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<Connection>),
    {
        for connection in self.snapshot() {
            f(&connection);
        }
    }

    /// Send `payload` to every live connection except `exclude`.
    ///
    /// Sends to different peers run concurrently, so a slow peer only delays
    /// the completion of this call, not delivery to the others. Returns the
    /// number of successful sends. Connections that closed in the meantime
    /// are skipped silently; other failures are logged.
    pub async fn broadcast(&self, payload: &[u8], exclude: Option<ConnectionId>) -> usize {
        let sends = self
            .snapshot()
            .into_iter()
            .filter(|connection| Some(connection.id()) != exclude)
            .map(|connection| async move {
                match connection.send(payload).await {
                    Ok(()) => true,
                    Err(SendError::Closed) => false,
                    Err(e) => {
                        debug!(conn_id = %connection.id(), error = %e, "ws: broadcast send failed");
                        false
                    }
                }
            });
        join_all(sends).await.into_iter().filter(|delivered| *delivered).count()
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;

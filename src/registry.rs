//! Connection registry for per-session WebSocket push.
//!
//! Maps a session id to the live push channels watching it. Delivery is
//! best effort: a send failure is counted against the broadcast but the
//! dead channel stays registered until its owning socket task
//! unregisters it on disconnect.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Handle returned by `register`, used to unregister exactly that channel.
pub type ConnectionId = u64;

struct Connection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<String>,
}

/// Session id -> live push senders. Frames are pre-serialized JSON so a
/// broadcast serializes once regardless of fan-out.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<Uuid, Vec<Connection>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session_id: Uuid, tx: mpsc::UnboundedSender<String>) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections
            .entry(session_id)
            .or_default()
            .push(Connection { id, tx });
        id
    }

    /// Unknown session or connection ids are a no-op.
    pub fn unregister(&self, session_id: Uuid, connection_id: ConnectionId) {
        let Some(mut entry) = self.connections.get_mut(&session_id) else {
            return;
        };
        entry.retain(|c| c.id != connection_id);
        let empty = entry.is_empty();
        drop(entry);
        if empty {
            self.connections.remove_if(&session_id, |_, v| v.is_empty());
        }
    }

    /// Send a frame to every channel registered for the session.
    /// Returns the number of channels that accepted it.
    pub fn broadcast(&self, session_id: Uuid, frame: &str) -> usize {
        let Some(entry) = self.connections.get(&session_id) else {
            return 0;
        };
        entry
            .iter()
            .filter(|c| c.tx.send(frame.to_string()).is_ok())
            .count()
    }

    /// Live channel count for a session.
    #[must_use]
    pub fn connection_count(&self, session_id: Uuid) -> usize {
        self.connections
            .get(&session_id)
            .map_or(0, |entry| entry.len())
    }
}

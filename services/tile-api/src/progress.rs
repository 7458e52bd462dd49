//! Registry of connected progress listeners.
//!
//! Each websocket connection registers an unbounded channel. Broadcasting
//! pushes a message into every channel without awaiting; a channel whose
//! receiver is gone belongs to a disconnected client and is removed on the
//! spot, so one dead connection never blocks delivery to the others.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

pub type ConnectionId = u64;

/// Process-wide set of live progress connections.
#[derive(Debug, Default)]
pub struct ProgressRegistry {
    next_id: AtomicU64,
    connections: Mutex<HashMap<ConnectionId, mpsc::UnboundedSender<String>>>,
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    /// Connections found closed and removed.
    pub dropped: usize,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Messages arrive on the returned receiver.
    pub fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let count = {
            let mut connections = self.connections.lock();
            connections.insert(id, tx);
            connections.len()
        };
        debug!(connection = id, connections = count, "Progress listener registered");
        (id, rx)
    }

    /// Remove a connection. Returns whether it was still registered.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.connections.lock().remove(&id).is_some();
        if removed {
            debug!(connection = id, "Progress listener unregistered");
        }
        removed
    }

    /// Send `message` to every registered connection.
    pub fn broadcast(&self, message: &str) -> Delivery {
        let mut connections = self.connections.lock();
        let mut delivered = 0;
        let mut dropped = 0;

        connections.retain(|id, tx| match tx.send(message.to_string()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => {
                debug!(connection = *id, "Dropping closed progress listener");
                dropped += 1;
                false
            }
        });

        Delivery { delivered, dropped }
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

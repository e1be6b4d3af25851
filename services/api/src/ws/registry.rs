//! The connection registry.
//!
//! Every live WebSocket is registered under its client id together with an
//! outbound frame channel and the conversation history of that client. The
//! registry is the only structure shared between connection tasks; one
//! `RwLock` guards it and is never held across a socket write.

use super::protocol::ServerMessage;
use companion_core::history::{ConversationHistory, Turn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{
    RwLock,
    mpsc::{self, error::TrySendError},
};
use tracing::{debug, error, warn};

/// Serialized frames queued for one connection's writer task.
pub type FrameSender = mpsc::Sender<String>;

struct ConnectionEntry {
    token: u64,
    tx: FrameSender,
    history: ConversationHistory,
}

/// Proof of registration returned to the connection task that owns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub id: String,
    token: u64,
}

pub struct SessionManager {
    connections: RwLock<HashMap<String, ConnectionEntry>>,
    next_token: AtomicU64,
    history_max_turns: usize,
}

impl SessionManager {
    /// `history_max_turns` caps every connection's history; `0` disables the cap.
    pub fn new(history_max_turns: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_token: AtomicU64::new(1),
            history_max_turns,
        }
    }

    /// Registers a connection. An existing registration under the same id is
    /// replaced, dropping its outbound channel and history.
    pub async fn register(&self, id: &str, tx: FrameSender) -> ConnectionHandle {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let entry = ConnectionEntry {
            token,
            tx,
            history: ConversationHistory::new(self.history_max_turns),
        };
        if self
            .connections
            .write()
            .await
            .insert(id.to_string(), entry)
            .is_some()
        {
            warn!(client_id = %id, "Client id already registered; replacing the previous connection");
        }
        ConnectionHandle {
            id: id.to_string(),
            token,
        }
    }

    /// Removes a connection and its history. Returns whether anything was removed.
    pub async fn unregister(&self, id: &str) -> bool {
        self.connections.write().await.remove(id).is_some()
    }

    /// Removes the registration only if `handle` still owns it, so a replaced
    /// connection closing late cannot evict its successor.
    pub async fn release(&self, handle: &ConnectionHandle) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(&handle.id) {
            Some(entry) if entry.token == handle.token => {
                connections.remove(&handle.id);
                true
            }
            _ => false,
        }
    }

    pub async fn is_registered(&self, id: &str) -> bool {
        self.connections.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Registered client ids in lexical order.
    pub async fn connection_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Appends one turn to the history owned by `handle`. Returns `false`
    /// when the connection is gone or was replaced.
    pub async fn append_history(&self, handle: &ConnectionHandle, turn: Turn) -> bool {
        match self.connections.write().await.get_mut(&handle.id) {
            Some(entry) if entry.token == handle.token => {
                entry.history.push(turn);
                true
            }
            _ => false,
        }
    }

    /// Appends a user turn and its reply under one lock so they stay adjacent.
    /// A replaced connection's late reply is dropped rather than written into
    /// its successor's history.
    pub async fn append_exchange(
        &self,
        handle: &ConnectionHandle,
        user: Turn,
        assistant: Turn,
    ) -> bool {
        match self.connections.write().await.get_mut(&handle.id) {
            Some(entry) if entry.token == handle.token => {
                entry.history.push(user);
                entry.history.push(assistant);
                true
            }
            _ => {
                debug!(client_id = %handle.id, "Connection replaced or gone; exchange not recorded");
                false
            }
        }
    }

    /// The history of `id` in chronological order, `None` for unknown ids.
    pub async fn get_history(&self, id: &str) -> Option<Vec<Turn>> {
        self.connections
            .read()
            .await
            .get(id)
            .map(|entry| entry.history.to_vec())
    }

    async fn sender(&self, id: &str, token: Option<u64>) -> Option<FrameSender> {
        self.connections
            .read()
            .await
            .get(id)
            .filter(|entry| token.is_none_or(|token| token == entry.token))
            .map(|entry| entry.tx.clone())
    }

    /// Sends to one connection, waiting for room in its queue. A message for
    /// a connection that has gone away is dropped.
    pub async fn send_to(&self, id: &str, message: &ServerMessage) -> bool {
        let tx = self.sender(id, None).await;
        deliver(id, tx, message).await
    }

    /// Like [`send_to`](Self::send_to), but only while `handle` still owns
    /// the registration.
    pub async fn send_to_connection(&self, handle: &ConnectionHandle, message: &ServerMessage) -> bool {
        let tx = self.sender(&handle.id, Some(handle.token)).await;
        deliver(&handle.id, tx, message).await
    }

    /// Sends to every registered connection. Returns the number of deliveries.
    pub async fn broadcast(&self, message: &ServerMessage) -> usize {
        self.send_to_matching(|_| true, message).await
    }

    /// Sends to every connection whose id satisfies `predicate`. Delivery is
    /// best effort: a connection whose queue is full or closed is skipped, so
    /// one stalled client never holds up the others.
    pub async fn send_to_matching<P>(&self, predicate: P, message: &ServerMessage) -> usize
    where
        P: Fn(&str) -> bool,
    {
        let targets: Vec<(String, FrameSender)> = self
            .connections
            .read()
            .await
            .iter()
            .filter(|(id, _)| predicate(id))
            .map(|(id, entry)| (id.clone(), entry.tx.clone()))
            .collect();
        if targets.is_empty() {
            return 0;
        }
        let Some(frame) = encode(message) else {
            return 0;
        };

        let mut delivered = 0;
        for (id, tx) in targets {
            match tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(client_id = %id, "Outbound queue full; skipping client")
                }
                Err(TrySendError::Closed(_)) => {
                    warn!(client_id = %id, "Outbound channel closed; skipping client")
                }
            }
        }
        delivered
    }
}

async fn deliver(id: &str, tx: Option<FrameSender>, message: &ServerMessage) -> bool {
    let Some(tx) = tx else {
        debug!(client_id = %id, "Dropping message for unregistered client");
        return false;
    };
    let Some(frame) = encode(message) else {
        return false;
    };
    if tx.send(frame).await.is_err() {
        warn!(client_id = %id, "Outbound channel closed; message dropped");
        return false;
    }
    true
}

fn encode(message: &ServerMessage) -> Option<String> {
    match message.to_frame() {
        Ok(frame) => Some(frame),
        Err(e) => {
            error!(error = %e, "Failed to serialize outbound message");
            None
        }
    }
}

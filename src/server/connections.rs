//! Connection state management

use crate::server::messages::ServerMessage;
use crate::sessions::SessionSource;
use crate::status::{
    self, StatusDelta, StatusSubscription, SubscriptionHandle, STATUS_COLLECTION, STATUS_ROW_ID,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// Why a subscription request was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscribeError {
    #[error("unknown publication '{0}'")]
    UnknownPublication(String),

    #[error("already subscribed to '{0}'")]
    AlreadySubscribed(String),

    #[error("outbound queue is full")]
    QueueFull,

    #[error("connection closed")]
    ConnectionClosed,
}

/// A publication feeding one connection
struct ActiveFeed {
    subscription: SubscriptionHandle,
    forwarder: JoinHandle<()>,
}

impl ActiveFeed {
    fn stop(self) {
        self.subscription.unsubscribe();
        self.forwarder.abort();
    }
}

/// An authenticated admin WebSocket connection
pub struct AdminConnection {
    /// Unique connection ID
    pub id: Uuid,
    /// Channel for sending messages to this client
    tx: mpsc::Sender<ServerMessage>,
    /// Active publications by name
    feeds: Mutex<HashMap<String, ActiveFeed>>,
}

impl AdminConnection {
    pub fn new(tx: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
            feeds: Mutex::new(HashMap::new()),
        }
    }

    /// Queue a message without waiting for room in the outbound queue
    pub fn try_send(&self, msg: ServerMessage) -> Result<(), TrySendError<ServerMessage>> {
        self.tx.try_send(msg)
    }

    /// Start a publication for this connection.
    ///
    /// Queues the full record and `ready` without waiting, then forwards
    /// deltas as `changed` messages until unsubscribed. While the outbound
    /// queue is full, pending deltas are merged into one.
    pub fn subscribe(&self, name: &str, source: &dyn SessionSource) -> Result<(), SubscribeError> {
        if name != STATUS_COLLECTION {
            return Err(SubscribeError::UnknownPublication(name.to_string()));
        }
        if self.feeds.lock().contains_key(name) {
            return Err(SubscribeError::AlreadySubscribed(name.to_string()));
        }

        let permits = self.tx.try_reserve_many(2).map_err(|e| match e {
            TrySendError::Full(()) => SubscribeError::QueueFull,
            TrySendError::Closed(()) => SubscribeError::ConnectionClosed,
        })?;

        let subscription = status::subscribe(source);
        let handle = subscription.handle();

        let initial = [
            ServerMessage::Added {
                collection: STATUS_COLLECTION.to_string(),
                id: STATUS_ROW_ID.to_string(),
                fields: subscription.snapshot(),
            },
            ServerMessage::Ready {
                name: name.to_string(),
            },
        ];
        for (permit, msg) in permits.zip(initial) {
            permit.send(msg);
        }

        let forwarder = tokio::spawn(forward_changes(subscription, self.tx.clone(), self.id));

        let feed = ActiveFeed {
            subscription: handle,
            forwarder,
        };

        // Re-check under the lock in case of a concurrent subscribe
        let mut feeds = self.feeds.lock();
        if feeds.contains_key(name) {
            feed.stop();
            return Err(SubscribeError::AlreadySubscribed(name.to_string()));
        }
        feeds.insert(name.to_string(), feed);

        Ok(())
    }

    /// Stop a publication; returns false if it was not active
    pub fn unsubscribe(&self, name: &str) -> bool {
        match self.feeds.lock().remove(name) {
            Some(feed) => {
                feed.stop();
                true
            }
            None => false,
        }
    }

    /// Stop every publication on this connection
    pub fn unsubscribe_all(&self) {
        for (_, feed) in self.feeds.lock().drain() {
            feed.stop();
        }
    }

    pub fn feed_count(&self) -> usize {
        self.feeds.lock().len()
    }

    pub fn is_subscribed(&self, name: &str) -> bool {
        self.feeds.lock().contains_key(name)
    }
}

/// Relay deltas to the client, merging whatever piles up while its queue is full
async fn forward_changes(mut subscription: StatusSubscription, tx: mpsc::Sender<ServerMessage>, conn_id: Uuid) {
    let mut pending: Option<StatusDelta> = None;

    loop {
        tokio::select! {
            delta = subscription.next_delta() => {
                let Some(delta) = delta else { break };
                match pending.as_mut() {
                    Some(merged) => merged.merge(&delta),
                    None => pending = Some(delta),
                }
            }
            permit = tx.reserve(), if pending.is_some() => {
                let Ok(permit) = permit else {
                    debug!(conn_id = %conn_id, "Connection closed, dropping status feed");
                    break;
                };
                if let Some(fields) = pending.take() {
                    permit.send(ServerMessage::Changed {
                        collection: STATUS_COLLECTION.to_string(),
                        id: STATUS_ROW_ID.to_string(),
                        fields,
                    });
                }
            }
        }
    }
}

/// Manages all active admin connections
#[derive(Clone, Default)]
pub struct ConnectionManager {
    connections: Arc<DashMap<Uuid, Arc<AdminConnection>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection
    pub fn add(&self, conn: Arc<AdminConnection>) {
        self.connections.insert(conn.id, conn);
    }

    /// Remove a connection and tear down its publications
    pub fn remove(&self, id: Uuid) {
        if let Some((_, conn)) = self.connections.remove(&id) {
            conn.unsubscribe_all();
        }
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<AdminConnection>> {
        self.connections.get(&id).map(|r| r.clone())
    }

    /// Get total connection count
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Publications active across all connections
    pub fn feed_count(&self) -> usize {
        self.connections.iter().map(|c| c.value().feed_count()).sum()
    }
}

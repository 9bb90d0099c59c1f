use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::{Notify, RwLock, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

/// A serialized outbound text frame, cheap to clone across recipients.
pub type Frame = Utf8Bytes;

/// Outbound queue capacity used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Identifies one live connection of one user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    pub user_id: String,
    pub conn_id: Uuid,
}

/// Returned by [`Registry::register`]. The connection's write loop owns the
/// outbound half; the registry keeps the only sender.
pub struct ClientHandle {
    id: ConnectionId,
    outbound: OutboundQueue,
}

impl ClientHandle {
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn into_parts(self) -> (ConnectionId, OutboundQueue) {
        (self.id, self.outbound)
    }
}

/// Receiving end of a connection's bounded outbound queue.
pub struct OutboundQueue {
    rx: mpsc::Receiver<Frame>,
    closed: Arc<Notify>,
}

impl OutboundQueue {
    /// Next frame to write. `None` once the connection has been unregistered,
    /// without draining frames that were still queued.
    pub async fn next(&mut self) -> Option<Frame> {
        tokio::select! {
            biased;
            _ = self.closed.notified() => None,
            frame = self.rx.recv() => frame,
        }
    }
}

/// Who a broadcast is addressed to.
#[derive(Debug, Clone, Copy)]
pub enum Audience<'a> {
    /// Every connection of every registered user.
    Everyone,
    /// Every connection of the listed users.
    Members(&'a [String]),
}

/// Result of one fan-out pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub shed: usize,
}

struct Client {
    conn_id: Uuid,
    tx: mpsc::Sender<Frame>,
    closed: Arc<Notify>,
}

impl Client {
    fn close(&self) {
        // notify_one stores a permit, so a write loop that has not started
        // polling yet still observes the close.
        self.closed.notify_one();
    }
}

/// In-memory map of user id to that user's live connections.
///
/// Register/unregister take the write lock; fan-out takes the read lock and
/// never awaits while holding it.
pub struct Registry {
    clients: RwLock<HashMap<String, Vec<Client>>>,
    queue_capacity: usize,
}

impl Registry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Add a connection for `user_id`. It is visible to fan-out as soon as
    /// this returns.
    pub async fn register(&self, user_id: &str) -> ClientHandle {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let closed = Arc::new(Notify::new());

        let total = {
            let mut clients = self.clients.write().await;
            let conns = clients.entry(user_id.to_string()).or_default();
            conns.push(Client {
                conn_id,
                tx,
                closed: closed.clone(),
            });
            conns.len()
        };

        info!(user_id, %conn_id, connections = total, "client registered");

        ClientHandle {
            id: ConnectionId {
                user_id: user_id.to_string(),
                conn_id,
            },
            outbound: OutboundQueue { rx, closed },
        }
    }

    /// Remove a connection and close its outbound queue. Returns false if it
    /// was already gone, which makes concurrent calls harmless.
    pub async fn unregister(&self, id: &ConnectionId) -> bool {
        let removed = {
            let mut clients = self.clients.write().await;
            let Some(conns) = clients.get_mut(&id.user_id) else {
                return false;
            };
            let removed = conns
                .iter()
                .position(|c| c.conn_id == id.conn_id)
                .map(|idx| conns.swap_remove(idx));
            if conns.is_empty() {
                clients.remove(&id.user_id);
            }
            removed
        };

        match removed {
            Some(client) => {
                client.close();
                info!(user_id = %id.user_id, conn_id = %id.conn_id, "client unregistered");
                true
            }
            None => false,
        }
    }

    /// Enqueue `frame` on every connection in `audience` without blocking.
    /// Connections whose queue is full are unregistered.
    pub async fn deliver(&self, audience: Audience<'_>, frame: &Frame) -> Delivery {
        let mut report = Delivery::default();
        let mut slow = Vec::new();

        {
            let clients = self.clients.read().await;
            let mut offer = |user_id: &String, conns: &Vec<Client>| {
                for client in conns {
                    match client.tx.try_send(frame.clone()) {
                        Ok(()) => report.delivered += 1,
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            slow.push(ConnectionId {
                                user_id: user_id.clone(),
                                conn_id: client.conn_id,
                            });
                        }
                        // Write loop already gone; its teardown unregisters it.
                        Err(mpsc::error::TrySendError::Closed(_)) => {}
                    }
                }
            };

            match audience {
                Audience::Everyone => {
                    for (user_id, conns) in clients.iter() {
                        offer(user_id, conns);
                    }
                }
                Audience::Members(members) => {
                    for user_id in members {
                        if let Some(conns) = clients.get(user_id) {
                            offer(user_id, conns);
                        }
                    }
                }
            }
        }

        for id in &slow {
            warn!(user_id = %id.user_id, conn_id = %id.conn_id, "outbound queue full, dropping slow client");
            if self.unregister(id).await {
                report.shed += 1;
            }
        }

        report
    }

    /// Enqueue a frame for one specific connection. Best effort: a full or
    /// closed queue drops the frame.
    pub async fn send_to(&self, id: &ConnectionId, frame: Frame) -> bool {
        let clients = self.clients.read().await;
        clients
            .get(&id.user_id)
            .and_then(|conns| conns.iter().find(|c| c.conn_id == id.conn_id))
            .is_some_and(|client| client.tx.try_send(frame).is_ok())
    }

    #[cfg(test)]
    pub async fn is_registered(&self, id: &ConnectionId) -> bool {
        self.clients
            .read()
            .await
            .get(&id.user_id)
            .is_some_and(|conns| conns.iter().any(|c| c.conn_id == id.conn_id))
    }

    /// Number of live connections held by `user_id`.
    pub async fn connections_of(&self, user_id: &str) -> usize {
        self.clients
            .read()
            .await
            .get(user_id)
            .map_or(0, |conns| conns.len())
    }

    /// Number of users with at least one live connection.
    pub async fn online_users(&self) -> usize {
        self.clients.read().await.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

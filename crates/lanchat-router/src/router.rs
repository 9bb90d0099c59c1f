use std::sync::Arc;

use lanchat_db::Database;
use lanchat_types::events::{ErrorCode, ErrorFrame, SendRequest, ServerFrame};
use lanchat_types::models::{Channel, ChannelMember, ChannelType, Message};
use tracing::{debug, error, warn};

use crate::error::{Result, RouterError};
use crate::registry::{Audience, ClientHandle, ConnectionId, DEFAULT_QUEUE_CAPACITY, Delivery, Frame, Registry};
use crate::resolver;
use crate::store::{self, MessageClock};

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Capacity of each connection's outbound queue.
    pub queue_capacity: usize,
    /// Upper bound on messages returned by one history call.
    pub history_limit: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            history_limit: 100,
        }
    }
}

/// Resolves, authorizes, persists and fans out messages.
///
/// Created once at startup and handed to every HTTP handler and connection
/// task; dropping the last clone tears the registry down with it.
#[derive(Clone)]
pub struct MessageRouter {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    db: Arc<Database>,
    registry: Registry,
    clock: MessageClock,
    history_limit: u32,
}

impl MessageRouter {
    pub fn new(db: Arc<Database>, config: RouterConfig) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                db,
                registry: Registry::new(config.queue_capacity),
                clock: MessageClock::new(),
                history_limit: config.history_limit,
            }),
        }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.inner.db
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Run blocking store work off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database, &MessageClock) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || f(inner.db.as_ref(), &inner.clock))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                RouterError::Storage(anyhow::anyhow!("blocking task failed: {e}"))
            })?
    }

    // -- Connections --

    pub async fn register(&self, user_id: &str) -> ClientHandle {
        self.inner.registry.register(user_id).await
    }

    pub async fn unregister(&self, id: &ConnectionId) -> bool {
        self.inner.registry.unregister(id).await
    }

    // -- Identity --

    /// Map a verified username to its stable user id.
    pub async fn user_id_for(&self, username: &str) -> Result<Option<String>> {
        let username = username.to_string();
        self.blocking(move |db, _| Ok(db.user_id_by_username(&username)?))
            .await
    }

    // -- Resolution and authorization --

    pub async fn resolve_destination(&self, sender_id: &str, token: &str) -> Result<String> {
        let (sender_id, token) = (sender_id.to_string(), token.to_string());
        self.blocking(move |db, _| resolver::resolve_destination(db, &sender_id, &token))
            .await
    }

    pub async fn authorize(&self, user_id: &str, channel_id: &str) -> Result<ChannelType> {
        let (user_id, channel_id) = (user_id.to_string(), channel_id.to_string());
        self.blocking(move |db, _| resolver::authorize(db, &user_id, &channel_id))
            .await
    }

    // -- Messages --

    /// Resolve, authorize, persist, then broadcast. Nothing is broadcast
    /// unless the append succeeded.
    ///
    /// The pipeline runs on its own task: dropping or aborting the caller
    /// after the append has started still lets the append and the broadcast
    /// finish.
    pub async fn post(&self, sender_id: &str, req: SendRequest) -> Result<Message> {
        let this = self.clone();
        let sender = sender_id.to_string();
        tokio::spawn(async move { this.append_and_broadcast(sender, req).await })
            .await
            .map_err(|e| {
                error!("post task join error: {}", e);
                RouterError::Storage(anyhow::anyhow!("post task failed: {e}"))
            })?
    }

    async fn append_and_broadcast(&self, sender_id: String, req: SendRequest) -> Result<Message> {
        let sender = sender_id.clone();
        let msg = self
            .blocking(move |db, clock| {
                let channel_id = resolver::resolve_destination(db, &sender, &req.channel_id)?;
                resolver::authorize(db, &sender, &channel_id)?;
                store::append(db, clock, &sender, &channel_id, req)
            })
            .await?;

        debug!(message_id = %msg.id, channel_id = %msg.channel_id, sender_id = %sender_id, "message persisted");

        // The message is durable at this point; history is the fallback for
        // anyone the live delivery misses.
        if let Err(e) = self.broadcast(&msg).await {
            warn!(message_id = %msg.id, "broadcast failed: {}", e);
        }

        Ok(msg)
    }

    /// Deliver a persisted message to every live connection entitled to it.
    pub async fn broadcast(&self, msg: &Message) -> Result<Delivery> {
        let channel_id = msg.channel_id.clone();
        let (kind, members) = self
            .blocking(move |db, _| {
                let kind = resolver::channel_type(db, &channel_id)?;
                if kind.is_public() {
                    Ok((kind, None))
                } else {
                    Ok((kind, Some(db.channel_member_ids(&channel_id)?)))
                }
            })
            .await?;

        let frame = Frame::from(serde_json::to_string(&ServerFrame::Message(msg.clone()))?);
        let audience = match &members {
            None => Audience::Everyone,
            Some(members) => Audience::Members(members),
        };

        let delivery = self.inner.registry.deliver(audience, &frame).await;
        debug!(
            message_id = %msg.id,
            channel_id = %msg.channel_id,
            kind = %kind,
            delivered = delivery.delivered,
            shed = delivery.shed,
            "message broadcast"
        );
        Ok(delivery)
    }

    /// Enqueue an error acknowledgment on one connection.
    pub async fn send_error(&self, id: &ConnectionId, code: ErrorCode, channel_id: Option<String>) {
        let frame = ServerFrame::Error(ErrorFrame::new(code, channel_id));
        match serde_json::to_string(&frame) {
            Ok(text) => {
                self.inner.registry.send_to(id, Frame::from(text)).await;
            }
            Err(e) => warn!("failed to encode error frame: {}", e),
        }
    }

    /// Newest messages of the channel named by `token`, oldest first.
    /// `limit` is clamped to the configured maximum.
    pub async fn history(
        &self,
        requester_id: &str,
        token: &str,
        limit: Option<u32>,
        before: Option<i64>,
    ) -> Result<Vec<Message>> {
        let (requester, token) = (requester_id.to_string(), token.to_string());
        let max = self.inner.history_limit;
        let limit = limit.map_or(max, |l| l.min(max));
        self.blocking(move |db, _| {
            let channel_id = resolver::resolve_destination(db, &requester, &token)?;
            resolver::authorize(db, &requester, &channel_id)?;
            store::history(db, &channel_id, limit, before)
        })
        .await
    }

    // -- Channels --

    pub async fn list_channels(&self, user_id: &str) -> Result<Vec<Channel>> {
        let user_id = user_id.to_string();
        self.blocking(move |db, _| {
            let rows = db.list_accessible_channels(&user_id)?;
            Ok(rows
                .into_iter()
                .map(|row| Channel {
                    kind: row.kind.parse().unwrap_or(ChannelType::Private),
                    id: row.id,
                    name: row.name,
                })
                .collect())
        })
        .await
    }

    pub async fn list_members(&self, requester_id: &str, channel_id: &str) -> Result<Vec<ChannelMember>> {
        let (requester, channel_id) = (requester_id.to_string(), channel_id.to_string());
        self.blocking(move |db, _| {
            resolver::authorize(db, &requester, &channel_id)?;
            let rows = db.list_channel_members(&channel_id)?;
            Ok(rows
                .into_iter()
                .map(|row| ChannelMember {
                    id: row.user_id,
                    username: row.username,
                    full_name: row.full_name,
                })
                .collect())
        })
        .await
    }

    /// Canonical DM channel between the requester and `target_id`.
    pub async fn create_dm(&self, requester_id: &str, target_id: &str) -> Result<String> {
        if requester_id == target_id {
            return Err(RouterError::Forbidden);
        }
        let (requester, target) = (requester_id.to_string(), target_id.to_string());
        self.blocking(move |db, _| {
            if !db.user_exists(&target)? {
                return Err(RouterError::ChannelMissing);
            }
            resolver::find_or_create_dm(db, &requester, &target)
        })
        .await
    }
}

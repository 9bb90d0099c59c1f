use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use lanchat_types::events::{ErrorCode, SendRequest};
use tracing::{debug, info, warn};

use crate::registry::ConnectionId;
use crate::router::MessageRouter;

/// Default heartbeat interval.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Consecutive heartbeats without a pong before the connection is dropped.
const MAX_MISSED_PONGS: u8 = 2;

#[derive(Debug, Clone, Copy)]
pub struct ConnectionOptions {
    pub heartbeat: Duration,
    /// Reply to rejected frames with an error frame instead of dropping
    /// them silently.
    pub error_acks: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            heartbeat: HEARTBEAT_INTERVAL,
            error_acks: false,
        }
    }
}

/// Drive one authenticated live connection until either side goes away.
///
/// The connection is registered before the first frame is read and
/// unregistered exactly once on the way out, whichever half ends first.
/// Aborting the read half never cuts a post short, since
/// [`MessageRouter::post`] runs on its own task.
pub async fn handle_connection(
    socket: WebSocket,
    router: MessageRouter,
    user_id: String,
    opts: ConnectionOptions,
) {
    let (id, mut outbound) = router.register(&user_id).await.into_parts();
    let (mut sender, mut receiver) = socket.split();

    info!(user_id = %id.user_id, conn_id = %id.conn_id, "live connection opened");

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Write loop: outbound queue and heartbeat -> socket
    let heartbeat_every = opts.heartbeat;
    let send_id = id.clone();
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(heartbeat_every);
        heartbeat.tick().await;
        let mut missed_pongs: u8 = 0;

        loop {
            tokio::select! {
                frame = outbound.next() => {
                    let Some(frame) = frame else { break };
                    if sender.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_pongs = 0;
                    } else {
                        missed_pongs += 1;
                        if missed_pongs >= MAX_MISSED_PONGS {
                            warn!(
                                user_id = %send_id.user_id,
                                conn_id = %send_id.conn_id,
                                missed_pongs,
                                "client stopped answering pings, closing live connection"
                            );
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }

        let _ = sender.close().await;
    });

    // Read loop: socket -> router
    let recv_router = router.clone();
    let recv_id = id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_frame(&recv_router, &recv_id, text.as_str().as_bytes(), opts).await;
                }
                Message::Binary(data) => {
                    handle_frame(&recv_router, &recv_id, &data, opts).await;
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                Message::Ping(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            let _ = recv_task.await;
        }
        _ = &mut recv_task => {
            send_task.abort();
            let _ = send_task.await;
        }
    }

    router.unregister(&id).await;
    let remaining = router.registry().connections_of(&id.user_id).await;
    info!(user_id = %id.user_id, conn_id = %id.conn_id, remaining, "live connection closed");
}

/// Decode and post one inbound frame. Failures never end the connection.
async fn handle_frame(router: &MessageRouter, id: &ConnectionId, raw: &[u8], opts: ConnectionOptions) {
    let req = match SendRequest::decode(raw) {
        Ok(req) => req,
        Err(e) => {
            debug!(user_id = %id.user_id, "dropping malformed frame: {}", e);
            if opts.error_acks {
                router.send_error(id, ErrorCode::Malformed, None).await;
            }
            return;
        }
    };

    let channel_id = req.channel_id.clone();
    if let Err(e) = router.post(&id.user_id, req).await {
        debug!(user_id = %id.user_id, channel_id = %channel_id, "message rejected: {}", e);
        if opts.error_acks {
            router.send_error(id, e.code(), Some(channel_id)).await;
        }
    }
}

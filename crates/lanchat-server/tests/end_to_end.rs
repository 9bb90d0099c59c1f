use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use lanchat_db::Database;
use lanchat_router::MessageRouter;
use lanchat_server::build_app;
use lanchat_server::config::Config;
use lanchat_types::api::Claims;

const SECRET: &str = "e2e-secret";

fn token_for(username: &str) -> String {
    let claims = Claims {
        username: username.into(),
        role: None,
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn spawn_server(dir: &tempfile::TempDir) -> (std::net::SocketAddr, MessageRouter) {
    let db_path = dir.path().join("nested").join("chat.db");
    let config = Config::from_lookup(|key| match key {
        "LANCHAT_DB_PATH" => Some(db_path.display().to_string()),
        "LANCHAT_JWT_SECRET" => Some(SECRET.into()),
        "LANCHAT_HEARTBEAT_SECS" => Some("30".into()),
        _ => None,
    })
    .unwrap();

    let (app, router) = build_app(&config).unwrap();

    // Directory data normally written by the admin console.
    let db = Database::open(&config.db_path).unwrap();
    db.create_user("u-alice", "alice", Some("Alice A")).unwrap();
    db.create_user("u-bob", "bob", Some("Bob B")).unwrap();
    db.create_user("u-charlie", "charlie", None).unwrap();
    db.create_channel("priv-1", "Private One", "private").unwrap();
    db.add_channel_member("priv-1", "u-alice").unwrap();
    db.add_channel_member("priv-1", "u-bob").unwrap();
    drop(db);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, router)
}

async fn wait_for_connections(router: &MessageRouter, user_id: &str, expected: usize) {
    timeout(Duration::from_secs(3), async {
        while router.registry().connections_of(user_id).await != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{user_id} never reached {expected} live connections"));
}

async fn next_json<S>(ws: &mut S) -> Value
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("no frame within timeout")
            .expect("stream ended")
            .expect("websocket error");
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn live_delivery_and_history_over_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, router) = spawn_server(&dir).await;

    // Upgrade without credentials is refused.
    assert!(
        tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .is_err()
    );

    let (mut alice, _) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/ws?token={}", token_for("alice")))
            .await
            .unwrap();
    let (mut bob, _) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/ws?token={}", token_for("bob")))
            .await
            .unwrap();

    wait_for_connections(&router, "u-alice", 1).await;
    wait_for_connections(&router, "u-bob", 1).await;

    // A malformed frame is ignored and the connection stays usable.
    alice.send(WsMessage::text("{oops")).await.unwrap();

    let frame = json!({
        "channel_id": "priv-1",
        "content": B64.encode("hello bob"),
        "nonce": B64.encode([7u8; 12]),
        "signature": null,
        "type": 1
    });
    alice.send(WsMessage::text(frame.to_string())).await.unwrap();

    let received = next_json(&mut bob).await;
    assert_eq!(received["channel_id"], "priv-1");
    assert_eq!(received["sender_id"], "u-alice");
    assert_eq!(received["content"], B64.encode("hello bob"));
    assert_eq!(received["type"], 1);

    let echoed = next_json(&mut alice).await;
    assert_eq!(echoed["id"], received["id"]);

    let http = reqwest::Client::new();

    let resp = http
        .get(format!("http://{addr}/history?channel_id=priv-1"))
        .bearer_auth(token_for("charlie"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = http
        .get(format!("http://{addr}/history?channel_id=priv-1"))
        .bearer_auth(token_for("bob"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let history: Value = serde_json::from_str(&resp.text().await.unwrap()).unwrap();
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["id"], received["id"]);

    let resp = http.get(format!("http://{addr}/health")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert!(resp.headers().contains_key("x-request-id"));

    alice.close(None).await.unwrap();
    bob.close(None).await.unwrap();
    wait_for_connections(&router, "u-alice", 0).await;
    wait_for_connections(&router, "u-bob", 0).await;
    assert_eq!(router.registry().online_users().await, 0);
}

#[tokio::test]
async fn http_send_reaches_dm_partner() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, router) = spawn_server(&dir).await;

    let (mut charlie, _) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/ws?token={}", token_for("charlie")))
            .await
            .unwrap();
    wait_for_connections(&router, "u-charlie", 1).await;

    let http = reqwest::Client::new();
    let resp = http
        .post(format!("http://{addr}/dm"))
        .bearer_auth(token_for("bob"))
        .header("content-type", "application/json")
        .body(json!({"target_user_id": "u-charlie"}).to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = serde_json::from_str(&resp.text().await.unwrap()).unwrap();
    assert_eq!(body["channel_id"], "dm:u-bob:u-charlie");

    let resp = http
        .post(format!("http://{addr}/send"))
        .bearer_auth(token_for("bob"))
        .header("content-type", "application/json")
        .body(json!({"channel_id": "u-charlie", "content": B64.encode("psst"), "type": 1}).to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let sent: Value = serde_json::from_str(&resp.text().await.unwrap()).unwrap();
    assert_eq!(sent["success"], true);

    let delivered = next_json(&mut charlie).await;
    assert_eq!(delivered["id"], sent["message_id"]);
    assert_eq!(delivered["channel_id"], "dm:u-bob:u-charlie");
}

use std::sync::atomic::{AtomicI64, Ordering};

use lanchat_db::Database;
use lanchat_db::models::MessageRow;
use lanchat_types::events::SendRequest;
use lanchat_types::models::{Message, MessageType};
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;

/// Millisecond wall clock that never runs backwards within the process.
#[derive(Debug, Default)]
pub struct MessageClock {
    last: AtomicI64,
}

impl MessageClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let prev = self.last.fetch_max(now, Ordering::AcqRel);
        prev.max(now)
    }
}

/// Persist a new message from `sender_id` into an already resolved and
/// authorized channel.
pub fn append(
    db: &Database,
    clock: &MessageClock,
    sender_id: &str,
    channel_id: &str,
    req: SendRequest,
) -> Result<Message> {
    let msg = Message {
        id: Uuid::new_v4(),
        channel_id: channel_id.to_string(),
        sender_id: sender_id.to_string(),
        timestamp: clock.now_ms(),
        kind: req.kind,
        content: req.content,
        nonce: req.nonce,
        signature: req.signature,
    };

    db.insert_message(&MessageRow {
        id: msg.id.to_string(),
        channel_id: msg.channel_id.clone(),
        sender_id: msg.sender_id.clone(),
        timestamp: msg.timestamp,
        kind: i64::from(u8::from(msg.kind)),
        content: msg.content.clone(),
        nonce: msg.nonce.clone(),
        signature: msg.signature.clone(),
    })?;

    Ok(msg)
}

/// Ordered, bounded history of a channel. Read only.
pub fn history(
    db: &Database,
    channel_id: &str,
    limit: u32,
    before: Option<i64>,
) -> Result<Vec<Message>> {
    let rows = db.get_messages(channel_id, limit, before)?;
    Ok(rows.into_iter().filter_map(row_to_message).collect())
}

fn row_to_message(row: MessageRow) -> Option<Message> {
    let id = match row.id.parse::<Uuid>() {
        Ok(id) => id,
        Err(e) => {
            warn!("Corrupt message id '{}': {}", row.id, e);
            return None;
        }
    };
    let kind = match u8::try_from(row.kind)
        .ok()
        .and_then(|k| MessageType::try_from(k).ok())
    {
        Some(kind) => kind,
        None => {
            warn!("Corrupt type {} on message '{}'", row.kind, row.id);
            return None;
        }
    };

    Some(Message {
        id,
        channel_id: row.channel_id,
        sender_id: row.sender_id,
        timestamp: row.timestamp,
        kind,
        content: row.content,
        nonce: row.nonce,
        signature: row.signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(channel_id: &str, body: &str) -> SendRequest {
        SendRequest {
            channel_id: channel_id.into(),
            content: body.as_bytes().to_vec(),
            nonce: vec![1, 2, 3],
            signature: vec![9],
            kind: MessageType::Text,
        }
    }

    #[test]
    fn clock_never_goes_backwards() {
        let clock = MessageClock::new();
        clock.last.store(i64::MAX - 1, Ordering::SeqCst);
        assert_eq!(clock.now_ms(), i64::MAX - 1);

        let fresh = MessageClock::new();
        let mut prev = 0;
        for _ in 0..1000 {
            let ts = fresh.now_ms();
            assert!(ts >= prev);
            prev = ts;
        }
    }

    #[test]
    fn sequential_appends_keep_post_order() {
        let db = Database::open_in_memory().unwrap();
        let clock = MessageClock::new();

        let posted: Vec<Uuid> = (0..20)
            .map(|i| {
                append(&db, &clock, "u-alice", "general", text("general", &format!("m{i}")))
                    .unwrap()
                    .id
            })
            .collect();

        let stored = history(&db, "general", 100, None).unwrap();
        let ids: Vec<Uuid> = stored.iter().map(|m| m.id).collect();
        assert_eq!(ids, posted);
        assert!(stored.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(stored[0].nonce, vec![1, 2, 3]);
        assert_eq!(stored[0].signature, vec![9]);
    }

    #[test]
    fn corrupt_rows_are_skipped() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message(&MessageRow {
            id: "not-a-uuid".into(),
            channel_id: "general".into(),
            sender_id: "u-alice".into(),
            timestamp: 1,
            kind: 1,
            content: vec![],
            nonce: vec![],
            signature: vec![],
        })
        .unwrap();
        let clock = MessageClock::new();
        append(&db, &clock, "u-alice", "general", text("general", "ok")).unwrap();

        let stored = history(&db, "general", 100, None).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, b"ok");
    }
}

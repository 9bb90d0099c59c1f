/// Database row types, mapped directly from SQLite rows.

#[derive(Debug, Clone)]
pub struct ChannelRow {
    pub id: String,
    pub name: String,
    pub kind: String,
}

#[derive(Debug, Clone)]
pub struct MemberRow {
    pub user_id: String,
    pub username: String,
    pub full_name: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub channel_id: String,
    pub sender_id: String,
    pub timestamp: i64,
    pub kind: i64,
    pub content: Vec<u8>,
    pub nonce: Vec<u8>,
    pub signature: Vec<u8>,
}

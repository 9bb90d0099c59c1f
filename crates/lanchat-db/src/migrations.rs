use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Id of the public channel every fresh database starts with.
pub const GENERAL_CHANNEL_ID: &str = "general";

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        // IF NOT EXISTS: the admin console may have created the shared
        // tables before the router ever started.
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                full_name   TEXT
            );

            CREATE TABLE IF NOT EXISTS channels (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                type        TEXT NOT NULL DEFAULT 'public',
                created_at  INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER))
            );

            CREATE INDEX IF NOT EXISTS idx_channels_name ON channels(name);

            CREATE TABLE IF NOT EXISTS channel_members (
                channel_id  TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL,
                PRIMARY KEY (channel_id, user_id)
            );

            CREATE INDEX IF NOT EXISTS idx_channel_members_user
                ON channel_members(user_id);

            CREATE TABLE IF NOT EXISTS messages (
                id          TEXT PRIMARY KEY,
                channel_id  TEXT NOT NULL,
                sender_id   TEXT NOT NULL,
                timestamp   INTEGER NOT NULL,
                type        INTEGER NOT NULL,
                content     BLOB NOT NULL,
                nonce       BLOB NOT NULL,
                signature   BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_channel_timestamp
                ON messages(channel_id, timestamp);

            ",
        )?;
        crate::queries::insert_channel(conn, GENERAL_CHANNEL_ID, "General", "public")?;
        conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
    }

    info!("Database migrations complete");
    Ok(())
}

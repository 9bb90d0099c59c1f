use crate::Database;
use crate::models::{ChannelRow, MemberRow, MessageRow};
use anyhow::{Result, bail};
use rusqlite::{Connection, TransactionBehavior};

/// Display name given to router-created DM channels.
const DM_CHANNEL_NAME: &str = "Direct Message";

/// Audit columns the admin console declares NOT NULL with no default.
/// Whichever of them a table has are stamped with the current Unix time.
const AUDIT_COLUMNS: &[&str] = &["created_at", "updated_at", "joined_at"];

impl Database {
    // -- Users (directory owned by the admin console) --

    pub fn create_user(&self, id: &str, username: &str, full_name: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, full_name) VALUES (?1, ?2, ?3)",
                (id, username, full_name),
            )?;
            Ok(())
        })
    }

    pub fn user_id_by_username(&self, username: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT id FROM users WHERE username = ?1", [username], |row| {
                row.get(0)
            })
            .optional()
        })
    }

    pub fn user_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                [id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    // -- Channels --

    pub fn create_channel(&self, id: &str, name: &str, kind: &str) -> Result<()> {
        self.with_conn(|conn| {
            if insert_channel(conn, id, name, kind)? == 0 {
                bail!("channel {id} already exists");
            }
            Ok(())
        })
    }

    /// Stored type text of a channel, `None` if the channel does not exist.
    pub fn channel_type(&self, id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| query_channel_type(conn, id))
    }

    /// Public channels plus every channel the user is a member of, by name.
    pub fn list_accessible_channels(&self, user_id: &str) -> Result<Vec<ChannelRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, COALESCE(c.type, '')
                 FROM channels c
                 LEFT JOIN channel_members m
                    ON m.channel_id = c.id AND m.user_id = ?1
                 WHERE c.type = 'public' OR m.user_id IS NOT NULL
                 ORDER BY c.name ASC, c.id ASC",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ChannelRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        kind: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Membership --

    /// Set semantics: adding an existing member is a no-op.
    pub fn add_channel_member(&self, channel_id: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            insert_member(conn, channel_id, user_id)?;
            Ok(())
        })
    }

    pub fn remove_channel_member(&self, channel_id: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
                (channel_id, user_id),
            )?;
            Ok(())
        })
    }

    pub fn is_channel_member(&self, channel_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM channel_members WHERE channel_id = ?1 AND user_id = ?2)",
                (channel_id, user_id),
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn channel_member_ids(&self, channel_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT user_id FROM channel_members WHERE channel_id = ?1")?;
            let ids = stmt
                .query_map([channel_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    /// Members joined with the user directory, ordered by username.
    pub fn list_channel_members(&self, channel_id: &str) -> Result<Vec<MemberRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, COALESCE(u.full_name, '')
                 FROM channel_members m
                 JOIN users u ON u.id = m.user_id
                 WHERE m.channel_id = ?1
                 ORDER BY u.username ASC",
            )?;

            let rows = stmt
                .query_map([channel_id], |row| {
                    Ok(MemberRow {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        full_name: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Direct messages --

    /// Find or create the DM channel `dm_id` with exactly `a` and `b` as
    /// members, atomically. Returns true if this call created it.
    ///
    /// A channel that already exists when the transaction runs is success,
    /// not a conflict.
    pub fn find_or_create_dm(&self, dm_id: &str, a: &str, b: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if query_channel_type(&tx, dm_id)?.is_some() {
                tx.commit()?;
                return Ok(false);
            }

            let created = insert_channel(&tx, dm_id, DM_CHANNEL_NAME, "dm")?;
            for user_id in [a, b] {
                insert_member(&tx, dm_id, user_id)?;
            }

            let members: i64 = tx.query_row(
                "SELECT COUNT(*) FROM channel_members WHERE channel_id = ?1 AND user_id IN (?2, ?3)",
                (dm_id, a, b),
                |row| row.get(0),
            )?;
            let expected = if a == b { 1 } else { 2 };
            if query_channel_type(&tx, dm_id)?.is_none() || members != expected {
                bail!("dm channel {dm_id} incomplete after insert ({members} of {expected} members)");
            }

            tx.commit()?;
            Ok(created == 1)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, msg: &MessageRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, channel_id, sender_id, timestamp, type, content, nonce, signature)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    msg.id,
                    msg.channel_id,
                    msg.sender_id,
                    msg.timestamp,
                    msg.kind,
                    msg.content,
                    msg.nonce,
                    msg.signature,
                ],
            )?;
            Ok(())
        })
    }

    /// The newest `limit` messages of a channel (older than `before` when
    /// given), returned oldest first. Ties on timestamp keep insert order.
    pub fn get_messages(
        &self,
        channel_id: &str,
        limit: u32,
        before: Option<i64>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, channel_id, sender_id, timestamp, type, content, nonce, signature
                 FROM (
                    SELECT rowid AS seq, * FROM messages
                    WHERE channel_id = ?1 AND (?2 IS NULL OR timestamp < ?2)
                    ORDER BY timestamp DESC, seq DESC
                    LIMIT ?3
                 )
                 ORDER BY timestamp ASC, seq ASC",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![channel_id, before, limit], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        channel_id: row.get(1)?,
                        sender_id: row.get(2)?,
                        timestamp: row.get(3)?,
                        kind: row.get(4)?,
                        content: row.get(5)?,
                        nonce: row.get(6)?,
                        signature: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

/// A NULL type reads as empty text, which names no channel type.
fn query_channel_type(conn: &Connection, id: &str) -> Result<Option<String>> {
    let kind = conn
        .query_row("SELECT type FROM channels WHERE id = ?1", [id], |row| {
            row.get::<_, Option<String>>(0)
        })
        .optional()?;
    Ok(kind.map(Option::unwrap_or_default))
}

/// Insert a channel unless `id` is taken. Returns the number of rows
/// written; any other constraint failure is an error.
pub(crate) fn insert_channel(conn: &Connection, id: &str, name: &str, kind: &str) -> Result<usize> {
    insert_stamped(conn, "channels", &["id", "name", "type"], &[id, name, kind], "id")
}

/// Insert a membership unless it already exists.
pub(crate) fn insert_member(conn: &Connection, channel_id: &str, user_id: &str) -> Result<usize> {
    insert_stamped(
        conn,
        "channel_members",
        &["channel_id", "user_id"],
        &[channel_id, user_id],
        "channel_id, user_id",
    )
}

/// `INSERT .. ON CONFLICT(key) DO NOTHING`, also filling whichever
/// [`AUDIT_COLUMNS`] the table declares.
fn insert_stamped(
    conn: &Connection,
    table: &str,
    columns: &[&str],
    values: &[&str],
    key: &str,
) -> Result<usize> {
    let mut names: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
    let mut slots: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
    for audit in audit_columns(conn, table)? {
        names.push(audit);
        slots.push("CAST(strftime('%s', 'now') AS INTEGER)".to_string());
    }

    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT({key}) DO NOTHING",
        names.join(", "),
        slots.join(", "),
    );
    Ok(conn.execute(&sql, rusqlite::params_from_iter(values))?)
}

fn audit_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names
        .into_iter()
        .filter(|n| AUDIT_COLUMNS.contains(&n.as_str()))
        .collect())
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

//! Destination resolution and per-operation authorization.
//!
//! Every call re-reads channel type and membership from the store; nothing
//! is cached, so membership changes apply to the very next request.

use lanchat_db::Database;
use lanchat_types::models::ChannelType;
use tracing::{info, warn};

use crate::error::{Result, RouterError};

/// What a destination token names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// An existing channel id.
    Channel(String),
    /// Another existing user; the message goes to the DM with them.
    DmTarget(String),
    /// Neither a channel nor a postable user.
    Missing,
}

/// Canonical DM channel id for an unordered pair of users.
pub fn dm_channel_id(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("dm:{lo}:{hi}")
}

/// Look up a channel's type, `ChannelMissing` if it does not exist.
pub fn channel_type(db: &Database, channel_id: &str) -> Result<ChannelType> {
    let raw = db
        .channel_type(channel_id)?
        .ok_or(RouterError::ChannelMissing)?;

    Ok(raw.parse().unwrap_or_else(|e| {
        // Fail closed: an unrecognised type is treated as membership-gated.
        warn!(channel_id, "{e}, treating as private");
        ChannelType::Private
    }))
}

/// Decide what `token` names from `sender`'s point of view. A token naming
/// the sender themself is `Forbidden`.
pub fn classify(db: &Database, sender_id: &str, token: &str) -> Result<Destination> {
    if token.is_empty() {
        return Ok(Destination::Missing);
    }

    if db.channel_type(token)?.is_some() {
        return Ok(Destination::Channel(token.to_string()));
    }

    if !db.user_exists(token)? {
        return Ok(Destination::Missing);
    }
    if token == sender_id {
        return Err(RouterError::Forbidden);
    }

    Ok(Destination::DmTarget(token.to_string()))
}

/// Resolve a destination token to a concrete channel id, creating the DM
/// channel on first use.
pub fn resolve_destination(db: &Database, sender_id: &str, token: &str) -> Result<String> {
    match classify(db, sender_id, token)? {
        Destination::Channel(id) => Ok(id),
        Destination::DmTarget(target) => find_or_create_dm(db, sender_id, &target),
        Destination::Missing => Err(RouterError::ChannelMissing),
    }
}

/// Converge on the single DM channel for `{a, b}`, whichever side asks first.
pub fn find_or_create_dm(db: &Database, a: &str, b: &str) -> Result<String> {
    let dm_id = dm_channel_id(a, b);
    if db.find_or_create_dm(&dm_id, a, b)? {
        info!(channel_id = %dm_id, "created DM channel");
    }
    Ok(dm_id)
}

/// Public channels admit everyone; private and DM channels admit members only.
pub fn authorize(db: &Database, user_id: &str, channel_id: &str) -> Result<ChannelType> {
    let kind = channel_type(db, channel_id)?;
    if kind.is_public() || db.is_channel_member(channel_id, user_id)? {
        Ok(kind)
    } else {
        Err(RouterError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        for (id, name) in [("u-alice", "alice"), ("u-bob", "bob"), ("u-charlie", "charlie")] {
            db.create_user(id, name, None).unwrap();
        }
        db.create_channel("priv-1", "Private One", "private").unwrap();
        db.add_channel_member("priv-1", "u-alice").unwrap();
        db.add_channel_member("priv-1", "u-bob").unwrap();
        db
    }

    #[test]
    fn dm_id_is_order_independent() {
        assert_eq!(dm_channel_id("u-bob", "u-charlie"), "dm:u-bob:u-charlie");
        assert_eq!(dm_channel_id("u-charlie", "u-bob"), "dm:u-bob:u-charlie");
    }

    #[test]
    fn classify_names_each_outcome() {
        let db = seeded();
        assert_eq!(classify(&db, "u-alice", "").unwrap(), Destination::Missing);
        assert_eq!(
            classify(&db, "u-alice", "general").unwrap(),
            Destination::Channel("general".into())
        );
        assert_eq!(
            classify(&db, "u-alice", "u-bob").unwrap(),
            Destination::DmTarget("u-bob".into())
        );
        assert_eq!(classify(&db, "u-alice", "nobody").unwrap(), Destination::Missing);
        assert!(matches!(
            classify(&db, "u-alice", "u-alice"),
            Err(RouterError::Forbidden)
        ));
    }

    #[test]
    fn tokens_are_not_guessed_from_their_shape() {
        let db = seeded();
        // A user id that looks like a channel name still resolves to a DM.
        db.create_user("channel-7", "seven", None).unwrap();
        let id = resolve_destination(&db, "u-alice", "channel-7").unwrap();
        assert_eq!(id, dm_channel_id("u-alice", "channel-7"));
        assert_eq!(channel_type(&db, &id).unwrap(), ChannelType::Dm);
    }

    #[test]
    fn resolving_a_user_creates_the_dm_once() {
        let db = seeded();
        let first = resolve_destination(&db, "u-bob", "u-charlie").unwrap();
        let second = resolve_destination(&db, "u-charlie", "u-bob").unwrap();
        assert_eq!(first, "dm:u-bob:u-charlie");
        assert_eq!(first, second);
        assert_eq!(channel_type(&db, &first).unwrap(), ChannelType::Dm);

        // Once created, the DM id itself resolves as a channel.
        assert_eq!(resolve_destination(&db, "u-bob", &first).unwrap(), first);
    }

    #[test]
    fn authorize_follows_channel_type_and_membership() {
        let db = seeded();
        assert_eq!(authorize(&db, "u-charlie", "general").unwrap(), ChannelType::Public);
        assert_eq!(authorize(&db, "u-alice", "priv-1").unwrap(), ChannelType::Private);
        assert!(matches!(authorize(&db, "u-charlie", "priv-1"), Err(RouterError::Forbidden)));
        assert!(matches!(authorize(&db, "u-alice", "nope"), Err(RouterError::ChannelMissing)));

        let dm = find_or_create_dm(&db, "u-alice", "u-bob").unwrap();
        assert!(authorize(&db, "u-bob", &dm).is_ok());
        assert!(matches!(authorize(&db, "u-charlie", &dm), Err(RouterError::Forbidden)));
    }

    #[test]
    fn membership_changes_apply_immediately() {
        let db = seeded();
        assert!(authorize(&db, "u-charlie", "priv-1").is_err());
        db.add_channel_member("priv-1", "u-charlie").unwrap();
        assert!(authorize(&db, "u-charlie", "priv-1").is_ok());
        db.remove_channel_member("priv-1", "u-charlie").unwrap();
        assert!(authorize(&db, "u-charlie", "priv-1").is_err());
    }

    #[test]
    fn unknown_channel_type_fails_closed() {
        let db = seeded();
        db.create_channel("odd", "Odd", "announcement").unwrap();
        assert_eq!(channel_type(&db, "odd").unwrap(), ChannelType::Private);
        assert!(matches!(authorize(&db, "u-alice", "odd"), Err(RouterError::Forbidden)));
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Visibility class of a channel. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// Every connected user receives its messages.
    Public,
    /// Only explicit members read or post.
    Private,
    /// Router-created channel with exactly two members.
    Dm,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Dm => "dm",
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, Self::Public)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown channel type: {0}")]
pub struct UnknownChannelType(pub String);

impl FromStr for ChannelType {
    type Err = UnknownChannelType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            "dm" => Ok(Self::Dm),
            other => Err(UnknownChannelType(other.to_string())),
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMember {
    pub id: String,
    pub username: String,
    pub full_name: String,
}

/// Payload class of a message, carried on the wire as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MessageType {
    Text = 1,
    Image = 2,
    File = 3,
    System = 4,
    Voice = 5,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown message type: {0}")]
pub struct UnknownMessageType(pub u8);

impl TryFrom<u8> for MessageType {
    type Error = UnknownMessageType;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Text),
            2 => Ok(Self::Image),
            3 => Ok(Self::File),
            4 => Ok(Self::System),
            5 => Ok(Self::Voice),
            other => Err(UnknownMessageType(other)),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        value as u8
    }
}

/// A persisted message. Content, nonce and signature are opaque to the
/// router: it stores and forwards them without interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub channel_id: String,
    pub sender_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(with = "crate::encoding", default)]
    pub content: Vec<u8>,
    #[serde(with = "crate::encoding", default)]
    pub nonce: Vec<u8>,
    #[serde(with = "crate::encoding", default)]
    pub signature: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_type_round_trips_through_text() {
        for kind in [ChannelType::Public, ChannelType::Private, ChannelType::Dm] {
            assert_eq!(kind.as_str().parse::<ChannelType>().unwrap(), kind);
        }
        assert!("group".parse::<ChannelType>().is_err());
    }

    #[test]
    fn message_type_rejects_unknown_values() {
        assert_eq!(serde_json::from_str::<MessageType>("5").unwrap(), MessageType::Voice);
        assert!(serde_json::from_str::<MessageType>("0").is_err());
        assert!(serde_json::from_str::<MessageType>("6").is_err());
    }

    #[test]
    fn message_serializes_with_wire_names() {
        let msg = Message {
            id: Uuid::nil(),
            channel_id: "general".into(),
            sender_id: "u-alice".into(),
            timestamp: 42,
            kind: MessageType::Text,
            content: b"hi".to_vec(),
            nonce: vec![],
            signature: vec![],
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], 1);
        assert_eq!(value["content"], "aGk=");
        assert_eq!(value["nonce"], "");
        assert_eq!(value["channel_id"], "general");
    }
}

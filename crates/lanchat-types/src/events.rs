use serde::{Deserialize, Serialize};

use crate::models::{Message, MessageType};

/// Frame sent FROM client TO server on the live connection, and the body of
/// `POST /send`.
///
/// `channel_id` is a destination token: either an existing channel id or the
/// id of another user, in which case the message goes to the DM with them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendRequest {
    pub channel_id: String,
    #[serde(with = "crate::encoding", default)]
    pub content: Vec<u8>,
    #[serde(with = "crate::encoding", default)]
    pub nonce: Vec<u8>,
    #[serde(with = "crate::encoding", default)]
    pub signature: Vec<u8>,
    #[serde(rename = "type")]
    pub kind: MessageType,
}

impl SendRequest {
    pub fn decode(raw: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(raw)
    }
}

/// Frames sent FROM server TO client on the live connection.
///
/// A delivered message is the bare persisted record so existing clients keep
/// working; errors are wrapped in an `error` object and only sent when
/// error acknowledgments are enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Error(ErrorFrame),
    Message(Message),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Malformed,
    ChannelMissing,
    Forbidden,
    StorageFailure,
}

impl ErrorFrame {
    pub fn new(code: ErrorCode, channel_id: Option<String>) -> Self {
        Self {
            error: ErrorDetail { code, channel_id },
        }
    }
}

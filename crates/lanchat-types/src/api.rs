use serde::{Deserialize, Serialize};

use crate::models::{Channel, ChannelMember};

// -- JWT Claims --

/// Bearer token claims issued by the auth service. The router only trusts the
/// username; the stable user id is looked up in the shared user directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub exp: usize,
}

// -- Channels --

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelsResponse {
    pub channels: Vec<Channel>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MembersResponse {
    pub members: Vec<ChannelMember>,
}

// -- Direct messages --

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CreateDmRequest {
    pub target_user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateDmResponse {
    pub channel_id: String,
}

// -- Send --

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub message_id: String,
    pub success: bool,
}

/// Body of every non-2xx JSON response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

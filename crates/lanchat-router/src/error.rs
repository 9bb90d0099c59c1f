use lanchat_types::events::ErrorCode;

/// Failures of a single router operation. Transport failures and slow
/// consumers are handled inside the connection loop and the registry and
/// never surface here.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("channel not found")]
    ChannelMissing,

    #[error("forbidden")]
    Forbidden,

    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("encoding failure: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl RouterError {
    /// Code reported in the optional live-path error acknowledgment.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ChannelMissing => ErrorCode::ChannelMissing,
            Self::Forbidden => ErrorCode::Forbidden,
            Self::Storage(_) | Self::Encoding(_) => ErrorCode::StorageFailure,
        }
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;

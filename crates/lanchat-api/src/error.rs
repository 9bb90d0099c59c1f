use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use lanchat_router::RouterError;
use lanchat_types::api::ErrorBody;
use tracing::error;

/// Error type for every HTTP handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthenticated,

    #[error("{0}")]
    BadRequest(&'static str),

    #[error(transparent)]
    Router(#[from] RouterError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Router(RouterError::ChannelMissing) => StatusCode::NOT_FOUND,
            Self::Router(RouterError::Forbidden) => StatusCode::FORBIDDEN,
            Self::Router(RouterError::Storage(_) | RouterError::Encoding(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the log.
        let message = if status.is_server_error() {
            error!("request failed: {}", self);
            "internal error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

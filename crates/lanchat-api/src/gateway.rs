use axum::{
    Extension,
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, info};

use lanchat_router::connection;

use crate::auth::{AppState, AuthUser};

/// `GET /ws`: upgrade an already authenticated request to a live connection.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    info!(user_id = %user.user_id, username = %user.username, "upgrading live connection");
    let router = state.router.clone();
    let opts = state.connection;
    ws.on_upgrade(move |socket| connection::handle_connection(socket, router, user.user_id, opts))
}

/// `GET /health`: 200 while the store answers, 503 otherwise.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db = state.router.db().clone();
    match tokio::task::spawn_blocking(move || db.ping()).await {
        Ok(Ok(())) => (StatusCode::OK, "ok"),
        Ok(Err(e)) => {
            error!("health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    }
}

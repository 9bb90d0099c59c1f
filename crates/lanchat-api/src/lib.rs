//! HTTP and WebSocket surface of the messaging router.

pub mod auth;
pub mod channels;
pub mod error;
pub mod gateway;
pub mod messages;
pub mod middleware;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use auth::{AppState, AppStateInner, AuthUser};
pub use error::ApiError;

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(gateway::health))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/ws", get(gateway::ws_upgrade))
        .route("/history", get(messages::history))
        .route("/send", post(messages::send))
        .route("/channels", get(channels::list_channels))
        .route("/channel-members", get(channels::list_members))
        .route("/dm", post(channels::create_dm))
        .layer(from_fn_with_state(state.clone(), auth::require_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(from_fn(middleware::request_id))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

//! Process wiring for the messaging router: configuration, store, router
//! and HTTP application.

pub mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tracing::{info, warn};

use lanchat_api::AppStateInner;
use lanchat_db::Database;
use lanchat_router::connection::ConnectionOptions;
use lanchat_router::{MessageRouter, RouterConfig};

use crate::config::Config;

/// Open the store and assemble the application for `config`. The router
/// handle is returned alongside so the caller can inspect live connections.
pub fn build_app(config: &Config) -> Result<(Router, MessageRouter)> {
    if config.has_placeholder_secret() {
        warn!("JWT secret is unset or still a placeholder; set LANCHAT_JWT_SECRET");
    }

    if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }
    let db = Arc::new(Database::open(&config.db_path)?);

    let router = MessageRouter::new(
        db,
        RouterConfig {
            queue_capacity: config.outbound_queue,
            history_limit: config.history_limit,
        },
    );

    info!(
        queue_capacity = config.outbound_queue,
        history_limit = config.history_limit,
        heartbeat_secs = config.heartbeat.as_secs(),
        error_acks = config.error_acks,
        "message router ready"
    );

    let app = lanchat_api::app(Arc::new(AppStateInner {
        router: router.clone(),
        jwt_secret: config.jwt_secret.clone(),
        connection: ConnectionOptions {
            heartbeat: config.heartbeat,
            error_acks: config.error_acks,
        },
    }));
    Ok((app, router))
}

use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use tracing::debug;

use lanchat_router::MessageRouter;
use lanchat_router::connection::ConnectionOptions;
use lanchat_types::api::Claims;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub router: MessageRouter,
    pub jwt_secret: String,
    pub connection: ConnectionOptions,
}

/// Identity of the caller, inserted into request extensions by
/// [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Bearer token from the `Authorization` header, falling back to the
/// `token` query parameter (browsers cannot set headers on an upgrade).
fn bearer_token(req: &Request) -> Option<String> {
    if let Some(Authorization(bearer)) = req.headers().typed_get::<Authorization<Bearer>>() {
        return Some(bearer.token().to_string());
    }
    Query::<TokenQuery>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.is_empty())
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        debug!("rejected bearer token: {}", e);
        ApiError::Unauthenticated
    })
}

/// Validate the bearer token and resolve its username to a user id.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&req).ok_or(ApiError::Unauthenticated)?;
    let claims = verify_token(&state.jwt_secret, &token)?;

    let user_id = state
        .router
        .user_id_for(&claims.username)
        .await?
        .ok_or_else(|| {
            debug!(username = %claims.username, "token for unknown user");
            ApiError::Unauthenticated
        })?;

    req.extensions_mut().insert(AuthUser {
        user_id,
        username: claims.username,
    });
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn token(secret: &str, username: &str, exp_offset_secs: i64) -> String {
        let claims = Claims {
            username: username.into(),
            role: Some("employee".into()),
            exp: (chrono::Utc::now().timestamp() + exp_offset_secs) as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn valid_token_yields_claims() {
        let claims = verify_token("s3cret", &token("s3cret", "alice", 3600)).unwrap();
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role.as_deref(), Some("employee"));
    }

    #[test]
    fn wrong_secret_and_expired_tokens_are_rejected() {
        assert!(matches!(
            verify_token("other", &token("s3cret", "alice", 3600)),
            Err(ApiError::Unauthenticated)
        ));
        assert!(matches!(
            verify_token("s3cret", &token("s3cret", "alice", -3600)),
            Err(ApiError::Unauthenticated)
        ));
        assert!(verify_token("s3cret", "garbage").is_err());
    }

    #[test]
    fn token_is_taken_from_header_then_query() {
        let req = Request::builder()
            .uri("/history?token=from-query")
            .header("authorization", "Bearer from-header")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&req).as_deref(), Some("from-header"));

        let req = Request::builder()
            .uri("/ws?token=from-query")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&req).as_deref(), Some("from-query"));

        let req = Request::builder()
            .uri("/ws?token=")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&req), None);
    }
}

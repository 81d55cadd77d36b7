//! services/host/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::web::state::{AppState, AuthedUser};

/// Middleware that resolves the caller's access token to a user.
///
/// The token comes from `Authorization: Bearer`, or from an `access_token`
/// query parameter for WebSocket clients that cannot set headers. On success an
/// `AuthedUser` is inserted into the request extensions; otherwise 401.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let access_token = bearer_token(req.headers().get(header::AUTHORIZATION))
        .or_else(|| query_token(req.uri().query()))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let user = state.auth.user_for_token(&access_token).await.map_err(|e| {
        warn!("Rejected access token: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    req.extensions_mut().insert(AuthedUser { user, access_token });
    Ok(next.run(req).await)
}

pub(crate) fn bearer_token(value: Option<&header::HeaderValue>) -> Option<String> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn query_token(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("access_token="))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

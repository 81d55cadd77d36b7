//! services/host/src/web/auth.rs
//!
//! Authentication endpoints: signup, login, logout, session restore and the
//! username availability check used during onboarding.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use unveil_core::account::AccountError;
use unveil_core::domain::AuthSession;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::middleware::bearer_token;
use crate::web::rest::port_status;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Proof that the caller owns the stored session: the refresh token it was
/// issued with.
#[derive(Deserialize, ToSchema)]
pub struct RestoreRequest {
    pub user_id: Uuid,
    pub refresh_token: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<AuthSession> for AuthResponse {
    fn from(session: AuthSession) -> Self {
        Self {
            user_id: session.user.id,
            email: session.user.email,
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            expires_at: session.expires_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct UsernameAvailability {
    pub username: String,
    pub available: bool,
}

pub(crate) fn account_failure(context: &str, e: AccountError) -> (StatusCode, String) {
    let status = match &e {
        AccountError::Invalid(_) => StatusCode::BAD_REQUEST,
        AccountError::UsernameTaken => StatusCode::CONFLICT,
        AccountError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AccountError::Port(port) => port_status(port),
    };
    if status.is_server_error() {
        error!("{}: {}", context, e);
    } else {
        warn!("{}: {}", context, e);
    }
    (status, e.to_string())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid email or password"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = state
        .accounts(None)
        .sign_up(&req.email, &req.password, &req.password_confirmation)
        .await
        .map_err(|e| account_failure("Sign-up failed", e))?;
    Ok((StatusCode::CREATED, Json(AuthResponse::from(session))))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = state
        .accounts(None)
        .sign_in(&req.email, &req.password)
        .await
        .map_err(|e| account_failure("Sign-in failed", e))?;
    Ok(Json(AuthResponse::from(session)))
}

/// POST /auth/logout - Revoke the token and forget the stored session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Logout successful"),
        (status = 401, description = "No bearer token")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let token = bearer_token(headers.get(header::AUTHORIZATION))
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;
    state
        .accounts(None)
        .sign_out(&token)
        .await
        .map_err(|e| account_failure("Sign-out failed", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /auth/session - The caller's stored session, refreshed if it had expired
#[utoipa::path(
    post,
    path = "/auth/session",
    request_body = RestoreRequest,
    responses(
        (status = 200, description = "A usable session was restored", body = AuthResponse),
        (status = 401, description = "No stored session for this user and token")
    )
)]
pub async fn restore_session_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RestoreRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .accounts(None)
        .restore_session(req.user_id, &req.refresh_token)
        .await
        .map_err(|e| account_failure("Session restore failed", e))?
        .map(|session| Json(AuthResponse::from(session)))
        .ok_or((StatusCode::UNAUTHORIZED, "Not signed in".to_string()))
}

/// GET /auth/username-available/{username}
#[utoipa::path(
    get,
    path = "/auth/username-available/{username}",
    params(("username" = String, Path, description = "3-20 letters, digits or underscores")),
    responses(
        (status = 200, description = "Availability checked", body = UsernameAvailability),
        (status = 400, description = "Malformed username")
    )
)]
pub async fn username_available_handler(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let available = state
        .accounts(None)
        .check_username(&username)
        .await
        .map_err(|e| account_failure("Username check failed", e))?;
    Ok(Json(UsernameAvailability {
        username,
        available,
    }))
}

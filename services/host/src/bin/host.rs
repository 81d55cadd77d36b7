//! services/host/src/bin/host.rs

use host_lib::{
    adapters::{FileSessionStorage, SupabaseAuth, SupabaseClient},
    config::Config,
    error::HostError,
    web::{
        auth::{
            login_handler, logout_handler, restore_session_handler, signup_handler,
            username_available_handler,
        },
        require_auth,
        rest::{
            artist_detail_handler, artist_history_handler, follow_artist_handler,
            get_preferences_handler, leaderboard_handler, onboarding_handler, profile_handler,
            put_preferences_handler, track_audio_handler, track_history_handler,
            unfollow_artist_handler, ApiDoc,
        },
        state::AppState,
        ws_handler,
    },
};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, RANGE},
    HeaderValue, Method,
};
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

#[tokio::main]
async fn main() -> Result<(), HostError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Initialize Backend Adapters ---
    let supabase = SupabaseClient::new(
        &config.supabase_url,
        &config.supabase_anon_key,
        config.request_timeout,
    )?;
    let auth = Arc::new(SupabaseAuth::new(supabase.clone()));
    let session_storage = Arc::new(FileSessionStorage::new(config.session_store_dir.clone()));

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        config: config.clone(),
        supabase,
        auth,
        session_storage,
    });

    let origin = config.allowed_origin.parse::<HeaderValue>().map_err(|e| {
        HostError::Internal(format!(
            "ALLOWED_ORIGIN '{}' is not a valid header value: {}",
            config.allowed_origin, e
        ))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT, RANGE]);

    // --- 4. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/session", post(restore_session_handler))
        .route("/auth/username-available/{username}", get(username_available_handler))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/onboarding", post(onboarding_handler))
        .route("/profile", get(profile_handler))
        .route(
            "/preferences",
            get(get_preferences_handler).put(put_preferences_handler),
        )
        .route("/leaderboard", get(leaderboard_handler))
        .route("/history/tracks", get(track_history_handler))
        .route("/history/artists", get(artist_history_handler))
        .route("/artists/{id}", get(artist_detail_handler))
        .route("/tracks/{id}/audio", get(track_audio_handler))
        .route(
            "/artists/{id}/follow",
            post(follow_artist_handler).delete(unfollow_artist_handler),
        )
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "OpenAPI document available at http://{}/api-docs/openapi.json",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! services/host/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI document.

use crate::web::auth::{
    account_failure, AuthResponse, LoginRequest, RestoreRequest, SignupRequest,
    UsernameAvailability,
};
use crate::web::state::{AppState, AuthedUser};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use unveil_core::account::Onboarding;
use unveil_core::artist_detail::fetch_artist_detail;
use unveil_core::domain::{
    Artist, FollowedArtist, LeaderboardEntry, Profile, RatedTrack, StreamingLinks,
    StreamingPlatform, StreamingPreferences, Track, UserPreferences,
};
use unveil_core::history::{
    available_artist_genres, available_genres, available_moods, filter_and_sort_artists,
    filter_and_sort_tracks, ArtistFilter, ArtistSort, ArtistSortKey, SortOrder, TrackFilter,
    TrackSort, TrackSortKey,
};
use unveil_core::ports::PortError;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::auth::signup_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
        crate::web::auth::restore_session_handler,
        crate::web::auth::username_available_handler,
        onboarding_handler,
        profile_handler,
        get_preferences_handler,
        put_preferences_handler,
        leaderboard_handler,
        track_history_handler,
        artist_history_handler,
        artist_detail_handler,
        follow_artist_handler,
        unfollow_artist_handler,
        track_audio_handler,
    ),
    components(schemas(
        SignupRequest,
        LoginRequest,
        RestoreRequest,
        AuthResponse,
        UsernameAvailability,
        OnboardingRequest,
        PreferencesBody,
        StreamingBody,
        PreferencesResponse,
        ProfileView,
        LeaderboardEntryView,
        TrackView,
        ArtistView,
        LinksView,
        RatedTrackView,
        FollowedArtistView,
        TrackHistoryResponse,
        ArtistHistoryResponse,
        ArtistDetailResponse,
    )),
    tags(
        (name = "Unveil API", description = "Accounts, preferences, history and artists for the discovery app.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Error Mapping
//=========================================================================================

pub(crate) fn port_status(e: &PortError) -> StatusCode {
    match e {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Conflict(_) => StatusCode::CONFLICT,
        PortError::Unauthorized => StatusCode::UNAUTHORIZED,
        PortError::Validation(_) => StatusCode::BAD_REQUEST,
        PortError::Network(_) => StatusCode::BAD_GATEWAY,
        PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn port_failure(context: &str, e: PortError) -> (StatusCode, String) {
    let status = port_status(&e);
    if status.is_server_error() {
        error!("{}: {}", context, e);
        (status, format!("{context}. Please try again."))
    } else {
        warn!("{}: {}", context, e);
        (status, e.to_string())
    }
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, Deserialize, ToSchema, Default, Clone)]
pub struct PreferencesBody {
    #[serde(default)]
    pub preferred_genres: Vec<String>,
    #[serde(default)]
    pub preferred_moods: Vec<String>,
    pub min_duration_secs: Option<u32>,
    pub max_duration_secs: Option<u32>,
}

impl From<PreferencesBody> for UserPreferences {
    fn from(body: PreferencesBody) -> Self {
        UserPreferences {
            preferred_genres: body.preferred_genres,
            preferred_moods: body.preferred_moods,
            min_duration_secs: body.min_duration_secs,
            max_duration_secs: body.max_duration_secs,
        }
    }
}

impl From<UserPreferences> for PreferencesBody {
    fn from(prefs: UserPreferences) -> Self {
        PreferencesBody {
            preferred_genres: prefs.preferred_genres,
            preferred_moods: prefs.preferred_moods,
            min_duration_secs: prefs.min_duration_secs,
            max_duration_secs: prefs.max_duration_secs,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Clone)]
pub struct StreamingBody {
    /// spotify, apple_music, youtube, soundcloud or bandcamp.
    #[schema(value_type = Vec<String>)]
    pub platforms: Vec<StreamingPlatform>,
    #[schema(value_type = Option<String>)]
    pub primary: Option<StreamingPlatform>,
}

impl StreamingBody {
    fn for_user(self, user_id: Uuid) -> StreamingPreferences {
        StreamingPreferences {
            user_id,
            platforms: self.platforms,
            primary: self.primary,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct OnboardingRequest {
    pub username: String,
    #[serde(default)]
    pub preferences: PreferencesBody,
    pub streaming: Option<StreamingBody>,
}

#[derive(Serialize, ToSchema)]
pub struct PreferencesResponse {
    pub preferences: Option<PreferencesBody>,
    pub streaming: Option<StreamingBody>,
}

#[derive(Serialize, ToSchema)]
pub struct ProfileView {
    pub id: Uuid,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub onboarding_completed: bool,
}

impl From<Profile> for ProfileView {
    fn from(p: Profile) -> Self {
        Self {
            id: p.id,
            username: p.username,
            display_name: p.display_name,
            onboarding_completed: p.onboarding_completed,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct LeaderboardEntryView {
    pub rank: u32,
    pub display_name: String,
    pub total_xp: u64,
    pub is_current_user: bool,
}

impl From<LeaderboardEntry> for LeaderboardEntryView {
    fn from(e: LeaderboardEntry) -> Self {
        Self {
            rank: e.rank,
            display_name: e.display_name,
            total_xp: e.total_xp,
            is_current_user: e.is_current_user,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct LinksView {
    pub spotify: Option<String>,
    pub apple_music: Option<String>,
    pub youtube: Option<String>,
    pub soundcloud: Option<String>,
    pub bandcamp: Option<String>,
}

impl From<StreamingLinks> for LinksView {
    fn from(l: StreamingLinks) -> Self {
        Self {
            spotify: l.spotify,
            apple_music: l.apple_music,
            youtube: l.youtube,
            soundcloud: l.soundcloud,
            bandcamp: l.bandcamp,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ArtistView {
    pub id: Uuid,
    pub name: String,
    pub bio: Option<String>,
    pub image_url: Option<String>,
    pub genres: Vec<String>,
    pub links: LinksView,
}

impl From<Artist> for ArtistView {
    fn from(a: Artist) -> Self {
        Self {
            id: a.id,
            name: a.name,
            bio: a.bio,
            image_url: a.image_url,
            genres: a.genres,
            links: a.links.into(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct TrackView {
    pub id: Uuid,
    pub title: String,
    pub artist: ArtistView,
    pub genre: String,
    pub mood: String,
    pub duration_secs: Option<u32>,
    pub artwork_url: Option<String>,
}

impl From<Track> for TrackView {
    fn from(t: Track) -> Self {
        Self {
            id: t.id,
            title: t.title,
            artist: t.artist.into(),
            genre: t.genre,
            mood: t.mood,
            duration_secs: t.duration_secs,
            artwork_url: t.artwork_url,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct RatedTrackView {
    pub track: TrackView,
    pub rating: u8,
    pub review_text: Option<String>,
    pub rated_at: DateTime<Utc>,
}

impl From<RatedTrack> for RatedTrackView {
    fn from(r: RatedTrack) -> Self {
        Self {
            track: r.track.into(),
            rating: r.rating.value(),
            review_text: r.review_text,
            rated_at: r.rated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct FollowedArtistView {
    pub artist: ArtistView,
    pub discovered_track_id: Option<Uuid>,
    pub subscribed_at: DateTime<Utc>,
}

impl From<FollowedArtist> for FollowedArtistView {
    fn from(f: FollowedArtist) -> Self {
        Self {
            artist: f.artist.into(),
            discovered_track_id: f.discovered_track_id,
            subscribed_at: f.subscribed_at,
        }
    }
}

/// The filtered list plus every value the filter chips can offer.
#[derive(Serialize, ToSchema)]
pub struct TrackHistoryResponse {
    pub tracks: Vec<RatedTrackView>,
    pub genres: Vec<String>,
    pub moods: Vec<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ArtistHistoryResponse {
    pub artists: Vec<FollowedArtistView>,
    pub genres: Vec<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ArtistDetailResponse {
    pub artist: ArtistView,
    pub is_following: bool,
    /// The link for the user's primary platform, or any known link.
    pub preferred_link: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct TrackHistoryQuery {
    pub genre: Option<String>,
    pub mood: Option<String>,
    /// date, title, artist or rating
    #[param(value_type = Option<String>)]
    pub sort: Option<TrackSortKey>,
    /// ascending or descending
    #[param(value_type = Option<String>)]
    pub order: Option<SortOrder>,
}

#[derive(Deserialize, IntoParams)]
pub struct ArtistHistoryQuery {
    /// Comma-separated genres; an artist matches if it has any of them.
    pub genre: Option<String>,
    /// date or name
    #[param(value_type = Option<String>)]
    pub sort: Option<ArtistSortKey>,
    #[param(value_type = Option<String>)]
    pub order: Option<SortOrder>,
}

impl ArtistHistoryQuery {
    fn filter(&self) -> ArtistFilter {
        let genres: BTreeSet<String> = self
            .genre
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect();
        ArtistFilter { genres }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Finish onboarding: username, taste preferences and streaming platforms.
#[utoipa::path(
    post,
    path = "/onboarding",
    request_body = OnboardingRequest,
    responses(
        (status = 200, description = "Onboarding completed", body = ProfileView),
        (status = 400, description = "Malformed username"),
        (status = 409, description = "Username already taken")
    )
)]
pub async fn onboarding_handler(
    State(state): State<Arc<AppState>>,
    Extension(authed): Extension<AuthedUser>,
    Json(req): Json<OnboardingRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = authed.user.id;
    let onboarding = Onboarding {
        username: req.username.trim().to_string(),
        preferences: req.preferences.into(),
        streaming: req.streaming.map(|s| s.for_user(user_id)),
    };
    let profile = state
        .accounts(Some(&authed.access_token))
        .complete_onboarding(&authed.access_token, user_id, &onboarding)
        .await
        .map_err(|e| account_failure("Onboarding failed", e))?;
    Ok(Json(ProfileView::from(profile)))
}

/// The signed-in user's profile, used to decide whether onboarding is still due.
#[utoipa::path(
    get,
    path = "/profile",
    responses(
        (status = 200, description = "The user's profile", body = ProfileView),
        (status = 404, description = "No profile row for this user")
    )
)]
pub async fn profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(authed): Extension<AuthedUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let profile = state
        .auth
        .get_profile(&authed.access_token, authed.user.id)
        .await
        .map_err(|e| port_failure("Failed to load profile", e))?;
    Ok(Json(ProfileView::from(profile)))
}

#[utoipa::path(
    get,
    path = "/preferences",
    responses((status = 200, description = "Stored preferences", body = PreferencesResponse))
)]
pub async fn get_preferences_handler(
    State(state): State<Arc<AppState>>,
    Extension(authed): Extension<AuthedUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let store = state.ports_for(&authed.access_token).session.preferences;
    let preferences = store
        .get_preferences(authed.user.id)
        .await
        .map_err(|e| port_failure("Failed to load preferences", e))?;
    let streaming = store
        .get_streaming_preferences(authed.user.id)
        .await
        .map_err(|e| port_failure("Failed to load streaming preferences", e))?;
    Ok(Json(PreferencesResponse {
        preferences: preferences.map(PreferencesBody::from),
        streaming: streaming.map(|s| StreamingBody {
            platforms: s.platforms,
            primary: s.primary,
        }),
    }))
}

#[utoipa::path(
    put,
    path = "/preferences",
    request_body = PreferencesBody,
    responses(
        (status = 204, description = "Preferences saved"),
        (status = 400, description = "Minimum duration exceeds maximum")
    )
)]
pub async fn put_preferences_handler(
    State(state): State<Arc<AppState>>,
    Extension(authed): Extension<AuthedUser>,
    Json(body): Json<PreferencesBody>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let (Some(min), Some(max)) = (body.min_duration_secs, body.max_duration_secs) {
        if min > max {
            return Err((
                StatusCode::BAD_REQUEST,
                "Minimum duration cannot exceed the maximum".to_string(),
            ));
        }
    }
    state
        .ports_for(&authed.access_token)
        .session
        .preferences
        .upsert_preferences(authed.user.id, &body.into())
        .await
        .map_err(|e| port_failure("Failed to save preferences", e))?;
    info!("Preferences updated for user {}", authed.user.id);
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/leaderboard",
    responses((status = 200, description = "Ranking around the user", body = [LeaderboardEntryView]))
)]
pub async fn leaderboard_handler(
    State(state): State<Arc<AppState>>,
    Extension(authed): Extension<AuthedUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let entries = state
        .ports_for(&authed.access_token)
        .session
        .gamification
        .leaderboard(authed.user.id)
        .await
        .map_err(|e| port_failure("Failed to load the leaderboard", e))?;
    let views: Vec<LeaderboardEntryView> = entries.into_iter().map(Into::into).collect();
    Ok(Json(views))
}

#[utoipa::path(
    get,
    path = "/history/tracks",
    params(TrackHistoryQuery),
    responses((status = 200, description = "Rated tracks", body = TrackHistoryResponse))
)]
pub async fn track_history_handler(
    State(state): State<Arc<AppState>>,
    Extension(authed): Extension<AuthedUser>,
    Query(query): Query<TrackHistoryQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let history = state
        .ports_for(&authed.access_token)
        .session
        .ratings
        .rating_history(authed.user.id)
        .await
        .map_err(|e| port_failure("Failed to load rated tracks", e))?;

    let genres = available_genres(&history);
    let moods = available_moods(&history);
    let filter = TrackFilter {
        genre: query.genre.filter(|g| !g.is_empty()),
        mood: query.mood.filter(|m| !m.is_empty()),
    };
    let sort = TrackSort {
        key: query.sort.unwrap_or_default(),
        order: query.order.unwrap_or_default(),
    };
    let tracks = filter_and_sort_tracks(&history, &filter, sort)
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(Json(TrackHistoryResponse {
        tracks,
        genres,
        moods,
    }))
}

#[utoipa::path(
    get,
    path = "/history/artists",
    params(ArtistHistoryQuery),
    responses((status = 200, description = "Followed artists", body = ArtistHistoryResponse))
)]
pub async fn artist_history_handler(
    State(state): State<Arc<AppState>>,
    Extension(authed): Extension<AuthedUser>,
    Query(query): Query<ArtistHistoryQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let followed = state
        .ports_for(&authed.access_token)
        .session
        .artists
        .followed_artists(authed.user.id)
        .await
        .map_err(|e| port_failure("Failed to load followed artists", e))?;

    let genres = available_artist_genres(&followed);
    let sort = ArtistSort {
        key: query.sort.unwrap_or_default(),
        order: query.order.unwrap_or_default(),
    };
    let artists = filter_and_sort_artists(&followed, &query.filter(), sort)
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(Json(ArtistHistoryResponse { artists, genres }))
}

#[utoipa::path(
    get,
    path = "/artists/{id}",
    params(("id" = Uuid, Path, description = "Artist id")),
    responses(
        (status = 200, description = "Artist detail", body = ArtistDetailResponse),
        (status = 404, description = "No such artist")
    )
)]
pub async fn artist_detail_handler(
    State(state): State<Arc<AppState>>,
    Extension(authed): Extension<AuthedUser>,
    Path(artist_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let ports = state.ports_for(&authed.access_token);

    let detail = fetch_artist_detail(ports.session.artists.as_ref(), authed.user.id, artist_id)
        .await
        .map_err(|e| port_failure("Failed to load the artist", e))?;

    let primary = match ports
        .session
        .preferences
        .get_streaming_preferences(authed.user.id)
        .await
    {
        Ok(prefs) => prefs.and_then(|p| p.primary),
        Err(e) => {
            warn!("Streaming preferences unavailable, using any link: {}", e);
            None
        }
    };
    let preferred_link = detail.artist.links.preferred(primary).map(str::to_string);

    Ok(Json(ArtistDetailResponse {
        artist: detail.artist.into(),
        is_following: detail.is_following,
        preferred_link,
    }))
}

#[utoipa::path(
    post,
    path = "/artists/{id}/follow",
    params(("id" = Uuid, Path, description = "Artist id")),
    responses((status = 204, description = "Following"))
)]
pub async fn follow_artist_handler(
    State(state): State<Arc<AppState>>,
    Extension(authed): Extension<AuthedUser>,
    Path(artist_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let result = state
        .ports_for(&authed.access_token)
        .session
        .artists
        .follow_artist(authed.user.id, artist_id, None)
        .await;
    match result {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) if e.is_conflict() => Ok(StatusCode::NO_CONTENT),
        Err(e) => Err(port_failure("Failed to follow the artist", e)),
    }
}

#[utoipa::path(
    delete,
    path = "/artists/{id}/follow",
    params(("id" = Uuid, Path, description = "Artist id")),
    responses((status = 204, description = "No longer following"))
)]
pub async fn unfollow_artist_handler(
    State(state): State<Arc<AppState>>,
    Extension(authed): Extension<AuthedUser>,
    Path(artist_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .ports_for(&authed.access_token)
        .session
        .artists
        .unfollow_artist(authed.user.id, artist_id)
        .await
        .map_err(|e| port_failure("Failed to unfollow the artist", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Upstream headers a media element needs for seeking.
const RELAYED_AUDIO_HEADERS: [header::HeaderName; 4] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::CONTENT_RANGE,
    header::ACCEPT_RANGES,
];

fn relayed_audio_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for name in RELAYED_AUDIO_HEADERS {
        if let Some(value) = upstream.get(&name) {
            headers.insert(name, value.clone());
        }
    }
    headers
}

/// Streams a track's audio through the host, so the UI never learns where the
/// file lives (its path names the artist).
#[utoipa::path(
    get,
    path = "/tracks/{id}/audio",
    params(("id" = Uuid, Path, description = "Track id")),
    responses(
        (status = 200, description = "Audio stream"),
        (status = 206, description = "Requested byte range"),
        (status = 404, description = "No such track")
    )
)]
pub async fn track_audio_handler(
    State(state): State<Arc<AppState>>,
    Extension(authed): Extension<AuthedUser>,
    Path(track_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, (StatusCode, String)> {
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let upstream = state
        .ports_for(&authed.access_token)
        .streams
        .open_audio(track_id, range)
        .await
        .map_err(|e| port_failure("Failed to open the track audio", e))?;

    let status = upstream.status();
    let relayed = relayed_audio_headers(upstream.headers());
    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = relayed;
    Ok(response)
}

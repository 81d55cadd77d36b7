//! crates/unveil_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture: the discovery
//! session, the audio adapter and the account flows only ever talk to the hosted
//! backend and to the platform media primitive through them.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Artist, AuthSession, FollowedArtist, GamificationReward, LeaderboardEntry, Profile,
    RatedTrack, Rating, RatingSubmission, StreamingPreferences, Track, User, UserPreferences,
};
use crate::query::TrackQuery;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., HTTP, media).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The backend rejected a write because the row already exists.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Rejected by the backend: {0}")]
    Validation(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, PortError::Conflict(_))
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Remote Data Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait TrackCatalog: Send + Sync {
    /// Returns up to `query.limit` tracks matching the query, in backend order.
    async fn fetch_candidates(&self, query: &TrackQuery) -> PortResult<Vec<Track>>;
}

#[async_trait]
pub trait StreamCounter: Send + Sync {
    async fn increment_track_streams(&self, track_id: Uuid) -> PortResult<()>;
}

#[async_trait]
pub trait RatingStore: Send + Sync {
    /// Inserts a rating. A second rating for the same (user, track) fails with
    /// `PortError::Conflict`.
    async fn submit_rating(&self, rating: &Rating) -> PortResult<()>;

    async fn rated_track_ids(&self, user_id: Uuid) -> PortResult<Vec<Uuid>>;

    async fn rating_history(&self, user_id: Uuid) -> PortResult<Vec<RatedTrack>>;
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get_preferences(&self, user_id: Uuid) -> PortResult<Option<UserPreferences>>;

    async fn upsert_preferences(&self, user_id: Uuid, prefs: &UserPreferences) -> PortResult<()>;

    async fn get_streaming_preferences(
        &self,
        user_id: Uuid,
    ) -> PortResult<Option<StreamingPreferences>>;

    async fn upsert_streaming_preferences(&self, prefs: &StreamingPreferences) -> PortResult<()>;
}

#[async_trait]
pub trait ArtistStore: Send + Sync {
    async fn get_artist(&self, artist_id: Uuid) -> PortResult<Artist>;

    async fn follow_artist(
        &self,
        user_id: Uuid,
        artist_id: Uuid,
        discovered_track_id: Option<Uuid>,
    ) -> PortResult<()>;

    async fn unfollow_artist(&self, user_id: Uuid, artist_id: Uuid) -> PortResult<()>;

    async fn is_following(&self, user_id: Uuid, artist_id: Uuid) -> PortResult<bool>;

    async fn followed_artists(&self, user_id: Uuid) -> PortResult<Vec<FollowedArtist>>;
}

/// XP, badges and ranking are computed by remote procedures; the client only displays them.
#[async_trait]
pub trait GamificationService: Send + Sync {
    async fn calculate_rewards(
        &self,
        user_id: Uuid,
        rating: &RatingSubmission,
    ) -> PortResult<GamificationReward>;

    async fn leaderboard(&self, user_id: Uuid) -> PortResult<Vec<LeaderboardEntry>>;
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> PortResult<AuthSession>;

    async fn sign_in(&self, email: &str, password: &str) -> PortResult<AuthSession>;

    async fn sign_out(&self, access_token: &str) -> PortResult<()>;

    async fn refresh(&self, refresh_token: &str) -> PortResult<AuthSession>;

    /// Resolves the user an access token belongs to.
    async fn user_for_token(&self, access_token: &str) -> PortResult<User>;

    async fn check_username_availability(&self, username: &str) -> PortResult<bool>;

    async fn get_profile(&self, access_token: &str, user_id: Uuid) -> PortResult<Profile>;

    /// Stores the username and flags onboarding as done on the user's profile.
    async fn complete_onboarding(
        &self,
        access_token: &str,
        user_id: Uuid,
        username: &str,
    ) -> PortResult<Profile>;
}

/// Persisted sessions, one slot per user.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn load(&self, user_id: Uuid) -> PortResult<Option<AuthSession>>;

    /// Stores the session in its user's slot, replacing what was there.
    async fn save(&self, session: &AuthSession) -> PortResult<()>;

    async fn clear(&self, user_id: Uuid) -> PortResult<()>;
}

//=========================================================================================
// Media Port
//=========================================================================================

/// The platform media-playback primitive. Position updates flow back to the
/// `AudioPlayer` through its status callback, not through this trait.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// `url` is where the audio is stored. A backend that must not hand that
    /// location to its client can address the audio by `track_id` instead.
    async fn load(&self, track_id: Uuid, url: &str) -> PortResult<()>;

    async fn play(&self) -> PortResult<()>;

    async fn pause(&self) -> PortResult<()>;

    async fn stop(&self) -> PortResult<()>;

    async fn unload(&self) -> PortResult<()>;

    async fn seek(&self, position_ms: u64) -> PortResult<()>;
}

//! crates/unveil_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs mirror the remote schema but are independent of its wire format;
//! the adapters translate their own record types into these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Catalog
//=========================================================================================

/// An underground track served anonymously until its artist is unveiled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: Uuid,
    pub title: String,
    pub artist: Artist,
    pub audio_url: String,
    pub genre: String,
    pub mood: String,
    pub duration_secs: Option<u32>,
    pub artwork_url: Option<String>,
    pub spotify_streams: u64,
}

impl Track {
    /// Duration in milliseconds, when the catalog knows it.
    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_secs.map(|secs| u64::from(secs) * 1000)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: Uuid,
    pub name: String,
    pub bio: Option<String>,
    pub image_url: Option<String>,
    pub genres: Vec<String>,
    pub links: StreamingLinks,
}

/// Where an unveiled artist can be listened to and followed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingLinks {
    pub spotify: Option<String>,
    pub apple_music: Option<String>,
    pub youtube: Option<String>,
    pub soundcloud: Option<String>,
    pub bandcamp: Option<String>,
}

impl StreamingLinks {
    pub fn for_platform(&self, platform: StreamingPlatform) -> Option<&str> {
        match platform {
            StreamingPlatform::Spotify => self.spotify.as_deref(),
            StreamingPlatform::AppleMusic => self.apple_music.as_deref(),
            StreamingPlatform::Youtube => self.youtube.as_deref(),
            StreamingPlatform::Soundcloud => self.soundcloud.as_deref(),
            StreamingPlatform::Bandcamp => self.bandcamp.as_deref(),
        }
    }

    /// The link for the user's primary platform, falling back to any known link.
    pub fn preferred(&self, primary: Option<StreamingPlatform>) -> Option<&str> {
        primary
            .and_then(|p| self.for_platform(p))
            .or_else(|| {
                StreamingPlatform::ALL
                    .iter()
                    .find_map(|p| self.for_platform(*p))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamingPlatform {
    Spotify,
    AppleMusic,
    Youtube,
    Soundcloud,
    Bandcamp,
}

impl StreamingPlatform {
    pub const ALL: [StreamingPlatform; 5] = [
        StreamingPlatform::Spotify,
        StreamingPlatform::AppleMusic,
        StreamingPlatform::Youtube,
        StreamingPlatform::Soundcloud,
        StreamingPlatform::Bandcamp,
    ];
}

//=========================================================================================
// Ratings
//=========================================================================================

/// A star rating, always within 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Stars(u8);

/// Ratings at or above this value unveil the artist.
pub const UNVEIL_THRESHOLD: u8 = 4;

impl Stars {
    pub fn value(self) -> u8 {
        self.0
    }

    /// Whether this rating is high enough to reveal the artist.
    pub fn unveils(self) -> bool {
        self.0 >= UNVEIL_THRESHOLD
    }
}

impl TryFrom<u8> for Stars {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (1..=5).contains(&value) {
            Ok(Self(value))
        } else {
            Err(format!("rating must be between 1 and 5, got {value}"))
        }
    }
}

impl From<Stars> for u8 {
    fn from(stars: Stars) -> Self {
        stars.0
    }
}

/// A rating row. At most one exists per (user, track); the backend rejects duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub track_id: Uuid,
    pub user_id: Uuid,
    pub rating: Stars,
    pub review_text: Option<String>,
    /// Rated before the artist was unveiled.
    pub is_blind_rating: bool,
    pub is_outside_preference: bool,
    /// 0..=100
    pub listen_percentage: u8,
}

/// What the gamification RPC is told about a rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSubmission {
    pub track_id: Uuid,
    pub rating: Stars,
    pub is_blind_rating: bool,
    pub is_outside_preference: bool,
    pub listen_percentage: u8,
}

impl From<&Rating> for RatingSubmission {
    fn from(rating: &Rating) -> Self {
        Self {
            track_id: rating.track_id,
            rating: rating.rating,
            is_blind_rating: rating.is_blind_rating,
            is_outside_preference: rating.is_outside_preference,
            listen_percentage: rating.listen_percentage,
        }
    }
}

//=========================================================================================
// Preferences
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub preferred_genres: Vec<String>,
    pub preferred_moods: Vec<String>,
    pub min_duration_secs: Option<u32>,
    pub max_duration_secs: Option<u32>,
}

impl UserPreferences {
    /// True when these preferences would not narrow a track query at all.
    pub fn is_empty(&self) -> bool {
        self.preferred_genres.is_empty()
            && self.preferred_moods.is_empty()
            && self.min_duration_secs.is_none()
            && self.max_duration_secs.is_none()
    }

    /// Whether a track falls outside the stated genre and mood preferences.
    pub fn excludes(&self, track: &Track) -> bool {
        let genre_miss = !self.preferred_genres.is_empty()
            && !self
                .preferred_genres
                .iter()
                .any(|g| g.eq_ignore_ascii_case(&track.genre));
        let mood_miss = !self.preferred_moods.is_empty()
            && !self
                .preferred_moods
                .iter()
                .any(|m| m.eq_ignore_ascii_case(&track.mood));
        genre_miss || mood_miss
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingPreferences {
    pub user_id: Uuid,
    pub platforms: Vec<StreamingPlatform>,
    pub primary: Option<StreamingPlatform>,
}

//=========================================================================================
// Gamification (computed server-side, displayed only)
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GamificationReward {
    pub xp_earned: u32,
    pub daily_streak_xp: Option<u32>,
    pub consecutive_bonus_xp: Option<u32>,
    pub new_badges: Vec<Badge>,
}

impl GamificationReward {
    pub fn total_xp(&self) -> u32 {
        self.xp_earned + self.daily_streak_xp.unwrap_or(0) + self.consecutive_bonus_xp.unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub display_name: String,
    pub total_xp: u64,
    pub is_current_user: bool,
}

//=========================================================================================
// History
//=========================================================================================

/// A track the user has rated, as listed on the history screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatedTrack {
    pub track: Track,
    pub rating: Stars,
    pub review_text: Option<String>,
    pub rated_at: DateTime<Utc>,
}

/// An artist the user follows, as listed on the history screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowedArtist {
    pub artist: Artist,
    pub discovered_track_id: Option<Uuid>,
    pub subscribed_at: DateTime<Utc>,
}

//=========================================================================================
// Accounts
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub onboarding_completed: bool,
}

/// A signed-in session, persisted in platform storage between launches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

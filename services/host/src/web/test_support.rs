//! services/host/src/web/test_support.rs
//!
//! An in-memory backend for driving whole socket conversations in tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use unveil_core::domain::{
    Artist, FollowedArtist, GamificationReward, LeaderboardEntry, RatedTrack, Rating,
    RatingSubmission, StreamingLinks, StreamingPreferences, Track, UserPreferences,
};
use unveil_core::ports::{
    ArtistStore, GamificationService, PortError, PortResult, PreferenceStore, RatingStore,
    StreamCounter, TrackCatalog,
};
use unveil_core::query::TrackQuery;
use unveil_core::session::SessionPorts;
use uuid::Uuid;

pub(crate) fn track(title: &str, artist: &str) -> Track {
    Track {
        id: Uuid::new_v4(),
        title: title.into(),
        artist: Artist {
            id: Uuid::new_v4(),
            name: artist.into(),
            bio: None,
            image_url: None,
            genres: vec!["drone".into()],
            links: StreamingLinks::default(),
        },
        audio_url: format!("https://cdn.example/{artist}/{title}.mp3"),
        genre: "drone".into(),
        mood: "calm".into(),
        duration_secs: Some(200),
        artwork_url: None,
        spotify_streams: 3,
    }
}

/// Answers every remote port from a fixed track list. Artist lookups can be
/// held until the test releases them.
#[derive(Default)]
pub(crate) struct StubBackend {
    tracks: Vec<Track>,
    rated: Mutex<Vec<Uuid>>,
    reward: GamificationReward,
    artist_gate: Option<Arc<Semaphore>>,
}

impl StubBackend {
    pub fn with_tracks(tracks: Vec<Track>) -> Self {
        Self {
            tracks,
            ..Default::default()
        }
    }

    pub fn rewarding(mut self, reward: GamificationReward) -> Self {
        self.reward = reward;
        self
    }

    /// Each artist lookup waits for a permit added to the returned gate.
    pub fn gate_artists(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.artist_gate = Some(gate.clone());
        (self, gate)
    }

    pub fn rated(&self) -> Vec<Uuid> {
        self.rated.lock().unwrap().clone()
    }

    pub fn session_ports(self: &Arc<Self>) -> SessionPorts {
        SessionPorts {
            catalog: self.clone(),
            ratings: self.clone(),
            preferences: self.clone(),
            artists: self.clone(),
            gamification: self.clone(),
        }
    }
}

#[async_trait]
impl TrackCatalog for StubBackend {
    async fn fetch_candidates(&self, query: &TrackQuery) -> PortResult<Vec<Track>> {
        Ok(self
            .tracks
            .iter()
            .filter(|t| !query.exclude_ids.contains(&t.id))
            .filter(|t| query.moods.is_empty() || query.moods.contains(&t.mood))
            .take(query.limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl StreamCounter for StubBackend {
    async fn increment_track_streams(&self, _track_id: Uuid) -> PortResult<()> {
        Ok(())
    }
}

#[async_trait]
impl RatingStore for StubBackend {
    async fn submit_rating(&self, rating: &Rating) -> PortResult<()> {
        self.rated.lock().unwrap().push(rating.track_id);
        Ok(())
    }

    async fn rated_track_ids(&self, _user_id: Uuid) -> PortResult<Vec<Uuid>> {
        Ok(self.rated())
    }

    async fn rating_history(&self, _user_id: Uuid) -> PortResult<Vec<RatedTrack>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl PreferenceStore for StubBackend {
    async fn get_preferences(&self, _user_id: Uuid) -> PortResult<Option<UserPreferences>> {
        Ok(None)
    }

    async fn upsert_preferences(&self, _user_id: Uuid, _prefs: &UserPreferences) -> PortResult<()> {
        Ok(())
    }

    async fn get_streaming_preferences(
        &self,
        _user_id: Uuid,
    ) -> PortResult<Option<StreamingPreferences>> {
        Ok(None)
    }

    async fn upsert_streaming_preferences(&self, _prefs: &StreamingPreferences) -> PortResult<()> {
        Ok(())
    }
}

#[async_trait]
impl ArtistStore for StubBackend {
    async fn get_artist(&self, artist_id: Uuid) -> PortResult<Artist> {
        if let Some(gate) = &self.artist_gate {
            gate.acquire().await.unwrap().forget();
        }
        self.tracks
            .iter()
            .map(|t| &t.artist)
            .find(|a| a.id == artist_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Artist {artist_id}")))
    }

    async fn follow_artist(
        &self,
        _user_id: Uuid,
        _artist_id: Uuid,
        _discovered_track_id: Option<Uuid>,
    ) -> PortResult<()> {
        Ok(())
    }

    async fn unfollow_artist(&self, _user_id: Uuid, _artist_id: Uuid) -> PortResult<()> {
        Ok(())
    }

    async fn is_following(&self, _user_id: Uuid, _artist_id: Uuid) -> PortResult<bool> {
        Ok(false)
    }

    async fn followed_artists(&self, _user_id: Uuid) -> PortResult<Vec<FollowedArtist>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl GamificationService for StubBackend {
    async fn calculate_rewards(
        &self,
        _user_id: Uuid,
        _rating: &RatingSubmission,
    ) -> PortResult<GamificationReward> {
        Ok(self.reward.clone())
    }

    async fn leaderboard(&self, _user_id: Uuid) -> PortResult<Vec<LeaderboardEntry>> {
        Ok(Vec::new())
    }
}

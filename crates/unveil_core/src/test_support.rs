//! In-memory port implementations shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::domain::{
    Artist, AuthSession, Badge, FollowedArtist, GamificationReward, LeaderboardEntry, Profile,
    RatedTrack, Rating, RatingSubmission, StreamingLinks, StreamingPreferences, Track, User,
    UserPreferences,
};
use crate::ports::{
    ArtistStore, AuthService, GamificationService, MediaBackend, PortError, PortResult,
    PreferenceStore, RatingStore, SessionStorage, StreamCounter, TrackCatalog,
};
use crate::query::TrackQuery;

pub fn track(genre: &str, mood: &str) -> Track {
    Track {
        id: Uuid::new_v4(),
        title: "Untitled".into(),
        artist: Artist {
            id: Uuid::new_v4(),
            name: "Nobody".into(),
            bio: None,
            image_url: None,
            genres: vec![genre.into()],
            links: StreamingLinks::default(),
        },
        audio_url: format!("https://cdn.example/{}.mp3", Uuid::new_v4()),
        genre: genre.into(),
        mood: mood.into(),
        duration_secs: Some(200),
        artwork_url: None,
        spotify_streams: 12,
    }
}

fn contains_ci(values: &[String], wanted: &str) -> bool {
    values.iter().any(|v| v.eq_ignore_ascii_case(wanted))
}

//=========================================================================================
// Media
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaCall {
    Load(String),
    Play,
    Pause,
    Stop,
    Unload,
    Seek(u64),
}

#[derive(Default)]
pub struct FakeMedia {
    calls: Mutex<Vec<MediaCall>>,
    fail_loads: AtomicBool,
}

impl FakeMedia {
    pub fn failing_loads() -> Self {
        let media = Self::default();
        media.fail_loads();
        media
    }

    pub fn fail_loads(&self) {
        self.fail_loads.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<MediaCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: MediaCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MediaBackend for FakeMedia {
    async fn load(&self, _track_id: Uuid, url: &str) -> PortResult<()> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("decoder exploded".into()));
        }
        self.record(MediaCall::Load(url.to_string()));
        Ok(())
    }

    async fn play(&self) -> PortResult<()> {
        self.record(MediaCall::Play);
        Ok(())
    }

    async fn pause(&self) -> PortResult<()> {
        self.record(MediaCall::Pause);
        Ok(())
    }

    async fn stop(&self) -> PortResult<()> {
        self.record(MediaCall::Stop);
        Ok(())
    }

    async fn unload(&self) -> PortResult<()> {
        self.record(MediaCall::Unload);
        Ok(())
    }

    async fn seek(&self, position_ms: u64) -> PortResult<()> {
        self.record(MediaCall::Seek(position_ms));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeStreams {
    counted: Mutex<Vec<Uuid>>,
}

impl FakeStreams {
    pub fn counted(&self) -> Vec<Uuid> {
        self.counted.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamCounter for FakeStreams {
    async fn increment_track_streams(&self, track_id: Uuid) -> PortResult<()> {
        self.counted.lock().unwrap().push(track_id);
        Ok(())
    }
}

//=========================================================================================
// Catalog
//=========================================================================================

#[derive(Default)]
pub struct FakeCatalog {
    tracks: Vec<Track>,
    queries: Mutex<Vec<TrackQuery>>,
    fail_next: AtomicBool,
    ignore_exclusions: AtomicBool,
}

impl FakeCatalog {
    pub fn with_tracks(tracks: Vec<Track>) -> Self {
        Self {
            tracks,
            ..Default::default()
        }
    }

    pub fn queries(&self) -> Vec<TrackQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn fail_next_fetch(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Behave like a backend whose exclusion list is out of date.
    pub fn ignore_exclusions(&self) {
        self.ignore_exclusions.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TrackCatalog for FakeCatalog {
    async fn fetch_candidates(&self, query: &TrackQuery) -> PortResult<Vec<Track>> {
        self.queries.lock().unwrap().push(query.clone());
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(PortError::Network("connection reset".into()));
        }
        let ignore_exclusions = self.ignore_exclusions.load(Ordering::SeqCst);
        Ok(self
            .tracks
            .iter()
            .filter(|t| t.spotify_streams < query.max_streams)
            .filter(|t| query.genres.is_empty() || contains_ci(&query.genres, &t.genre))
            .filter(|t| query.moods.is_empty() || contains_ci(&query.moods, &t.mood))
            .filter(|t| {
                let secs = t.duration_secs.unwrap_or(0);
                query.min_duration_secs.map_or(true, |min| secs >= min)
                    && query.max_duration_secs.map_or(true, |max| secs <= max)
            })
            .filter(|t| ignore_exclusions || !query.exclude_ids.contains(&t.id))
            .take(query.limit)
            .cloned()
            .collect())
    }
}

//=========================================================================================
// Ratings, preferences, artists, gamification
//=========================================================================================

#[derive(Default)]
pub struct FakeRatings {
    rows: Mutex<Vec<Rating>>,
    fail_next_submit: AtomicBool,
}

impl FakeRatings {
    pub fn rows(&self) -> Vec<Rating> {
        self.rows.lock().unwrap().clone()
    }

    pub fn preload(&self, user_id: Uuid, track_id: Uuid) {
        self.rows.lock().unwrap().push(Rating {
            track_id,
            user_id,
            rating: crate::domain::Stars::try_from(3).unwrap(),
            review_text: None,
            is_blind_rating: true,
            is_outside_preference: false,
            listen_percentage: 50,
        });
    }

    pub fn fail_next_submit(&self) {
        self.fail_next_submit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RatingStore for FakeRatings {
    async fn submit_rating(&self, rating: &Rating) -> PortResult<()> {
        if self.fail_next_submit.swap(false, Ordering::SeqCst) {
            return Err(PortError::Network("timeout".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        if rows
            .iter()
            .any(|r| r.user_id == rating.user_id && r.track_id == rating.track_id)
        {
            return Err(PortError::Conflict("23505".into()));
        }
        rows.push(rating.clone());
        Ok(())
    }

    async fn rated_track_ids(&self, user_id: Uuid) -> PortResult<Vec<Uuid>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.track_id)
            .collect())
    }

    async fn rating_history(&self, _user_id: Uuid) -> PortResult<Vec<RatedTrack>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct FakePreferences {
    prefs: Mutex<Option<UserPreferences>>,
    streaming: Mutex<Option<StreamingPreferences>>,
}

impl FakePreferences {
    pub fn set(&self, prefs: UserPreferences) {
        *self.prefs.lock().unwrap() = Some(prefs);
    }

    pub fn get(&self) -> Option<UserPreferences> {
        self.prefs.lock().unwrap().clone()
    }
}

#[async_trait]
impl PreferenceStore for FakePreferences {
    async fn get_preferences(&self, _user_id: Uuid) -> PortResult<Option<UserPreferences>> {
        Ok(self.get())
    }

    async fn upsert_preferences(&self, _user_id: Uuid, prefs: &UserPreferences) -> PortResult<()> {
        self.set(prefs.clone());
        Ok(())
    }

    async fn get_streaming_preferences(
        &self,
        _user_id: Uuid,
    ) -> PortResult<Option<StreamingPreferences>> {
        Ok(self.streaming.lock().unwrap().clone())
    }

    async fn upsert_streaming_preferences(&self, prefs: &StreamingPreferences) -> PortResult<()> {
        *self.streaming.lock().unwrap() = Some(prefs.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeArtists {
    artists: Vec<Artist>,
    follows: Mutex<Vec<(Uuid, Uuid, Option<Uuid>)>>,
}

impl FakeArtists {
    pub fn with_artist(artist: Artist) -> Self {
        Self {
            artists: vec![artist],
            ..Default::default()
        }
    }

    pub fn follows(&self) -> Vec<(Uuid, Uuid, Option<Uuid>)> {
        self.follows.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtistStore for FakeArtists {
    async fn get_artist(&self, artist_id: Uuid) -> PortResult<Artist> {
        self.artists
            .iter()
            .find(|a| a.id == artist_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("artist {artist_id}")))
    }

    async fn follow_artist(
        &self,
        user_id: Uuid,
        artist_id: Uuid,
        discovered_track_id: Option<Uuid>,
    ) -> PortResult<()> {
        let mut follows = self.follows.lock().unwrap();
        if follows.iter().any(|(u, a, _)| *u == user_id && *a == artist_id) {
            return Err(PortError::Conflict("23505".into()));
        }
        follows.push((user_id, artist_id, discovered_track_id));
        Ok(())
    }

    async fn unfollow_artist(&self, user_id: Uuid, artist_id: Uuid) -> PortResult<()> {
        self.follows
            .lock()
            .unwrap()
            .retain(|(u, a, _)| !(*u == user_id && *a == artist_id));
        Ok(())
    }

    async fn is_following(&self, user_id: Uuid, artist_id: Uuid) -> PortResult<bool> {
        Ok(self
            .follows
            .lock()
            .unwrap()
            .iter()
            .any(|(u, a, _)| *u == user_id && *a == artist_id))
    }

    async fn followed_artists(&self, user_id: Uuid) -> PortResult<Vec<FollowedArtist>> {
        let follows = self.follows();
        Ok(self
            .artists
            .iter()
            .filter_map(|artist| {
                follows
                    .iter()
                    .find(|(u, a, _)| *u == user_id && *a == artist.id)
                    .map(|(_, _, discovered)| FollowedArtist {
                        artist: artist.clone(),
                        discovered_track_id: *discovered,
                        subscribed_at: Utc::now(),
                    })
            })
            .collect())
    }
}

#[derive(Default)]
pub struct FakeGamification {
    calls: AtomicUsize,
}

impl FakeGamification {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GamificationService for FakeGamification {
    async fn calculate_rewards(
        &self,
        _user_id: Uuid,
        _rating: &RatingSubmission,
    ) -> PortResult<GamificationReward> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(GamificationReward {
            xp_earned: 10,
            daily_streak_xp: Some(5),
            consecutive_bonus_xp: None,
            new_badges: vec![Badge {
                id: "first_unveil".into(),
                name: "First Unveil".into(),
                description: None,
                icon: None,
            }],
        })
    }

    async fn leaderboard(&self, _user_id: Uuid) -> PortResult<Vec<LeaderboardEntry>> {
        Ok(Vec::new())
    }
}

//=========================================================================================
// Auth
//=========================================================================================

#[derive(Default)]
pub struct FakeAuth {
    accounts: Mutex<HashMap<String, (String, User)>>,
    refresh_tokens: Mutex<HashMap<String, User>>,
    access_tokens: Mutex<HashMap<String, User>>,
    profiles: Mutex<HashMap<Uuid, Profile>>,
    taken: Mutex<HashSet<String>>,
    reject_refresh: AtomicBool,
    calls: AtomicUsize,
    issued: AtomicUsize,
}

impl FakeAuth {
    pub fn remote_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reject_refresh(&self) {
        self.reject_refresh.store(true, Ordering::SeqCst);
    }

    pub fn take_username(&self, username: &str) {
        self.taken.lock().unwrap().insert(username.to_string());
    }

    fn issue(&self, user: User) -> AuthSession {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let session = AuthSession {
            user: user.clone(),
            access_token: format!("access-{n}"),
            refresh_token: format!("refresh-{n}"),
            expires_at: Utc::now() + Duration::hours(1),
        };
        self.refresh_tokens
            .lock()
            .unwrap()
            .insert(session.refresh_token.clone(), user.clone());
        self.access_tokens
            .lock()
            .unwrap()
            .insert(session.access_token.clone(), user);
        session
    }

    fn called(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuthService for FakeAuth {
    async fn sign_up(&self, email: &str, password: &str) -> PortResult<AuthSession> {
        self.called();
        let user = User {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
        };
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), (password.to_string(), user.clone()));
        Ok(self.issue(user))
    }

    async fn sign_in(&self, email: &str, password: &str) -> PortResult<AuthSession> {
        self.called();
        let account = self.accounts.lock().unwrap().get(email).cloned();
        match account {
            Some((stored, user)) if stored == password => Ok(self.issue(user)),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn sign_out(&self, _access_token: &str) -> PortResult<()> {
        self.called();
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> PortResult<AuthSession> {
        self.called();
        if self.reject_refresh.load(Ordering::SeqCst) {
            return Err(PortError::Unauthorized);
        }
        let user = self.refresh_tokens.lock().unwrap().get(refresh_token).cloned();
        user.map(|u| self.issue(u)).ok_or(PortError::Unauthorized)
    }

    async fn user_for_token(&self, access_token: &str) -> PortResult<User> {
        self.called();
        self.access_tokens
            .lock()
            .unwrap()
            .get(access_token)
            .cloned()
            .ok_or(PortError::Unauthorized)
    }

    async fn check_username_availability(&self, username: &str) -> PortResult<bool> {
        self.called();
        Ok(!self.taken.lock().unwrap().contains(username))
    }

    async fn get_profile(&self, _access_token: &str, user_id: Uuid) -> PortResult<Profile> {
        self.called();
        let stored = self.profiles.lock().unwrap().get(&user_id).cloned();
        Ok(stored.unwrap_or(Profile {
            id: user_id,
            username: None,
            display_name: None,
            onboarding_completed: false,
        }))
    }

    async fn complete_onboarding(
        &self,
        _access_token: &str,
        user_id: Uuid,
        username: &str,
    ) -> PortResult<Profile> {
        self.called();
        let mut profiles = self.profiles.lock().unwrap();
        let own = profiles
            .get(&user_id)
            .is_some_and(|p| p.username.as_deref() == Some(username));
        if !own && !self.taken.lock().unwrap().insert(username.to_string()) {
            return Err(PortError::Conflict("23505".into()));
        }
        let profile = Profile {
            id: user_id,
            username: Some(username.to_string()),
            display_name: None,
            onboarding_completed: true,
        };
        profiles.insert(user_id, profile.clone());
        Ok(profile)
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    sessions: Mutex<HashMap<Uuid, AuthSession>>,
}

impl MemoryStorage {
    pub fn stored_for(&self, user_id: Uuid) -> Option<AuthSession> {
        self.sessions.lock().unwrap().get(&user_id).cloned()
    }
}

#[async_trait]
impl SessionStorage for MemoryStorage {
    async fn load(&self, user_id: Uuid) -> PortResult<Option<AuthSession>> {
        Ok(self.stored_for(user_id))
    }

    async fn save(&self, session: &AuthSession) -> PortResult<()> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.user.id, session.clone());
        Ok(())
    }

    async fn clear(&self, user_id: Uuid) -> PortResult<()> {
        self.sessions.lock().unwrap().remove(&user_id);
        Ok(())
    }
}

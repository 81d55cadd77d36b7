//! crates/unveil_core/src/session.rs
//!
//! The discovery session: an explicit state machine with a single transition
//! function, and the driver that performs the remote calls and playback
//! operations each transition needs.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{GamificationReward, Rating, RatingSubmission, Stars, Track, UserPreferences};
use crate::player::{AudioPlayer, Dispatch, PlaybackError, PlaybackStatus};
use crate::ports::{
    ArtistStore, GamificationService, PortError, PreferenceStore, RatingStore, TrackCatalog,
};
use crate::query::{ActiveFilter, TrackQuery};
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Fraction of a track that must elapse before the rating prompt appears.
pub const DEFAULT_RATING_THRESHOLD: f64 = 0.05;

const FETCH_FAILED_MESSAGE: &str =
    "We couldn't reach the music library. Check your connection and try again.";

const RATING_FAILED_MESSAGE: &str =
    "Your rating couldn't be saved. Check your connection and try again.";

//=========================================================================================
// States and Events
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum DiscoverState {
    MoodSelection,
    Loading,
    Playing {
        track: Track,
    },
    Rating {
        track: Track,
    },
    Revealed {
        track: Track,
        rating: Stars,
        reward: Option<GamificationReward>,
    },
    FullListening {
        track: Track,
        rating: Stars,
        reward: Option<GamificationReward>,
    },
    NoTracksInPreferences,
    NoTracksAtAll,
    /// Something failed; the user can retry or start over.
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiscoverEvent {
    SelectMood,
    TrackReady(Track),
    NoTracksUnderFilter,
    NoTracksAnywhere,
    RatingThresholdReached,
    Rated {
        stars: Stars,
        reward: Option<GamificationReward>,
    },
    ContinueListening,
    DiscoverNext,
    BroadenSearch,
    Failed(String),
    Retry,
    /// Retrying a rating that never reached the backend.
    ResumeRating(Track),
    NewSession,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("'{event}' is not allowed while {state}")]
    Illegal {
        state: &'static str,
        event: &'static str,
    },
}

impl DiscoverState {
    pub fn name(&self) -> &'static str {
        match self {
            DiscoverState::MoodSelection => "mood_selection",
            DiscoverState::Loading => "loading",
            DiscoverState::Playing { .. } => "playing",
            DiscoverState::Rating { .. } => "rating",
            DiscoverState::Revealed { .. } => "revealed",
            DiscoverState::FullListening { .. } => "full_listening",
            DiscoverState::NoTracksInPreferences => "no_tracks_in_preferences",
            DiscoverState::NoTracksAtAll => "no_tracks_at_all",
            DiscoverState::Error { .. } => "error",
        }
    }

    pub fn track(&self) -> Option<&Track> {
        match self {
            DiscoverState::Playing { track }
            | DiscoverState::Rating { track }
            | DiscoverState::Revealed { track, .. }
            | DiscoverState::FullListening { track, .. } => Some(track),
            _ => None,
        }
    }

    /// The track whose artist has been unveiled, if any. Only a rating of four
    /// stars or more leads to these states.
    pub fn visible_artist(&self) -> Option<&Track> {
        match self {
            DiscoverState::Revealed { track, .. } | DiscoverState::FullListening { track, .. } => {
                Some(track)
            }
            _ => None,
        }
    }

    /// The single transition function.
    pub fn apply(&self, event: DiscoverEvent) -> Result<DiscoverState, TransitionError> {
        use DiscoverEvent as E;
        use DiscoverState as S;

        let next = match (self, event) {
            (_, E::NewSession) => S::MoodSelection,

            (S::MoodSelection, E::SelectMood) => S::Loading,

            (S::Loading, E::TrackReady(track)) => S::Playing { track },
            (S::Loading, E::NoTracksUnderFilter) => S::NoTracksInPreferences,
            (S::Loading, E::NoTracksAnywhere) => S::NoTracksAtAll,

            (S::Playing { track }, E::RatingThresholdReached) => S::Rating {
                track: track.clone(),
            },

            (S::Rating { track }, E::Rated { stars, reward }) => {
                if stars.unveils() {
                    S::Revealed {
                        track: track.clone(),
                        rating: stars,
                        reward,
                    }
                } else {
                    S::Loading
                }
            }

            (
                S::Revealed {
                    track,
                    rating,
                    reward,
                },
                E::ContinueListening,
            ) => S::FullListening {
                track: track.clone(),
                rating: *rating,
                reward: reward.clone(),
            },
            (S::Revealed { .. } | S::FullListening { .. }, E::DiscoverNext) => S::Loading,

            (S::NoTracksInPreferences, E::BroadenSearch) => S::Loading,

            (
                S::Loading
                | S::Playing { .. }
                | S::Rating { .. }
                | S::Revealed { .. }
                | S::FullListening { .. },
                E::Failed(message),
            ) => S::Error { message },
            (S::Error { .. }, E::Retry) => S::Loading,
            (S::Error { .. }, E::ResumeRating(track)) => S::Rating { track },

            (state, event) => {
                return Err(TransitionError::Illegal {
                    state: state.name(),
                    event: event.name(),
                })
            }
        };
        Ok(next)
    }
}

impl DiscoverEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DiscoverEvent::SelectMood => "select_mood",
            DiscoverEvent::TrackReady(_) => "track_ready",
            DiscoverEvent::NoTracksUnderFilter => "no_tracks_under_filter",
            DiscoverEvent::NoTracksAnywhere => "no_tracks_anywhere",
            DiscoverEvent::RatingThresholdReached => "rating_threshold_reached",
            DiscoverEvent::Rated { .. } => "rated",
            DiscoverEvent::ContinueListening => "continue_listening",
            DiscoverEvent::DiscoverNext => "discover_next",
            DiscoverEvent::BroadenSearch => "broaden_search",
            DiscoverEvent::Failed(_) => "failed",
            DiscoverEvent::Retry => "retry",
            DiscoverEvent::ResumeRating(_) => "resume_rating",
            DiscoverEvent::NewSession => "new_session",
        }
    }
}

//=========================================================================================
// Driver
//=========================================================================================

/// Short-lived messages the UI shows and forgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionNotice {
    /// A low rating was recorded; the next track is on its way.
    ThankYou,
    /// The backend already had a rating for this track.
    AlreadyRated,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Remote call failed: {0}")]
    Port(#[from] PortError),
    #[error("No artist has been unveiled in this session")]
    NothingRevealed,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub rating_threshold: f64,
    /// Fade between an unveiled track and the next one; the fetch happens inside it.
    pub transition_delay: Duration,
    pub rated_ids_retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rating_threshold: DEFAULT_RATING_THRESHOLD,
            transition_delay: Duration::from_secs(2),
            rated_ids_retry: RetryPolicy::default(),
        }
    }
}

/// The remote collaborators a discovery session needs.
#[derive(Clone)]
pub struct SessionPorts {
    pub catalog: Arc<dyn TrackCatalog>,
    pub ratings: Arc<dyn RatingStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub artists: Arc<dyn ArtistStore>,
    pub gamification: Arc<dyn GamificationService>,
}

/// A rating the backend never accepted, kept so `retry` can send it again.
struct UnsentRating {
    track: Track,
    stars: Stars,
    review_text: Option<String>,
}

enum Pick {
    Track(Track),
    NoneUnderFilter,
    NoneAtAll,
}

pub struct DiscoverySession {
    user_id: Uuid,
    ports: SessionPorts,
    player: AudioPlayer,
    config: SessionConfig,
    rng: StdRng,
    state: DiscoverState,
    session_mood: Option<String>,
    broadened: bool,
    /// `None` means stale: refetched before the next pick.
    rated_ids: Option<Vec<Uuid>>,
    preferences: Option<Option<UserPreferences>>,
    rated_locally: HashSet<Uuid>,
    unsent_rating: Option<UnsentRating>,
    notices: Vec<SessionNotice>,
}

impl DiscoverySession {
    pub fn new(
        user_id: Uuid,
        ports: SessionPorts,
        player: AudioPlayer,
        config: SessionConfig,
    ) -> Self {
        Self {
            user_id,
            ports,
            player,
            config,
            rng: StdRng::from_os_rng(),
            state: DiscoverState::MoodSelection,
            session_mood: None,
            broadened: false,
            rated_ids: None,
            preferences: None,
            rated_locally: HashSet::new(),
            unsent_rating: None,
            notices: Vec::new(),
        }
    }

    /// Replaces the candidate picker's randomness, e.g. with a seeded generator.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn state(&self) -> &DiscoverState {
        &self.state
    }

    pub fn player(&self) -> &AudioPlayer {
        &self.player
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn is_broadened(&self) -> bool {
        self.broadened
    }

    pub fn session_mood(&self) -> Option<&str> {
        self.session_mood.as_deref()
    }

    pub fn take_notices(&mut self) -> Vec<SessionNotice> {
        std::mem::take(&mut self.notices)
    }

    fn transition(&mut self, event: DiscoverEvent) -> Result<(), TransitionError> {
        let next = self.state.apply(event)?;
        debug!("Discover state: {} -> {}", self.state.name(), next.name());
        self.state = next;
        Ok(())
    }

    // --- User actions ---

    /// Starts a session with a mood, or with `None` for "surprise me", which
    /// broadens the search for the rest of the session.
    pub async fn select_mood(&mut self, mood: Option<String>) -> Result<(), SessionError> {
        self.transition(DiscoverEvent::SelectMood)?;
        if mood.is_none() {
            self.broadened = true;
        }
        info!("Mood selected: {}", mood.as_deref().unwrap_or("surprise me"));
        self.session_mood = mood;
        self.fetch_and_play(Duration::ZERO).await
    }

    /// Skips mood selection: the first fetch uses the stored preferences, if any.
    pub async fn start_from_preferences(&mut self) -> Result<(), SessionError> {
        self.transition(DiscoverEvent::SelectMood)?;
        self.session_mood = None;
        self.fetch_and_play(Duration::ZERO).await
    }

    /// Records the rating for the current track. Four stars or more unveils the
    /// artist; anything lower moves straight on to another track.
    pub async fn submit_rating(
        &mut self,
        stars: Stars,
        review_text: Option<String>,
    ) -> Result<(), SessionError> {
        let DiscoverState::Rating { track } = &self.state else {
            return Err(TransitionError::Illegal {
                state: self.state.name(),
                event: "rated",
            }
            .into());
        };
        let track = track.clone();

        let progress = self.player.progress().await;
        let outside = self
            .stored_preferences()
            .await
            .is_some_and(|prefs| prefs.excludes(&track));
        let rating = Rating {
            track_id: track.id,
            user_id: self.user_id,
            rating: stars,
            review_text: review_text
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty()),
            is_blind_rating: true,
            is_outside_preference: outside,
            listen_percentage: (progress.clamp(0.0, 1.0) * 100.0).round() as u8,
        };

        match self.ports.ratings.submit_rating(&rating).await {
            Ok(()) => info!("Rated track {} with {} stars", track.id, stars.value()),
            Err(e) if e.is_conflict() => {
                warn!("Track {} was already rated, continuing: {}", track.id, e);
                self.notices.push(SessionNotice::AlreadyRated);
            }
            Err(e) => {
                error!("Failed to submit rating for track {}: {}", track.id, e);
                self.unsent_rating = Some(UnsentRating {
                    track,
                    stars,
                    review_text: rating.review_text,
                });
                self.transition(DiscoverEvent::Failed(RATING_FAILED_MESSAGE.to_string()))?;
                return Ok(());
            }
        }

        self.rated_locally.insert(track.id);
        self.rated_ids = None;
        self.preferences = None;

        if stars.unveils() {
            let reward = match self
                .ports
                .gamification
                .calculate_rewards(self.user_id, &RatingSubmission::from(&rating))
                .await
            {
                Ok(reward) => Some(reward),
                Err(e) => {
                    warn!("Gamification rewards unavailable: {}", e);
                    None
                }
            };
            self.transition(DiscoverEvent::Rated { stars, reward })?;
            info!("Unveiled artist {} for track {}", track.artist.id, track.id);
            Ok(())
        } else {
            self.notices.push(SessionNotice::ThankYou);
            self.transition(DiscoverEvent::Rated {
                stars,
                reward: None,
            })?;
            self.fetch_and_play(Duration::ZERO).await
        }
    }

    pub fn continue_listening(&mut self) -> Result<(), SessionError> {
        self.transition(DiscoverEvent::ContinueListening)?;
        Ok(())
    }

    /// Moves on from an unveiled track, fading over the fetch of the next one.
    pub async fn discover_next(&mut self) -> Result<(), SessionError> {
        self.transition(DiscoverEvent::DiscoverNext)?;
        self.fetch_and_play(self.config.transition_delay).await
    }

    /// Recovery from "no tracks match your preferences": drop every filter
    /// until the next session.
    pub async fn broaden_search(&mut self) -> Result<(), SessionError> {
        self.transition(DiscoverEvent::BroadenSearch)?;
        self.broadened = true;
        info!("Search broadened for the rest of the session");
        self.fetch_and_play(Duration::ZERO).await
    }

    /// Resends a rating that failed to save, otherwise fetches a track again.
    pub async fn retry(&mut self) -> Result<(), SessionError> {
        if let Some(track) = self.unsent_rating.as_ref().map(|u| u.track.clone()) {
            self.transition(DiscoverEvent::ResumeRating(track))?;
            if let Some(unsent) = self.unsent_rating.take() {
                info!("Resending rating for track {}", unsent.track.id);
                return self.submit_rating(unsent.stars, unsent.review_text).await;
            }
        }
        self.transition(DiscoverEvent::Retry)?;
        self.fetch_and_play(Duration::ZERO).await
    }

    /// Stops audio and returns to mood selection with every session flag reset.
    pub async fn new_session(&mut self) -> Result<(), SessionError> {
        if self.player.release().await == Dispatch::Dropped {
            warn!("Audio was busy while starting a new session");
        }
        self.session_mood = None;
        self.broadened = false;
        self.unsent_rating = None;
        self.transition(DiscoverEvent::NewSession)?;
        Ok(())
    }

    // --- Playback callbacks ---

    /// Feeds a status tick to the player and raises the rating prompt once
    /// enough of the current track has played. Ticks for any other track are
    /// dropped.
    pub async fn on_playback_status(&mut self, status: PlaybackStatus) -> Result<(), SessionError> {
        if !self.player.on_status(status).await {
            return Ok(());
        }
        let current = matches!(&self.state, DiscoverState::Playing { track } if track.id == status.track_id);
        if current && self.player.progress().await >= self.config.rating_threshold {
            self.transition(DiscoverEvent::RatingThresholdReached)?;
        }
        Ok(())
    }

    /// The media element reported a failure of its own.
    pub fn on_playback_error(&mut self, detail: &str) -> Result<(), SessionError> {
        let error = PlaybackError::Control(detail.to_string());
        error!("Playback error: {}", error);
        self.transition(DiscoverEvent::Failed(error.user_message()))?;
        Ok(())
    }

    // --- Unveiled artist ---

    pub async fn follow_revealed_artist(&mut self) -> Result<(), SessionError> {
        let track = self
            .state
            .visible_artist()
            .ok_or(SessionError::NothingRevealed)?;
        match self
            .ports
            .artists
            .follow_artist(self.user_id, track.artist.id, Some(track.id))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_conflict() => {
                debug!("Already following artist {}", track.artist.id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn unfollow_revealed_artist(&mut self) -> Result<(), SessionError> {
        let track = self
            .state
            .visible_artist()
            .ok_or(SessionError::NothingRevealed)?;
        self.ports
            .artists
            .unfollow_artist(self.user_id, track.artist.id)
            .await?;
        Ok(())
    }

    // --- Internals ---

    async fn fetch_and_play(&mut self, fade: Duration) -> Result<(), SessionError> {
        let started = Instant::now();
        let pick = match self.pick_next_track().await {
            Ok(pick) => pick,
            Err(e) => {
                error!("Failed to fetch discovery candidates: {}", e);
                self.transition(DiscoverEvent::Failed(FETCH_FAILED_MESSAGE.to_string()))?;
                return Ok(());
            }
        };

        let track = match pick {
            Pick::Track(track) => track,
            Pick::NoneUnderFilter => {
                info!("No tracks under the active filter");
                self.transition(DiscoverEvent::NoTracksUnderFilter)?;
                return Ok(());
            }
            Pick::NoneAtAll => {
                info!("No unrated tracks left at all");
                self.transition(DiscoverEvent::NoTracksAnywhere)?;
                return Ok(());
            }
        };

        let elapsed = started.elapsed();
        if elapsed < fade {
            tokio::time::sleep(fade - elapsed).await;
        }

        match self.player.load(&track, true).await {
            Ok(Dispatch::Done) => self.transition(DiscoverEvent::TrackReady(track))?,
            Ok(Dispatch::Dropped) => {
                warn!("Track load dropped: player busy");
                self.transition(DiscoverEvent::Failed(
                    PlaybackError::Control("player busy".into()).user_message(),
                ))?
            }
            Err(e) => {
                error!("Failed to load track {}: {}", track.id, e);
                self.transition(DiscoverEvent::Failed(e.user_message()))?
            }
        }
        Ok(())
    }

    async fn pick_next_track(&mut self) -> Result<Pick, PortError> {
        let excluded = self.excluded_ids().await;
        let stored = if self.broadened || self.session_mood.is_some() {
            None
        } else {
            self.stored_preferences().await
        };
        let filter = ActiveFilter::resolve(
            self.broadened,
            self.session_mood.as_deref(),
            stored.as_ref(),
        );

        let query = TrackQuery::new(&filter, &excluded);
        debug!("Fetching candidates with {:?}", query);
        let candidates = self.ports.catalog.fetch_candidates(&query).await?;
        if let Some(track) = candidates.choose(&mut self.rng) {
            return Ok(Pick::Track(track.clone()));
        }

        if filter.is_unfiltered() {
            return Ok(Pick::NoneAtAll);
        }
        let unfiltered = self
            .ports
            .catalog
            .fetch_candidates(&TrackQuery::unfiltered(&excluded))
            .await?;
        if unfiltered.is_empty() {
            Ok(Pick::NoneAtAll)
        } else {
            Ok(Pick::NoneUnderFilter)
        }
    }

    async fn excluded_ids(&mut self) -> Vec<Uuid> {
        if self.rated_ids.is_none() {
            let ratings = self.ports.ratings.clone();
            let user_id = self.user_id;
            match retry_with_backoff(&self.config.rated_ids_retry, || {
                ratings.rated_track_ids(user_id)
            })
            .await
            {
                Ok(ids) => self.rated_ids = Some(ids),
                Err(e) => warn!("Could not load rated track ids, using local ones: {}", e),
            }
        }

        let mut ids = self.rated_ids.clone().unwrap_or_default();
        for id in &self.rated_locally {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }

    async fn stored_preferences(&mut self) -> Option<UserPreferences> {
        if self.preferences.is_none() {
            match self.ports.preferences.get_preferences(self.user_id).await {
                Ok(prefs) => self.preferences = Some(prefs),
                Err(e) => {
                    warn!("Could not load preferences, continuing without: {}", e);
                    return None;
                }
            }
        }
        self.preferences.clone().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::PlayerConfig;
    use crate::test_support::{
        track, FakeArtists, FakeCatalog, FakeGamification, FakeMedia, FakePreferences,
        FakeRatings, FakeStreams,
    };
    use assert_matches::assert_matches;

    struct Harness {
        catalog: Arc<FakeCatalog>,
        ratings: Arc<FakeRatings>,
        preferences: Arc<FakePreferences>,
        artists: Arc<FakeArtists>,
        gamification: Arc<FakeGamification>,
        media: Arc<FakeMedia>,
        streams: Arc<FakeStreams>,
        session: DiscoverySession,
    }

    fn harness(tracks: Vec<Track>) -> Harness {
        let catalog = Arc::new(FakeCatalog::with_tracks(tracks));
        let ratings = Arc::new(FakeRatings::default());
        let preferences = Arc::new(FakePreferences::default());
        let artists = Arc::new(FakeArtists::default());
        let gamification = Arc::new(FakeGamification::default());
        let media = Arc::new(FakeMedia::default());
        let streams = Arc::new(FakeStreams::default());
        let player = AudioPlayer::new(media.clone(), streams.clone(), PlayerConfig::default());
        let ports = SessionPorts {
            catalog: catalog.clone(),
            ratings: ratings.clone(),
            preferences: preferences.clone(),
            artists: artists.clone(),
            gamification: gamification.clone(),
        };
        let session = DiscoverySession::new(Uuid::new_v4(), ports, player, SessionConfig::default())
            .with_rng(StdRng::seed_from_u64(7));
        Harness {
            catalog,
            ratings,
            preferences,
            artists,
            gamification,
            media,
            streams,
            session,
        }
    }

    fn stars(v: u8) -> Stars {
        Stars::try_from(v).unwrap()
    }

    /// A tick for whatever track the session is currently on.
    fn at(h: &Harness, position_ms: u64) -> PlaybackStatus {
        tick(h.session.state().track().unwrap(), position_ms)
    }

    fn tick(track: &Track, position_ms: u64) -> PlaybackStatus {
        PlaybackStatus {
            track_id: track.id,
            position_ms,
            duration_ms: 200_000,
            is_playing: true,
        }
    }

    async fn reach_rating(h: &mut Harness) {
        let status = at(h, 10_000);
        h.session.on_playback_status(status).await.unwrap();
        assert_matches!(h.session.state(), DiscoverState::Rating { .. });
    }

    // --- Pure transitions ---

    #[test]
    fn rating_threshold_does_not_refire_in_rating() {
        let t = track("rock", "angry");
        let rating = DiscoverState::Rating { track: t };
        assert_eq!(
            rating.apply(DiscoverEvent::RatingThresholdReached),
            Err(TransitionError::Illegal {
                state: "rating",
                event: "rating_threshold_reached"
            })
        );
    }

    #[test]
    fn low_ratings_never_reveal() {
        let t = track("rock", "angry");
        for v in 1..=3 {
            let next = DiscoverState::Rating { track: t.clone() }
                .apply(DiscoverEvent::Rated {
                    stars: stars(v),
                    reward: None,
                })
                .unwrap();
            assert_eq!(next, DiscoverState::Loading);
            assert!(next.visible_artist().is_none());
        }
    }

    #[test]
    fn artist_is_hidden_until_revealed() {
        let t = track("rock", "angry");
        let playing = DiscoverState::Playing { track: t.clone() };
        assert!(playing.visible_artist().is_none());
        let revealed = DiscoverState::Rating { track: t.clone() }
            .apply(DiscoverEvent::Rated {
                stars: stars(4),
                reward: None,
            })
            .unwrap();
        assert_eq!(revealed.visible_artist(), Some(&t));
        let full = revealed.apply(DiscoverEvent::ContinueListening).unwrap();
        assert_eq!(full.visible_artist(), Some(&t));
    }

    #[test]
    fn new_session_is_allowed_from_anywhere() {
        let states = vec![
            DiscoverState::Loading,
            DiscoverState::NoTracksAtAll,
            DiscoverState::Error {
                message: "x".into(),
            },
            DiscoverState::Playing {
                track: track("a", "b"),
            },
        ];
        for s in states {
            assert_eq!(
                s.apply(DiscoverEvent::NewSession).unwrap(),
                DiscoverState::MoodSelection
            );
        }
    }

    #[test]
    fn dead_ends_need_explicit_actions() {
        assert!(DiscoverState::NoTracksAtAll
            .apply(DiscoverEvent::BroadenSearch)
            .is_err());
        assert!(DiscoverState::NoTracksInPreferences
            .apply(DiscoverEvent::DiscoverNext)
            .is_err());
        assert_eq!(
            DiscoverState::NoTracksInPreferences
                .apply(DiscoverEvent::BroadenSearch)
                .unwrap(),
            DiscoverState::Loading
        );
    }

    // --- Driver ---

    #[tokio::test(start_paused = true)]
    async fn surprise_me_sends_an_unfiltered_first_query() {
        let mut h = harness(vec![track("rock", "angry")]);

        h.session.select_mood(None).await.unwrap();

        let queries = h.catalog.queries();
        assert_eq!(queries.len(), 1);
        assert!(!queries[0].has_taste_filters());
        assert!(h.session.is_broadened());
        assert_matches!(h.session.state(), DiscoverState::Playing { .. });
    }

    #[tokio::test(start_paused = true)]
    async fn mood_filters_the_candidate_query() {
        let mut h = harness(vec![track("rock", "angry"), track("jazz", "calm")]);

        h.session.select_mood(Some("calm".into())).await.unwrap();

        assert_eq!(h.catalog.queries()[0].moods, vec!["calm".to_string()]);
        let playing = h.session.state().track().unwrap();
        assert_eq!(playing.mood, "calm");
    }

    #[tokio::test(start_paused = true)]
    async fn stored_preferences_apply_without_a_session_mood() {
        let mut h = harness(vec![track("rock", "angry"), track("jazz", "calm")]);
        h.preferences.set(UserPreferences {
            preferred_genres: vec!["jazz".into()],
            ..Default::default()
        });
        h.session.select_mood(Some("calm".into())).await.unwrap();
        h.session.new_session().await.unwrap();

        // A new session without a mood falls back to stored preferences.
        h.session.start_from_preferences().await.unwrap();
        assert_eq!(h.session.state().track().unwrap().genre, "jazz");
        let last = h.catalog.queries().pop().unwrap();
        assert_eq!(last.genres, vec!["jazz".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_filtered_but_nonempty_unfiltered_means_no_tracks_in_preferences() {
        let mut h = harness(vec![track("rock", "angry")]);

        h.session.select_mood(Some("calm".into())).await.unwrap();

        assert_eq!(h.session.state(), &DiscoverState::NoTracksInPreferences);
        assert_eq!(h.catalog.queries().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_everywhere_means_no_tracks_at_all() {
        let mut h = harness(vec![]);

        h.session.select_mood(Some("calm".into())).await.unwrap();

        assert_eq!(h.session.state(), &DiscoverState::NoTracksAtAll);
    }

    #[tokio::test(start_paused = true)]
    async fn broadening_ignores_mood_and_preferences_until_new_session() {
        let mut h = harness(vec![track("rock", "angry"), track("metal", "angry")]);
        h.preferences.set(UserPreferences {
            preferred_genres: vec!["jazz".into()],
            ..Default::default()
        });

        h.session.select_mood(Some("calm".into())).await.unwrap();
        assert_eq!(h.session.state(), &DiscoverState::NoTracksInPreferences);

        h.session.broaden_search().await.unwrap();
        assert_matches!(h.session.state(), DiscoverState::Playing { .. });
        assert!(!h.catalog.queries().last().unwrap().has_taste_filters());

        // Next fetch within the session still ignores every filter.
        reach_rating(&mut h).await;
        h.session.submit_rating(stars(2), None).await.unwrap();
        assert!(!h.catalog.queries().last().unwrap().has_taste_filters());

        h.session.new_session().await.unwrap();
        assert!(!h.session.is_broadened());
        assert_eq!(h.session.session_mood(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn rating_prompt_appears_at_five_percent() {
        let mut h = harness(vec![track("rock", "angry")]);
        h.session.select_mood(None).await.unwrap();

        h.session.on_playback_status(at(&h, 9_999)).await.unwrap();
        assert_matches!(h.session.state(), DiscoverState::Playing { .. });

        h.session.on_playback_status(at(&h, 10_000)).await.unwrap();
        assert_matches!(h.session.state(), DiscoverState::Rating { .. });

        // Level trigger: later ticks leave the prompt alone.
        h.session.on_playback_status(at(&h, 20_000)).await.unwrap();
        assert_matches!(h.session.state(), DiscoverState::Rating { .. });
    }

    #[tokio::test(start_paused = true)]
    async fn late_ticks_from_the_previous_track_are_ignored() {
        let mut h = harness(vec![track("rock", "angry"), track("jazz", "calm")]);
        h.session.select_mood(None).await.unwrap();
        let first = h.session.state().track().unwrap().clone();
        h.session.on_playback_status(at(&h, 15_000)).await.unwrap();
        h.session.submit_rating(stars(2), None).await.unwrap();
        let second = h.session.state().track().unwrap().clone();
        assert_ne!(second.id, first.id);

        h.session.on_playback_status(tick(&first, 35_000)).await.unwrap();

        assert_eq!(h.session.state(), &DiscoverState::Playing { track: second });
        assert_eq!(h.session.player().progress().await, 0.0);
        assert!(h.streams.counted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn low_rating_advances_without_reveal_or_rewards() {
        for v in 1..=3 {
            let mut h = harness(vec![track("rock", "angry"), track("jazz", "calm")]);
            h.session.select_mood(None).await.unwrap();
            let first = h.session.state().track().unwrap().clone();
            reach_rating(&mut h).await;

            h.session.submit_rating(stars(v), None).await.unwrap();

            let next = h.session.state().track().unwrap();
            assert_ne!(next.id, first.id);
            assert_matches!(h.session.state(), DiscoverState::Playing { .. });
            assert_eq!(h.gamification.calls(), 0);
            assert_eq!(h.session.take_notices(), vec![SessionNotice::ThankYou]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn high_rating_reveals_and_requests_rewards_once() {
        for v in 4..=5 {
            let mut h = harness(vec![track("rock", "angry")]);
            h.session.select_mood(None).await.unwrap();
            reach_rating(&mut h).await;

            h.session
                .submit_rating(stars(v), Some("  great  ".into()))
                .await
                .unwrap();

            assert_matches!(h.session.state(), DiscoverState::Revealed { reward: Some(_), .. });
            assert_eq!(h.gamification.calls(), 1);
            let saved = h.ratings.rows();
            assert_eq!(saved.len(), 1);
            assert_eq!(saved[0].review_text.as_deref(), Some("great"));
            assert!(saved[0].is_blind_rating);
            assert_eq!(saved[0].listen_percentage, 5);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_rating_is_silently_accepted() {
        let t = track("rock", "angry");
        let mut h = harness(vec![t.clone()]);
        h.ratings.preload(h.session.user_id(), t.id);
        h.catalog.ignore_exclusions();

        h.session.select_mood(None).await.unwrap();
        reach_rating(&mut h).await;
        h.session.submit_rating(stars(5), None).await.unwrap();

        assert_eq!(h.ratings.rows().len(), 1);
        assert_matches!(h.session.state(), DiscoverState::Revealed { .. });
        assert_eq!(h.session.take_notices(), vec![SessionNotice::AlreadyRated]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_submission_shows_error_and_retry_resends_it() {
        let mut h = harness(vec![track("rock", "angry")]);
        h.session.select_mood(None).await.unwrap();
        reach_rating(&mut h).await;
        h.ratings.fail_next_submit();

        h.session
            .submit_rating(stars(5), Some("again".into()))
            .await
            .unwrap();
        assert_matches!(h.session.state(), DiscoverState::Error { message } if message.contains("couldn't be saved"));
        assert!(h.ratings.rows().is_empty());

        h.session.retry().await.unwrap();

        assert_matches!(h.session.state(), DiscoverState::Revealed { .. });
        let saved = h.ratings.rows();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].review_text.as_deref(), Some("again"));
        assert_eq!(h.gamification.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn new_session_drops_an_unsent_rating() {
        let mut h = harness(vec![track("rock", "angry")]);
        h.session.select_mood(None).await.unwrap();
        reach_rating(&mut h).await;
        h.ratings.fail_next_submit();
        h.session.submit_rating(stars(2), None).await.unwrap();

        h.session.new_session().await.unwrap();
        h.session.select_mood(None).await.unwrap();

        assert_matches!(h.session.state(), DiscoverState::Playing { .. });
        assert!(h.ratings.rows().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rated_tracks_are_excluded_from_later_fetches() {
        let mut h = harness(vec![track("rock", "angry"), track("jazz", "calm")]);
        h.session.select_mood(None).await.unwrap();
        let first = h.session.state().track().unwrap().id;
        reach_rating(&mut h).await;
        h.session.submit_rating(stars(1), None).await.unwrap();

        assert!(h.catalog.queries().last().unwrap().exclude_ids.contains(&first));
    }

    #[tokio::test(start_paused = true)]
    async fn discover_next_fades_before_playback() {
        let mut h = harness(vec![track("rock", "angry"), track("jazz", "calm")]);
        h.session.select_mood(None).await.unwrap();
        reach_rating(&mut h).await;
        h.session.submit_rating(stars(5), None).await.unwrap();
        h.session.continue_listening().unwrap();
        assert_matches!(h.session.state(), DiscoverState::FullListening { .. });

        let before = Instant::now();
        h.session.discover_next().await.unwrap();

        assert!(before.elapsed() >= Duration::from_secs(2));
        assert_matches!(h.session.state(), DiscoverState::Playing { .. });
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_shows_error_and_retry_recovers() {
        let mut h = harness(vec![track("rock", "angry")]);
        h.catalog.fail_next_fetch();

        h.session.select_mood(None).await.unwrap();
        assert_matches!(h.session.state(), DiscoverState::Error { .. });

        h.session.retry().await.unwrap();
        assert_matches!(h.session.state(), DiscoverState::Playing { .. });
    }

    #[tokio::test(start_paused = true)]
    async fn audio_failure_is_recoverable_by_new_session() {
        let mut h = harness(vec![track("rock", "angry")]);
        h.media.fail_loads();

        h.session.select_mood(None).await.unwrap();
        assert_matches!(h.session.state(), DiscoverState::Error { message } if message.contains("could not be loaded"));

        h.session.new_session().await.unwrap();
        assert_eq!(h.session.state(), &DiscoverState::MoodSelection);
    }

    #[tokio::test(start_paused = true)]
    async fn follow_requires_an_unveiled_artist() {
        let mut h = harness(vec![track("rock", "angry")]);
        h.session.select_mood(None).await.unwrap();
        assert_matches!(
            h.session.follow_revealed_artist().await,
            Err(SessionError::NothingRevealed)
        );

        reach_rating(&mut h).await;
        h.session.submit_rating(stars(4), None).await.unwrap();
        h.session.follow_revealed_artist().await.unwrap();
        h.session.follow_revealed_artist().await.unwrap();

        let track = h.session.state().track().unwrap().clone();
        assert_eq!(
            h.artists.follows(),
            vec![(h.session.user_id(), track.artist.id, Some(track.id))]
        );

        h.session.unfollow_revealed_artist().await.unwrap();
        assert!(h.artists.follows().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn new_session_stops_audio_and_clears_the_track() {
        let mut h = harness(vec![track("rock", "angry")]);
        h.session.select_mood(Some("angry".into())).await.unwrap();

        h.session.new_session().await.unwrap();

        assert_eq!(h.session.state(), &DiscoverState::MoodSelection);
        assert_eq!(h.session.player().snapshot().await.track_id, None);
        assert!(h.media.calls().contains(&crate::test_support::MediaCall::Unload));
    }
}

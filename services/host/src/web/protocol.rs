//! services/host/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the discovery UI and the host.
//! The UI renders `ServerMessage` frames and drives its media element from the
//! `playback` commands; it reports user actions and media status back as
//! `ClientMessage` frames.

use serde::{Deserialize, Serialize};
use unveil_core::domain::{Artist, GamificationReward, Track};
use unveil_core::session::{DiscoverState, SessionNotice};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client TO the Server
//=========================================================================================

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Starts discovering. A missing mood means "surprise me".
    SelectMood {
        #[serde(default)]
        mood: Option<String>,
    },

    /// Periodic tick from the media element, naming the track it was playing.
    PlaybackStatus {
        track_id: Uuid,
        position_ms: u64,
        duration_ms: u64,
        is_playing: bool,
    },

    /// The media element failed on its own (decode error, dropped stream).
    PlaybackError { detail: String },

    SubmitRating {
        stars: u8,
        #[serde(default)]
        review_text: Option<String>,
    },

    ContinueListening,
    DiscoverNext,
    BroadenSearch,
    Retry,
    NewSession,
    FollowArtist,
    UnfollowArtist,

    Play,
    Pause,
    Seek { position_ms: u64 },

    /// The artist detail view opened. Replaces any view still loading.
    OpenArtist { artist_id: Uuid },
    /// The artist detail view went away; a load still in flight is discarded.
    CloseArtist,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client
//=========================================================================================

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The discovery state changed; the UI re-renders from this alone.
    StateChanged { state: StateView },

    Notice { notice: NoticeKind },

    /// A command for the UI's media element.
    Playback { command: PlaybackCommand },

    /// XP and badges earned by an unveiling rating.
    Reward { reward: GamificationReward },

    /// Data for the open artist detail view.
    ArtistDetail { artist: Artist, is_following: bool },

    /// A message to show the user. The session stays usable.
    Error { message: String },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlaybackCommand {
    Load { url: String },
    Play,
    Pause,
    Stop,
    Unload,
    Seek { position_ms: u64 },
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    ThankYou,
    AlreadyRated,
}

impl From<SessionNotice> for NoticeKind {
    fn from(notice: SessionNotice) -> Self {
        match notice {
            SessionNotice::ThankYou => NoticeKind::ThankYou,
            SessionNotice::AlreadyRated => NoticeKind::AlreadyRated,
        }
    }
}

//=========================================================================================
// State Views
//=========================================================================================

/// What the UI may know about a track before its artist is unveiled.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AnonymousTrack {
    pub id: Uuid,
    pub genre: String,
    pub mood: String,
    pub duration_secs: Option<u32>,
}

impl From<&Track> for AnonymousTrack {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id,
            genre: track.genre.clone(),
            mood: track.mood.clone(),
            duration_secs: track.duration_secs,
        }
    }
}

/// The discovery state as sent over the wire. Artist identity only appears
/// once the track has been unveiled.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum StateView {
    MoodSelection,
    Loading,
    Playing { track: AnonymousTrack },
    Rating { track: AnonymousTrack },
    Revealed { track: Track, rating: u8 },
    FullListening { track: Track, rating: u8 },
    NoTracksInPreferences,
    NoTracksAtAll,
    Error { message: String },
}

impl From<&DiscoverState> for StateView {
    fn from(state: &DiscoverState) -> Self {
        match state {
            DiscoverState::MoodSelection => StateView::MoodSelection,
            DiscoverState::Loading => StateView::Loading,
            DiscoverState::Playing { track } => StateView::Playing {
                track: track.into(),
            },
            DiscoverState::Rating { track } => StateView::Rating {
                track: track.into(),
            },
            DiscoverState::Revealed { track, rating, .. } => StateView::Revealed {
                track: track.clone(),
                rating: rating.value(),
            },
            DiscoverState::FullListening { track, rating, .. } => StateView::FullListening {
                track: track.clone(),
                rating: rating.value(),
            },
            DiscoverState::NoTracksInPreferences => StateView::NoTracksInPreferences,
            DiscoverState::NoTracksAtAll => StateView::NoTracksAtAll,
            DiscoverState::Error { message } => StateView::Error {
                message: message.clone(),
            },
        }
    }
}

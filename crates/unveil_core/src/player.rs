//! crates/unveil_core/src/player.rs
//!
//! The audio playback adapter. It exclusively owns the single loaded media
//! resource, serializes every control operation behind one in-flight flag, and
//! tracks position/duration from the backend's periodic status callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::Track;
use crate::ports::{MediaBackend, StreamCounter};

/// Listening time after which a play counts as a stream.
pub const STREAM_COUNT_THRESHOLD_MS: u64 = 30_000;

//=========================================================================================
// Public Types
//=========================================================================================

/// One tick of the backend's status callback, tagged with the track the
/// media element was playing when it sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackStatus {
    pub track_id: Uuid,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub is_playing: bool,
}

/// Whether an operation ran or was dropped because another one was in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Done,
    Dropped,
}

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("Could not load this track: {0}")]
    Load(String),
    #[error("Playback control failed: {0}")]
    Control(String),
    #[error("No track is loaded")]
    NothingLoaded,
}

impl PlaybackError {
    /// Text suitable for the error screen.
    pub fn user_message(&self) -> String {
        match self {
            PlaybackError::Load(_) => {
                "This track could not be loaded. Check your connection and try again.".to_string()
            }
            PlaybackError::Control(_) => {
                "Playback stopped unexpectedly. Try again or start a new session.".to_string()
            }
            PlaybackError::NothingLoaded => "There is no track to play right now.".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Pause between releasing the old resource and acquiring the new one.
    pub settle_delay: Duration,
    pub stream_threshold_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(100),
            stream_threshold_ms: STREAM_COUNT_THRESHOLD_MS,
        }
    }
}

/// A copy of the player's observable state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerSnapshot {
    pub track_id: Option<Uuid>,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub is_playing: bool,
    pub stream_counted: bool,
}

/// position / duration, 0 when the duration is not known yet.
pub fn progress_of(position_ms: u64, duration_ms: u64) -> f64 {
    if duration_ms == 0 {
        0.0
    } else {
        position_ms as f64 / duration_ms as f64
    }
}

//=========================================================================================
// The Adapter
//=========================================================================================

pub struct AudioPlayer {
    backend: Arc<dyn MediaBackend>,
    streams: Arc<dyn StreamCounter>,
    config: PlayerConfig,
    in_flight: AtomicBool,
    state: RwLock<PlayerSnapshot>,
}

/// Clears the in-flight flag when the operation holding it ends, even on error.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AudioPlayer {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        streams: Arc<dyn StreamCounter>,
        config: PlayerConfig,
    ) -> Self {
        Self {
            backend,
            streams,
            config,
            in_flight: AtomicBool::new(false),
            state: RwLock::new(PlayerSnapshot::default()),
        }
    }

    fn begin(&self, op: &str) -> Option<InFlight<'_>> {
        match self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Some(InFlight(&self.in_flight)),
            Err(_) => {
                debug!("Dropping '{}': another playback operation is in flight", op);
                None
            }
        }
    }

    /// Tears down whatever is loaded, then acquires `track`'s audio.
    pub async fn load(&self, track: &Track, auto_play: bool) -> Result<Dispatch, PlaybackError> {
        let Some(_guard) = self.begin("load") else {
            return Ok(Dispatch::Dropped);
        };

        self.teardown().await;
        tokio::time::sleep(self.config.settle_delay).await;

        *self.state.write().await = PlayerSnapshot {
            track_id: Some(track.id),
            duration_ms: track.duration_ms().unwrap_or(0),
            ..Default::default()
        };

        if let Err(e) = self.backend.load(track.id, &track.audio_url).await {
            self.state.write().await.track_id = None;
            return Err(PlaybackError::Load(e.to_string()));
        }

        if auto_play {
            self.backend
                .play()
                .await
                .map_err(|e| PlaybackError::Control(e.to_string()))?;
            self.state.write().await.is_playing = true;
        }

        info!("Loaded track {} (autoplay: {})", track.id, auto_play);
        Ok(Dispatch::Done)
    }

    pub async fn play(&self) -> Result<Dispatch, PlaybackError> {
        let Some(_guard) = self.begin("play") else {
            return Ok(Dispatch::Dropped);
        };
        self.require_loaded().await?;
        self.backend
            .play()
            .await
            .map_err(|e| PlaybackError::Control(e.to_string()))?;
        self.state.write().await.is_playing = true;
        Ok(Dispatch::Done)
    }

    pub async fn pause(&self) -> Result<Dispatch, PlaybackError> {
        let Some(_guard) = self.begin("pause") else {
            return Ok(Dispatch::Dropped);
        };
        self.require_loaded().await?;
        self.backend
            .pause()
            .await
            .map_err(|e| PlaybackError::Control(e.to_string()))?;
        self.state.write().await.is_playing = false;
        Ok(Dispatch::Done)
    }

    pub async fn seek(&self, position_ms: u64) -> Result<Dispatch, PlaybackError> {
        let Some(_guard) = self.begin("seek") else {
            return Ok(Dispatch::Dropped);
        };
        self.require_loaded().await?;
        self.backend
            .seek(position_ms)
            .await
            .map_err(|e| PlaybackError::Control(e.to_string()))?;
        self.state.write().await.position_ms = position_ms;
        Ok(Dispatch::Done)
    }

    /// Stops and releases the loaded resource, leaving the player empty.
    pub async fn release(&self) -> Dispatch {
        let Some(_guard) = self.begin("release") else {
            return Dispatch::Dropped;
        };
        self.teardown().await;
        Dispatch::Done
    }

    /// Feeds one status tick from the backend. Returns false when the tick was
    /// ignored: nothing is loaded, or it belongs to a track that has since been
    /// replaced.
    pub async fn on_status(&self, status: PlaybackStatus) -> bool {
        let count_stream = {
            let mut state = self.state.write().await;
            let Some(track_id) = state.track_id else {
                return false;
            };
            if status.track_id != track_id {
                debug!(
                    "Ignoring stale status for track {} (loaded: {})",
                    status.track_id, track_id
                );
                return false;
            }
            state.position_ms = status.position_ms;
            if status.duration_ms > 0 {
                state.duration_ms = status.duration_ms;
            }
            state.is_playing = status.is_playing;

            if !state.stream_counted && status.position_ms >= self.config.stream_threshold_ms {
                state.stream_counted = true;
                Some(track_id)
            } else {
                None
            }
        };

        if let Some(track_id) = count_stream {
            if let Err(e) = self.streams.increment_track_streams(track_id).await {
                warn!("Failed to count stream for track {}: {}", track_id, e);
            }
        }
        true
    }

    pub async fn progress(&self) -> f64 {
        let state = self.state.read().await;
        progress_of(state.position_ms, state.duration_ms)
    }

    pub async fn snapshot(&self) -> PlayerSnapshot {
        self.state.read().await.clone()
    }

    async fn require_loaded(&self) -> Result<(), PlaybackError> {
        if self.state.read().await.track_id.is_none() {
            return Err(PlaybackError::NothingLoaded);
        }
        Ok(())
    }

    /// Best effort: a resource that fails to stop is still forgotten.
    async fn teardown(&self) {
        let had_track = self.state.read().await.track_id.is_some();
        if had_track {
            if let Err(e) = self.backend.stop().await {
                debug!("Ignoring stop failure during teardown: {}", e);
            }
            if let Err(e) = self.backend.unload().await {
                debug!("Ignoring unload failure during teardown: {}", e);
            }
        }
        *self.state.write().await = PlayerSnapshot::default();
    }
}

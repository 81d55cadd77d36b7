//! services/host/src/web/media_bridge.rs
//!
//! The media element lives in the UI, so the host-side `MediaBackend` turns
//! every control call into a `playback` frame. Status ticks come back as
//! `ClientMessage::PlaybackStatus` and are fed to the player by the socket loop.
//!
//! Load frames carry the host's own audio route for the track, never the
//! stored file location, which would name the track before it is unveiled.

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use unveil_core::ports::{MediaBackend, PortError, PortResult};
use uuid::Uuid;

use crate::web::protocol::{PlaybackCommand, ServerMessage};

/// The route the UI fetches a track's audio from.
pub fn audio_path(track_id: Uuid) -> String {
    format!("/tracks/{track_id}/audio")
}

pub struct WsMediaBackend {
    outbound: UnboundedSender<ServerMessage>,
}

impl WsMediaBackend {
    pub fn new(outbound: UnboundedSender<ServerMessage>) -> Self {
        Self { outbound }
    }

    fn command(&self, command: PlaybackCommand) -> PortResult<()> {
        self.outbound
            .send(ServerMessage::Playback { command })
            .map_err(|_| PortError::Network("The client disconnected".to_string()))
    }
}

#[async_trait]
impl MediaBackend for WsMediaBackend {
    async fn load(&self, track_id: Uuid, _url: &str) -> PortResult<()> {
        self.command(PlaybackCommand::Load {
            url: audio_path(track_id),
        })
    }

    async fn play(&self) -> PortResult<()> {
        self.command(PlaybackCommand::Play)
    }

    async fn pause(&self) -> PortResult<()> {
        self.command(PlaybackCommand::Pause)
    }

    async fn stop(&self) -> PortResult<()> {
        self.command(PlaybackCommand::Stop)
    }

    async fn unload(&self) -> PortResult<()> {
        self.command(PlaybackCommand::Unload)
    }

    async fn seek(&self, position_ms: u64) -> PortResult<()> {
        self.command(PlaybackCommand::Seek { position_ms })
    }
}

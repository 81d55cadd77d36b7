//! services/host/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a discovery WebSocket.
//! Each connection owns one `DiscoverySession` and handles its messages one at
//! a time; outgoing frames go through a channel drained by a writer task, so
//! the media bridge can emit playback commands from inside a session call.
//!
//! A connection also tracks the artist detail view the UI has open. Its load
//! runs on its own task and is dropped if the view closes before it lands.

use crate::web::{
    media_bridge::WsMediaBackend,
    protocol::{ClientMessage, ServerMessage},
    state::{AppState, AuthedUser},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use unveil_core::artist_detail::load_artist_detail;
use unveil_core::domain::Stars;
use unveil_core::player::{AudioPlayer, Dispatch, PlaybackError, PlaybackStatus};
use unveil_core::ports::ArtistStore;
use unveil_core::session::{
    DiscoverState, DiscoverySession, SessionConfig, SessionError, SessionPorts,
};
use uuid::Uuid;

const ARTIST_LOAD_FAILED: &str = "We couldn't load this artist. Please try again.";

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(authed): Extension<AuthedUser>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, authed))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, authed: AuthedUser) {
    let user_id = authed.user.id;
    info!("New discovery connection for user: {}", user_id);

    let (mut sender, mut receiver) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();

    // --- 1. Writer Task ---
    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize server message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                warn!("Client went away while sending.");
                break;
            }
        }
    });

    // --- 2. Session Setup ---
    let ports = app_state.ports_for(&authed.access_token);
    let player = AudioPlayer::new(
        Arc::new(WsMediaBackend::new(outbound.clone())),
        ports.streams,
        app_state.player_config(),
    );
    let mut connection = Connection::new(
        user_id,
        ports.session,
        player,
        app_state.session_config(),
    );
    let _ = outbound.send(ServerMessage::StateChanged {
        state: connection.session.state().into(),
    });

    // --- 3. Main Message Loop ---
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => handle_client_message(&mut connection, msg, &outbound).await,
                Err(e) => warn!("Failed to deserialize client message: {}", e),
            },
            Ok(Message::Close(_)) => {
                info!("Client sent close message.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive failed: {}", e);
                break;
            }
        }
    }

    // --- 4. Cleanup ---
    connection.artist_view.close();
    if connection.session.player().release().await == Dispatch::Dropped {
        debug!("Player was busy at disconnect");
    }
    drop(connection);
    drop(outbound);
    if let Err(e) = writer.await {
        error!("Writer task failed: {:?}", e);
    }
    info!("Discovery connection closed for user: {}", user_id);
}

//=========================================================================================
// Connection State
//=========================================================================================

struct Connection {
    session: DiscoverySession,
    artist_view: ArtistView,
}

impl Connection {
    fn new(
        user_id: Uuid,
        ports: SessionPorts,
        player: AudioPlayer,
        config: SessionConfig,
    ) -> Self {
        let artist_view = ArtistView::new(ports.artists.clone(), user_id);
        Self {
            session: DiscoverySession::new(user_id, ports, player, config),
            artist_view,
        }
    }
}

/// The artist detail view, while one is open. Its token is cancelled when the
/// view closes, is replaced, or the connection ends.
struct ArtistView {
    store: Arc<dyn ArtistStore>,
    user_id: Uuid,
    mounted: Option<CancellationToken>,
}

impl ArtistView {
    fn new(store: Arc<dyn ArtistStore>, user_id: Uuid) -> Self {
        Self {
            store,
            user_id,
            mounted: None,
        }
    }

    fn open(&mut self, artist_id: Uuid, outbound: UnboundedSender<ServerMessage>) -> JoinHandle<()> {
        self.close();
        let mounted = CancellationToken::new();
        self.mounted = Some(mounted.clone());
        let store = self.store.clone();
        let user_id = self.user_id;

        tokio::spawn(async move {
            let frame = match load_artist_detail(store.as_ref(), user_id, artist_id, &mounted).await {
                Ok(Some(detail)) => ServerMessage::ArtistDetail {
                    artist: detail.artist,
                    is_following: detail.is_following,
                },
                Ok(None) => return,
                Err(_) if mounted.is_cancelled() => return,
                Err(e) => {
                    warn!("Failed to load artist {}: {}", artist_id, e);
                    ServerMessage::Error {
                        message: ARTIST_LOAD_FAILED.to_string(),
                    }
                }
            };
            if outbound.send(frame).is_err() {
                debug!("Dropping artist detail for a closed connection");
            }
        })
    }

    fn close(&mut self) {
        if let Some(mounted) = self.mounted.take() {
            mounted.cancel();
        }
    }
}

//=========================================================================================
// Message Dispatch
//=========================================================================================

#[derive(Debug, thiserror::Error)]
enum ActionError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error("{0}")]
    InvalidInput(String),
}

impl ActionError {
    fn user_message(&self) -> String {
        match self {
            ActionError::Session(SessionError::Transition(_)) => {
                "That isn't available right now.".to_string()
            }
            ActionError::Session(SessionError::Port(_)) => {
                "Something went wrong talking to the server. Please try again.".to_string()
            }
            ActionError::Session(e @ SessionError::NothingRevealed) => e.to_string(),
            ActionError::Playback(e) => e.user_message(),
            ActionError::InvalidInput(message) => message.clone(),
        }
    }
}

async fn handle_client_message(
    connection: &mut Connection,
    msg: ClientMessage,
    outbound: &UnboundedSender<ServerMessage>,
) {
    match msg {
        ClientMessage::OpenArtist { artist_id } => {
            connection.artist_view.open(artist_id, outbound.clone());
            return;
        }
        ClientMessage::CloseArtist => {
            connection.artist_view.close();
            return;
        }
        ClientMessage::NewSession => connection.artist_view.close(),
        _ => {}
    }

    let session = &mut connection.session;
    let before = session.state().clone();
    let mut frames = Vec::new();

    if let Err(e) = dispatch(session, msg).await {
        warn!("Client action failed: {}", e);
        frames.push(ServerMessage::Error {
            message: e.user_message(),
        });
    }
    frames.extend(
        session
            .take_notices()
            .into_iter()
            .map(|notice| ServerMessage::Notice {
                notice: notice.into(),
            }),
    );
    frames.extend(state_frames(&before, session.state()));

    for frame in frames {
        if outbound.send(frame).is_err() {
            debug!("Dropping frame for a closed connection");
        }
    }
}

async fn dispatch(session: &mut DiscoverySession, msg: ClientMessage) -> Result<(), ActionError> {
    match msg {
        ClientMessage::SelectMood { mood } => {
            let mood = mood
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty());
            session.select_mood(mood).await?;
        }
        ClientMessage::PlaybackStatus {
            track_id,
            position_ms,
            duration_ms,
            is_playing,
        } => {
            session
                .on_playback_status(PlaybackStatus {
                    track_id,
                    position_ms,
                    duration_ms,
                    is_playing,
                })
                .await?;
        }
        ClientMessage::PlaybackError { detail } => session.on_playback_error(&detail)?,
        ClientMessage::SubmitRating { stars, review_text } => {
            let stars = Stars::try_from(stars).map_err(ActionError::InvalidInput)?;
            session.submit_rating(stars, review_text).await?;
        }
        ClientMessage::ContinueListening => session.continue_listening()?,
        ClientMessage::DiscoverNext => session.discover_next().await?,
        ClientMessage::BroadenSearch => session.broaden_search().await?,
        ClientMessage::Retry => session.retry().await?,
        ClientMessage::NewSession => session.new_session().await?,
        ClientMessage::FollowArtist => session.follow_revealed_artist().await?,
        ClientMessage::UnfollowArtist => session.unfollow_revealed_artist().await?,
        ClientMessage::Play => log_dropped("play", session.player().play().await?),
        ClientMessage::Pause => log_dropped("pause", session.player().pause().await?),
        ClientMessage::Seek { position_ms } => {
            log_dropped("seek", session.player().seek(position_ms).await?)
        }
        // Owned by the connection's artist view.
        ClientMessage::OpenArtist { .. } | ClientMessage::CloseArtist => {}
    }
    Ok(())
}

fn log_dropped(op: &str, dispatch: Dispatch) {
    if dispatch == Dispatch::Dropped {
        debug!("'{}' ignored: player busy", op);
    }
}

/// Frames announcing a state change: the reward first when an artist has just
/// been unveiled with one, then the new state. Nothing when the state held.
fn state_frames(before: &DiscoverState, after: &DiscoverState) -> Vec<ServerMessage> {
    if before == after {
        return Vec::new();
    }
    let mut frames = Vec::new();
    if let DiscoverState::Revealed {
        reward: Some(reward),
        ..
    } = after
    {
        if !matches!(before, DiscoverState::Revealed { .. }) {
            frames.push(ServerMessage::Reward {
                reward: reward.clone(),
            });
        }
    }
    frames.push(ServerMessage::StateChanged {
        state: after.into(),
    });
    frames
}

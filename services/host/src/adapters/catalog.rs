//! services/host/src/adapters/catalog.rs
//!
//! The `tracks` table, the stream-count RPC and the audio behind each track.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use unveil_core::domain::{Artist, StreamingLinks, Track};
use unveil_core::ports::{PortError, PortResult, StreamCounter, TrackCatalog};
use unveil_core::query::TrackQuery;
use uuid::Uuid;

use super::supabase::{in_list, SupabaseClient};

/// Embeds the artist row in each track.
pub(crate) const TRACK_SELECT: &str = "*,artist:artists(*)";

//=========================================================================================
// Wire Records
//=========================================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct ArtistRecord {
    id: Uuid,
    name: String,
    bio: Option<String>,
    avatar_url: Option<String>,
    #[serde(default)]
    genres: Option<Vec<String>>,
    spotify_url: Option<String>,
    apple_music_url: Option<String>,
    youtube_url: Option<String>,
    soundcloud_url: Option<String>,
    bandcamp_url: Option<String>,
}

impl ArtistRecord {
    pub(crate) fn to_domain(self) -> Artist {
        Artist {
            id: self.id,
            name: self.name,
            bio: self.bio,
            image_url: self.avatar_url,
            genres: self.genres.unwrap_or_default(),
            links: StreamingLinks {
                spotify: self.spotify_url,
                apple_music: self.apple_music_url,
                youtube: self.youtube_url,
                soundcloud: self.soundcloud_url,
                bandcamp: self.bandcamp_url,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TrackRecord {
    id: Uuid,
    title: String,
    audio_url: String,
    genre: Option<String>,
    mood: Option<String>,
    /// Seconds.
    duration: Option<i32>,
    artwork_url: Option<String>,
    spotify_streams: Option<i64>,
    artist: Option<ArtistRecord>,
}

impl TrackRecord {
    /// A track without its artist row is unusable: the unveil has nothing to show.
    pub(crate) fn to_domain(self) -> PortResult<Track> {
        let artist = self
            .artist
            .ok_or_else(|| PortError::Unexpected(format!("Track {} has no artist", self.id)))?;
        Ok(Track {
            id: self.id,
            title: self.title,
            artist: artist.to_domain(),
            audio_url: self.audio_url,
            genre: self.genre.unwrap_or_default(),
            mood: self.mood.unwrap_or_default(),
            duration_secs: self.duration.and_then(|d| u32::try_from(d).ok()),
            artwork_url: self.artwork_url,
            spotify_streams: self
                .spotify_streams
                .and_then(|s| u64::try_from(s).ok())
                .unwrap_or(0),
        })
    }
}

/// Converts fetched rows, skipping any that cannot become a playable track so
/// one broken row does not sink the whole fetch.
pub(crate) fn readable_tracks(records: Vec<TrackRecord>) -> Vec<Track> {
    records
        .into_iter()
        .filter_map(|record| match record.to_domain() {
            Ok(track) => Some(track),
            Err(e) => {
                warn!("Skipping unreadable track row: {}", e);
                None
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct AudioRecord {
    audio_url: String,
}

/// PostgREST query parameters for a candidate fetch.
pub(crate) fn candidate_params(query: &TrackQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("select", TRACK_SELECT.to_string()),
        ("spotify_streams", format!("lt.{}", query.max_streams)),
    ];
    if !query.genres.is_empty() {
        params.push(("genre", format!("in.{}", in_list(&query.genres))));
    }
    if !query.moods.is_empty() {
        params.push(("mood", format!("in.{}", in_list(&query.moods))));
    }
    if let Some(min) = query.min_duration_secs {
        params.push(("duration", format!("gte.{min}")));
    }
    if let Some(max) = query.max_duration_secs {
        params.push(("duration", format!("lte.{max}")));
    }
    if !query.exclude_ids.is_empty() {
        let ids: Vec<String> = query.exclude_ids.iter().map(Uuid::to_string).collect();
        params.push(("id", format!("not.in.({})", ids.join(","))));
    }
    params.push(("limit", query.limit.to_string()));
    params
}

//=========================================================================================
// The Adapter
//=========================================================================================

#[derive(Clone)]
pub struct SupabaseCatalog {
    client: SupabaseClient,
}

impl SupabaseCatalog {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Where a track's audio is stored. Only the host ever sees this.
    pub async fn audio_url(&self, track_id: Uuid) -> PortResult<String> {
        let request = self.client.rest(Method::GET, "tracks").query(&[
            ("select", "audio_url".to_string()),
            ("id", format!("eq.{track_id}")),
        ]);
        let records: Vec<AudioRecord> = self.client.fetch(request).await?;
        records
            .into_iter()
            .next()
            .map(|r| r.audio_url)
            .ok_or_else(|| PortError::NotFound(format!("Track {track_id}")))
    }

    /// Opens the track's audio for streaming, passing a `Range` header through.
    pub async fn open_audio(
        &self,
        track_id: Uuid,
        range: Option<&str>,
    ) -> PortResult<reqwest::Response> {
        let url = self.audio_url(track_id).await?;
        self.client.open_media(&url, range).await
    }
}

#[async_trait]
impl TrackCatalog for SupabaseCatalog {
    async fn fetch_candidates(&self, query: &TrackQuery) -> PortResult<Vec<Track>> {
        let request = self
            .client
            .rest(Method::GET, "tracks")
            .query(&candidate_params(query));
        let records: Vec<TrackRecord> = self.client.fetch(request).await?;
        debug!("Fetched {} candidate tracks", records.len());
        Ok(readable_tracks(records))
    }
}

#[async_trait]
impl StreamCounter for SupabaseCatalog {
    async fn increment_track_streams(&self, track_id: Uuid) -> PortResult<()> {
        let request = self
            .client
            .rpc("increment_track_streams")
            .json(&json!({ "track_id": track_id }));
        self.client.execute(request).await
    }
}

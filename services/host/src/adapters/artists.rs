//! services/host/src/adapters/artists.rs
//!
//! The `artists` table and `user_artist_subscriptions`, keyed by
//! (profile_id, artist_id).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use unveil_core::domain::{Artist, FollowedArtist};
use unveil_core::ports::{ArtistStore, PortError, PortResult};
use uuid::Uuid;

use super::catalog::ArtistRecord;
use super::supabase::SupabaseClient;

const SUBSCRIPTIONS: &str = "user_artist_subscriptions";

#[derive(Debug, Serialize)]
struct SubscriptionInsert {
    profile_id: Uuid,
    artist_id: Uuid,
    discovered_track_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionRecord {
    discovered_track_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    artist: Option<ArtistRecord>,
}

#[derive(Clone)]
pub struct SupabaseArtists {
    client: SupabaseClient,
}

impl SupabaseArtists {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    fn subscription_key(user_id: Uuid, artist_id: Uuid) -> [(&'static str, String); 2] {
        [
            ("profile_id", format!("eq.{user_id}")),
            ("artist_id", format!("eq.{artist_id}")),
        ]
    }
}

#[async_trait]
impl ArtistStore for SupabaseArtists {
    async fn get_artist(&self, artist_id: Uuid) -> PortResult<Artist> {
        let request = self
            .client
            .rest(Method::GET, "artists")
            .query(&[("select", "*".to_string()), ("id", format!("eq.{artist_id}"))]);
        let records: Vec<ArtistRecord> = self.client.fetch(request).await?;
        records
            .into_iter()
            .next()
            .map(ArtistRecord::to_domain)
            .ok_or_else(|| PortError::NotFound(format!("Artist {artist_id}")))
    }

    async fn follow_artist(
        &self,
        user_id: Uuid,
        artist_id: Uuid,
        discovered_track_id: Option<Uuid>,
    ) -> PortResult<()> {
        let request = self
            .client
            .rest(Method::POST, SUBSCRIPTIONS)
            .header("Prefer", "return=minimal")
            .json(&SubscriptionInsert {
                profile_id: user_id,
                artist_id,
                discovered_track_id,
            });
        self.client.execute(request).await
    }

    async fn unfollow_artist(&self, user_id: Uuid, artist_id: Uuid) -> PortResult<()> {
        let request = self
            .client
            .rest(Method::DELETE, SUBSCRIPTIONS)
            .query(&Self::subscription_key(user_id, artist_id));
        self.client.execute(request).await
    }

    async fn is_following(&self, user_id: Uuid, artist_id: Uuid) -> PortResult<bool> {
        let request = self
            .client
            .rest(Method::GET, SUBSCRIPTIONS)
            .query(&[("select", "artist_id".to_string())])
            .query(&Self::subscription_key(user_id, artist_id));
        let records: Vec<serde_json::Value> = self.client.fetch(request).await?;
        Ok(!records.is_empty())
    }

    async fn followed_artists(&self, user_id: Uuid) -> PortResult<Vec<FollowedArtist>> {
        let request = self.client.rest(Method::GET, SUBSCRIPTIONS).query(&[
            ("select", "discovered_track_id,created_at,artist:artists(*)".to_string()),
            ("profile_id", format!("eq.{user_id}")),
            ("order", "created_at.desc".to_string()),
        ]);
        let records: Vec<SubscriptionRecord> = self.client.fetch(request).await?;
        Ok(records
            .into_iter()
            .filter_map(|r| {
                r.artist.map(|artist| FollowedArtist {
                    artist: artist.to_domain(),
                    discovered_track_id: r.discovered_track_id,
                    subscribed_at: r.created_at,
                })
            })
            .collect())
    }
}

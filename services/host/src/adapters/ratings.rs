//! services/host/src/adapters/ratings.rs
//!
//! The `user_ratings` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::warn;
use unveil_core::domain::{RatedTrack, Rating, Stars};
use unveil_core::ports::{PortError, PortResult, RatingStore};
use uuid::Uuid;

use super::catalog::TrackRecord;
use super::supabase::SupabaseClient;

#[derive(Debug, Serialize)]
struct RatingInsert<'a> {
    track_id: Uuid,
    profile_id: Uuid,
    rating: u8,
    review_text: Option<&'a str>,
    is_blind_rating: bool,
    is_outside_preference: bool,
    listen_percentage: u8,
}

impl<'a> From<&'a Rating> for RatingInsert<'a> {
    fn from(rating: &'a Rating) -> Self {
        Self {
            track_id: rating.track_id,
            profile_id: rating.user_id,
            rating: rating.rating.value(),
            review_text: rating.review_text.as_deref(),
            is_blind_rating: rating.is_blind_rating,
            is_outside_preference: rating.is_outside_preference,
            listen_percentage: rating.listen_percentage,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RatedIdRecord {
    track_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct HistoryRecord {
    rating: i16,
    review_text: Option<String>,
    created_at: DateTime<Utc>,
    track: Option<TrackRecord>,
}

impl HistoryRecord {
    fn to_domain(self) -> PortResult<Option<RatedTrack>> {
        let Some(track) = self.track else {
            return Ok(None);
        };
        let rating = u8::try_from(self.rating)
            .ok()
            .and_then(|v| Stars::try_from(v).ok())
            .ok_or_else(|| PortError::Unexpected(format!("Stored rating {} is out of range", self.rating)))?;
        Ok(Some(RatedTrack {
            track: track.to_domain()?,
            rating,
            review_text: self.review_text,
            rated_at: self.created_at,
        }))
    }
}

#[derive(Clone)]
pub struct SupabaseRatings {
    client: SupabaseClient,
}

impl SupabaseRatings {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RatingStore for SupabaseRatings {
    async fn submit_rating(&self, rating: &Rating) -> PortResult<()> {
        let request = self
            .client
            .rest(Method::POST, "user_ratings")
            .header("Prefer", "return=minimal")
            .json(&RatingInsert::from(rating));
        self.client.execute(request).await
    }

    async fn rated_track_ids(&self, user_id: Uuid) -> PortResult<Vec<Uuid>> {
        let request = self.client.rest(Method::GET, "user_ratings").query(&[
            ("select", "track_id".to_string()),
            ("profile_id", format!("eq.{user_id}")),
        ]);
        let records: Vec<RatedIdRecord> = self.client.fetch(request).await?;
        Ok(records.into_iter().map(|r| r.track_id).collect())
    }

    async fn rating_history(&self, user_id: Uuid) -> PortResult<Vec<RatedTrack>> {
        let request = self.client.rest(Method::GET, "user_ratings").query(&[
            (
                "select",
                "rating,review_text,created_at,track:tracks(*,artist:artists(*))".to_string(),
            ),
            ("profile_id", format!("eq.{user_id}")),
            ("order", "created_at.desc".to_string()),
        ]);
        let records: Vec<HistoryRecord> = self.client.fetch(request).await?;

        let mut history = Vec::with_capacity(records.len());
        for record in records {
            match record.to_domain() {
                Ok(Some(rated)) => history.push(rated),
                // The track was deleted after it was rated.
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable history row: {}", e),
            }
        }
        Ok(history)
    }
}

//! services/host/src/adapters/preferences.rs
//!
//! The `user_preferences` and `user_streaming_preferences` tables. Writes are
//! upserts keyed by user id.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use unveil_core::domain::{StreamingPlatform, StreamingPreferences, UserPreferences};
use unveil_core::ports::{PortResult, PreferenceStore};
use uuid::Uuid;

use super::supabase::SupabaseClient;

const UPSERT: &str = "resolution=merge-duplicates,return=minimal";

#[derive(Debug, Serialize, Deserialize)]
struct PreferencesRecord {
    user_id: Uuid,
    #[serde(default)]
    preferred_genres: Option<Vec<String>>,
    #[serde(default)]
    preferred_moods: Option<Vec<String>>,
    min_duration: Option<u32>,
    max_duration: Option<u32>,
}

impl PreferencesRecord {
    fn from_domain(user_id: Uuid, prefs: &UserPreferences) -> Self {
        Self {
            user_id,
            preferred_genres: Some(prefs.preferred_genres.clone()),
            preferred_moods: Some(prefs.preferred_moods.clone()),
            min_duration: prefs.min_duration_secs,
            max_duration: prefs.max_duration_secs,
        }
    }

    fn to_domain(self) -> UserPreferences {
        UserPreferences {
            preferred_genres: self.preferred_genres.unwrap_or_default(),
            preferred_moods: self.preferred_moods.unwrap_or_default(),
            min_duration_secs: self.min_duration,
            max_duration_secs: self.max_duration,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StreamingRecord {
    user_id: Uuid,
    #[serde(default)]
    platforms: Vec<StreamingPlatform>,
    primary_platform: Option<StreamingPlatform>,
}

#[derive(Clone)]
pub struct SupabasePreferences {
    client: SupabaseClient,
}

impl SupabasePreferences {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PreferenceStore for SupabasePreferences {
    async fn get_preferences(&self, user_id: Uuid) -> PortResult<Option<UserPreferences>> {
        let request = self.client.rest(Method::GET, "user_preferences").query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{user_id}")),
        ]);
        let records: Vec<PreferencesRecord> = self.client.fetch(request).await?;
        Ok(records.into_iter().next().map(PreferencesRecord::to_domain))
    }

    async fn upsert_preferences(&self, user_id: Uuid, prefs: &UserPreferences) -> PortResult<()> {
        let request = self
            .client
            .rest(Method::POST, "user_preferences")
            .query(&[("on_conflict", "user_id")])
            .header("Prefer", UPSERT)
            .json(&PreferencesRecord::from_domain(user_id, prefs));
        self.client.execute(request).await
    }

    async fn get_streaming_preferences(
        &self,
        user_id: Uuid,
    ) -> PortResult<Option<StreamingPreferences>> {
        let request = self
            .client
            .rest(Method::GET, "user_streaming_preferences")
            .query(&[("select", "*".to_string()), ("user_id", format!("eq.{user_id}"))]);
        let records: Vec<StreamingRecord> = self.client.fetch(request).await?;
        Ok(records.into_iter().next().map(|r| StreamingPreferences {
            user_id: r.user_id,
            platforms: r.platforms,
            primary: r.primary_platform,
        }))
    }

    async fn upsert_streaming_preferences(&self, prefs: &StreamingPreferences) -> PortResult<()> {
        let record = StreamingRecord {
            user_id: prefs.user_id,
            platforms: prefs.platforms.clone(),
            primary_platform: prefs.primary,
        };
        let request = self
            .client
            .rest(Method::POST, "user_streaming_preferences")
            .query(&[("on_conflict", "user_id")])
            .header("Prefer", UPSERT)
            .json(&record);
        self.client.execute(request).await
    }
}

//! services/host/src/adapters/gamification.rs
//!
//! XP, badges and ranking come from remote procedures. Their results are
//! decoded and passed through untouched.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use unveil_core::domain::{Badge, GamificationReward, LeaderboardEntry, RatingSubmission};
use unveil_core::ports::{GamificationService, PortResult};
use uuid::Uuid;

use super::supabase::SupabaseClient;

#[derive(Debug, Deserialize)]
struct BadgeRecord {
    id: String,
    name: String,
    description: Option<String>,
    icon: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RewardRecord {
    xp_earned: u32,
    daily_streak_xp: Option<u32>,
    consecutive_bonus_xp: Option<u32>,
    new_badges: Vec<BadgeRecord>,
}

impl RewardRecord {
    fn to_domain(self) -> GamificationReward {
        GamificationReward {
            xp_earned: self.xp_earned,
            daily_streak_xp: self.daily_streak_xp,
            consecutive_bonus_xp: self.consecutive_bonus_xp,
            new_badges: self
                .new_badges
                .into_iter()
                .map(|b| Badge {
                    id: b.id,
                    name: b.name,
                    description: b.description,
                    icon: b.icon,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LeaderboardRecord {
    rank: u32,
    display_name: Option<String>,
    username: Option<String>,
    total_xp: u64,
    #[serde(default)]
    is_current_user: bool,
}

#[derive(Clone)]
pub struct SupabaseGamification {
    client: SupabaseClient,
}

impl SupabaseGamification {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GamificationService for SupabaseGamification {
    async fn calculate_rewards(
        &self,
        user_id: Uuid,
        rating: &RatingSubmission,
    ) -> PortResult<GamificationReward> {
        let request = self
            .client
            .rpc("calculate_gamification_rewards")
            .json(&json!({ "user_id": user_id, "rating_data": rating }));
        let record: RewardRecord = self.client.fetch(request).await?;
        Ok(record.to_domain())
    }

    async fn leaderboard(&self, user_id: Uuid) -> PortResult<Vec<LeaderboardEntry>> {
        let request = self
            .client
            .rpc("get_user_leaderboard")
            .json(&json!({ "user_id": user_id }));
        let records: Vec<LeaderboardRecord> = self.client.fetch(request).await?;
        Ok(records
            .into_iter()
            .map(|r| LeaderboardEntry {
                rank: r.rank,
                display_name: r
                    .display_name
                    .or(r.username)
                    .unwrap_or_else(|| "Anonymous".to_string()),
                total_xp: r.total_xp,
                is_current_user: r.is_current_user,
            })
            .collect())
    }
}

//! services/host/src/adapters/auth.rs
//!
//! GoTrue authentication plus the `profiles` table. Passwords never touch this
//! service beyond being forwarded; the backend owns credentials.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use unveil_core::domain::{AuthSession, Profile, User};
use unveil_core::ports::{AuthService, PortError, PortResult};
use uuid::Uuid;

use super::supabase::SupabaseClient;

#[derive(Debug, Deserialize)]
struct UserRecord {
    id: Uuid,
    email: Option<String>,
}

impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            email: self.email,
        }
    }
}

/// A token grant. Sign-up answers with a bare user when the project requires
/// email confirmation, so the token fields are optional.
#[derive(Debug, Deserialize)]
struct GrantRecord {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: Option<UserRecord>,
}

impl GrantRecord {
    fn to_domain(self, now: DateTime<Utc>) -> PortResult<AuthSession> {
        let (Some(access_token), Some(refresh_token), Some(user)) =
            (self.access_token, self.refresh_token, self.user)
        else {
            return Err(PortError::Validation(
                "Check your inbox to confirm your email address, then sign in".to_string(),
            ));
        };
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(|| now + Duration::seconds(self.expires_in.unwrap_or(3600)));
        Ok(AuthSession {
            user: user.to_domain(),
            access_token,
            refresh_token,
            expires_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProfileRecord {
    id: Uuid,
    username: Option<String>,
    display_name: Option<String>,
    #[serde(default)]
    onboarding_completed: bool,
}

impl ProfileRecord {
    fn to_domain(self) -> Profile {
        Profile {
            id: self.id,
            username: self.username,
            display_name: self.display_name,
            onboarding_completed: self.onboarding_completed,
        }
    }
}

#[derive(Debug, Serialize)]
struct OnboardingPatch<'a> {
    username: &'a str,
    onboarding_completed: bool,
}

#[derive(Clone)]
pub struct SupabaseAuth {
    client: SupabaseClient,
}

impl SupabaseAuth {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    async fn grant(&self, grant_type: &str, body: serde_json::Value) -> PortResult<AuthSession> {
        let request = self
            .client
            .auth(Method::POST, "token")
            .query(&[("grant_type", grant_type)])
            .json(&body);
        let record: GrantRecord = self.client.fetch(request).await?;
        record.to_domain(Utc::now())
    }
}

#[async_trait]
impl AuthService for SupabaseAuth {
    async fn sign_up(&self, email: &str, password: &str) -> PortResult<AuthSession> {
        let request = self
            .client
            .auth(Method::POST, "signup")
            .json(&json!({ "email": email, "password": password }));
        let record: GrantRecord = self.client.fetch(request).await?;
        record.to_domain(Utc::now())
    }

    async fn sign_in(&self, email: &str, password: &str) -> PortResult<AuthSession> {
        self.grant("password", json!({ "email": email, "password": password }))
            .await
    }

    async fn sign_out(&self, access_token: &str) -> PortResult<()> {
        let request = self
            .client
            .authorized(access_token)
            .auth(Method::POST, "logout");
        self.client.execute(request).await
    }

    async fn refresh(&self, refresh_token: &str) -> PortResult<AuthSession> {
        let session = self
            .grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await?;
        info!("Refreshed session for user {}", session.user.id);
        Ok(session)
    }

    async fn user_for_token(&self, access_token: &str) -> PortResult<User> {
        let request = self.client.authorized(access_token).auth(Method::GET, "user");
        let record: UserRecord = self.client.fetch(request).await?;
        Ok(record.to_domain())
    }

    async fn check_username_availability(&self, username: &str) -> PortResult<bool> {
        let request = self
            .client
            .rpc("check_username_availability")
            .json(&json!({ "username": username }));
        self.client.fetch(request).await
    }

    async fn get_profile(&self, access_token: &str, user_id: Uuid) -> PortResult<Profile> {
        let request = self
            .client
            .authorized(access_token)
            .rest(Method::GET, "profiles")
            .query(&[("select", "*".to_string()), ("id", format!("eq.{user_id}"))]);
        let records: Vec<ProfileRecord> = self.client.fetch(request).await?;
        records
            .into_iter()
            .next()
            .map(ProfileRecord::to_domain)
            .ok_or_else(|| PortError::NotFound(format!("Profile {user_id}")))
    }

    async fn complete_onboarding(
        &self,
        access_token: &str,
        user_id: Uuid,
        username: &str,
    ) -> PortResult<Profile> {
        let request = self
            .client
            .authorized(access_token)
            .rest(Method::PATCH, "profiles")
            .query(&[("id", format!("eq.{user_id}"))])
            .header("Prefer", "return=representation")
            .json(&OnboardingPatch {
                username,
                onboarding_completed: true,
            });
        let records: Vec<ProfileRecord> = self.client.fetch(request).await?;
        records
            .into_iter()
            .next()
            .map(ProfileRecord::to_domain)
            .ok_or_else(|| PortError::NotFound(format!("Profile {user_id}")))
    }
}

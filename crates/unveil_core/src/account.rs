//! crates/unveil_core/src/account.rs
//!
//! Sign-up, sign-in, session persistence and onboarding. Inputs are validated
//! locally first; everything else is delegated to the auth backend.
//!
//! Stored sessions are kept per user. Getting one back requires the refresh
//! token it was issued with, so a caller can only restore their own.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{AuthSession, Profile, StreamingPreferences, UserPreferences};
use crate::ports::{AuthService, PortError, PreferenceStore, SessionStorage};
use crate::validation::{validate_email, validate_password, validate_username, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("That username is already taken")]
    UsernameTaken,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Remote call failed: {0}")]
    Port(#[from] PortError),
}

/// What the onboarding screens collect.
#[derive(Debug, Clone)]
pub struct Onboarding {
    pub username: String,
    pub preferences: UserPreferences,
    pub streaming: Option<StreamingPreferences>,
}

#[derive(Clone)]
pub struct AccountService {
    auth: Arc<dyn AuthService>,
    storage: Arc<dyn SessionStorage>,
    preferences: Arc<dyn PreferenceStore>,
}

impl AccountService {
    pub fn new(
        auth: Arc<dyn AuthService>,
        storage: Arc<dyn SessionStorage>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            auth,
            storage,
            preferences,
        }
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        confirmation: &str,
    ) -> Result<AuthSession, AccountError> {
        validate_email(email)?;
        validate_password(password, confirmation)?;

        let session = self.auth.sign_up(email.trim(), password).await?;
        info!("Signed up user {}", session.user.id);
        self.persist(&session).await;
        Ok(session)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AccountError> {
        validate_email(email)?;

        let session = self
            .auth
            .sign_in(email.trim(), password)
            .await
            .map_err(|e| match e {
                PortError::Unauthorized | PortError::Validation(_) => {
                    AccountError::InvalidCredentials
                }
                other => AccountError::Port(other),
            })?;
        info!("Signed in user {}", session.user.id);
        self.persist(&session).await;
        Ok(session)
    }

    /// Revokes the token and forgets the stored session of the user it belongs
    /// to. The stored session is cleared even if the revocation fails.
    pub async fn sign_out(&self, access_token: &str) -> Result<(), AccountError> {
        let owner = match self.auth.user_for_token(access_token).await {
            Ok(user) => Some(user.id),
            Err(e) => {
                warn!("Sign-out token does not resolve to a user: {}", e);
                None
            }
        };
        if let Err(e) = self.auth.sign_out(access_token).await {
            warn!("Remote sign-out failed, clearing stored session anyway: {}", e);
        }
        if let Some(user_id) = owner {
            self.storage.clear(user_id).await?;
            info!("Signed out user {}", user_id);
        }
        Ok(())
    }

    pub async fn restore_session(
        &self,
        user_id: Uuid,
        refresh_token: &str,
    ) -> Result<Option<AuthSession>, AccountError> {
        self.restore_session_at(user_id, refresh_token, Utc::now())
            .await
    }

    /// Loads `user_id`'s persisted session, refreshing it when expired. The
    /// caller must present the session's refresh token; a mismatch restores
    /// nothing and leaves the stored session alone. A session that cannot be
    /// refreshed is cleared.
    pub async fn restore_session_at(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthSession>, AccountError> {
        let Some(stored) = self.storage.load(user_id).await? else {
            return Ok(None);
        };
        if stored.refresh_token != refresh_token {
            warn!("Refusing to restore session for user {}: token mismatch", user_id);
            return Ok(None);
        }
        if !stored.is_expired(now) {
            return Ok(Some(stored));
        }

        match self.auth.refresh(&stored.refresh_token).await {
            Ok(session) => {
                info!("Refreshed stored session for user {}", session.user.id);
                self.persist(&session).await;
                Ok(Some(session))
            }
            Err(e) => {
                warn!("Stored session could not be refreshed: {}", e);
                self.storage.clear(user_id).await?;
                Ok(None)
            }
        }
    }

    pub async fn check_username(&self, username: &str) -> Result<bool, AccountError> {
        validate_username(username)?;
        Ok(self.auth.check_username_availability(username).await?)
    }

    pub async fn complete_onboarding(
        &self,
        access_token: &str,
        user_id: Uuid,
        onboarding: &Onboarding,
    ) -> Result<Profile, AccountError> {
        validate_username(&onboarding.username)?;
        let current = match self.auth.get_profile(access_token, user_id).await {
            Ok(profile) => profile.username,
            Err(PortError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        // Re-submitting onboarding with the name already held is fine.
        if current.as_deref() != Some(onboarding.username.as_str())
            && !self.check_username(&onboarding.username).await?
        {
            return Err(AccountError::UsernameTaken);
        }

        self.preferences
            .upsert_preferences(user_id, &onboarding.preferences)
            .await?;
        if let Some(streaming) = &onboarding.streaming {
            self.preferences.upsert_streaming_preferences(streaming).await?;
        }

        let profile = self
            .auth
            .complete_onboarding(access_token, user_id, &onboarding.username)
            .await
            .map_err(|e| match e {
                PortError::Conflict(_) => AccountError::UsernameTaken,
                other => AccountError::Port(other),
            })?;
        info!("Onboarding completed for user {}", user_id);
        Ok(profile)
    }

    async fn persist(&self, session: &AuthSession) {
        if let Err(e) = self.storage.save(session).await {
            warn!("Could not persist session: {}", e);
        }
    }
}

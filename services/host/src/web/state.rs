//! services/host/src/web/state.rs
//!
//! Defines the application's shared state and the per-request identity the
//! auth middleware attaches.

use crate::adapters::{ports_for_user, SupabaseClient, SupabasePreferences, UserPorts};
use crate::config::Config;
use std::sync::Arc;
use unveil_core::account::AccountService;
use unveil_core::domain::User;
use unveil_core::player::PlayerConfig;
use unveil_core::ports::{AuthService, PreferenceStore, SessionStorage};
use unveil_core::session::SessionConfig;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub supabase: SupabaseClient,
    pub auth: Arc<dyn AuthService>,
    pub session_storage: Arc<dyn SessionStorage>,
}

impl AppState {
    /// Backend ports acting as the signed-in user.
    pub fn ports_for(&self, access_token: &str) -> UserPorts {
        ports_for_user(&self.supabase, access_token)
    }

    /// Account flows. Onboarding writes preferences, so those go out under
    /// the user's token when there is one.
    pub fn accounts(&self, access_token: Option<&str>) -> AccountService {
        let preferences: Arc<dyn PreferenceStore> = match access_token {
            Some(token) => self.ports_for(token).session.preferences,
            None => Arc::new(SupabasePreferences::new(self.supabase.clone())),
        };
        AccountService::new(self.auth.clone(), self.session_storage.clone(), preferences)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            rating_threshold: self.config.rating_threshold,
            transition_delay: self.config.transition_delay,
            ..SessionConfig::default()
        }
    }

    pub fn player_config(&self) -> PlayerConfig {
        PlayerConfig {
            settle_delay: self.config.settle_delay,
            ..PlayerConfig::default()
        }
    }
}

//=========================================================================================
// Request Identity
//=========================================================================================

/// Inserted into request extensions by `require_auth`.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub user: User,
    pub access_token: String,
}

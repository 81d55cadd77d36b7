pub mod artists;
pub mod auth;
pub mod catalog;
pub mod gamification;
pub mod preferences;
pub mod ratings;
pub mod session_file;
pub mod supabase;

pub use artists::SupabaseArtists;
pub use auth::SupabaseAuth;
pub use catalog::SupabaseCatalog;
pub use gamification::SupabaseGamification;
pub use preferences::SupabasePreferences;
pub use ratings::SupabaseRatings;
pub use session_file::FileSessionStorage;
pub use supabase::SupabaseClient;

use std::sync::Arc;

use unveil_core::session::SessionPorts;

/// Data ports acting on behalf of one signed-in user.
pub fn ports_for_user(client: &SupabaseClient, access_token: &str) -> UserPorts {
    let client = client.authorized(access_token);
    let catalog = Arc::new(SupabaseCatalog::new(client.clone()));
    UserPorts {
        session: SessionPorts {
            catalog: catalog.clone(),
            ratings: Arc::new(SupabaseRatings::new(client.clone())),
            preferences: Arc::new(SupabasePreferences::new(client.clone())),
            artists: Arc::new(SupabaseArtists::new(client.clone())),
            gamification: Arc::new(SupabaseGamification::new(client)),
        },
        streams: catalog,
    }
}

#[derive(Clone)]
pub struct UserPorts {
    pub session: SessionPorts,
    pub streams: Arc<SupabaseCatalog>,
}

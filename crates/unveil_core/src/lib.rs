pub mod account;
pub mod artist_detail;
pub mod domain;
pub mod history;
pub mod player;
pub mod ports;
pub mod query;
pub mod retry;
pub mod session;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

pub use account::{AccountError, AccountService, Onboarding};
pub use domain::{
    Artist, AuthSession, FollowedArtist, GamificationReward, Profile, RatedTrack, Rating, Stars,
    Track, User, UserPreferences,
};
pub use player::{AudioPlayer, PlaybackStatus, PlayerConfig};
pub use ports::{
    ArtistStore, AuthService, GamificationService, MediaBackend, PortError, PortResult,
    PreferenceStore, RatingStore, SessionStorage, StreamCounter, TrackCatalog,
};
pub use session::{DiscoverState, DiscoverySession, SessionConfig, SessionError, SessionPorts};

//! crates/unveil_core/src/artist_detail.rs
//!
//! Loads the artist detail view. The caller passes a token that is cancelled
//! when its view goes away; a result that arrives afterwards is dropped instead
//! of being applied. The remote calls themselves still run to completion.

use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::domain::Artist;
use crate::ports::{ArtistStore, PortResult};

#[derive(Debug, Clone, PartialEq)]
pub struct ArtistDetail {
    pub artist: Artist,
    pub is_following: bool,
}

pub async fn fetch_artist_detail(
    store: &dyn ArtistStore,
    user_id: Uuid,
    artist_id: Uuid,
) -> PortResult<ArtistDetail> {
    let artist = store.get_artist(artist_id).await?;
    let is_following = store.is_following(user_id, artist_id).await?;
    Ok(ArtistDetail {
        artist,
        is_following,
    })
}

/// `Ok(None)` means the view was gone by the time the data arrived.
pub async fn load_artist_detail(
    store: &dyn ArtistStore,
    user_id: Uuid,
    artist_id: Uuid,
    mounted: &CancellationToken,
) -> PortResult<Option<ArtistDetail>> {
    let detail = fetch_artist_detail(store, user_id, artist_id).await?;
    if mounted.is_cancelled() {
        debug!("Artist {} loaded after its view closed, discarding", artist_id);
        return Ok(None);
    }
    Ok(Some(detail))
}

//! crates/unveil_core/src/history.rs
//!
//! Filtering and sorting of the already-fetched history lists. Everything here
//! is pure: same input, same output, no remote calls. Sorts are stable, so ties
//! keep their fetch order in both directions.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::{FollowedArtist, RatedTrack};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSortKey {
    #[default]
    Date,
    Title,
    Artist,
    Rating,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtistSortKey {
    #[default]
    Date,
    Name,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackSort {
    pub key: TrackSortKey,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtistSort {
    pub key: ArtistSortKey,
    pub order: SortOrder,
}

/// Equality filters for the rated-tracks list; `None` means "all".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackFilter {
    pub genre: Option<String>,
    pub mood: Option<String>,
}

/// Keeps artists with at least one of the selected genres; empty keeps all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtistFilter {
    pub genres: BTreeSet<String>,
}

fn text_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

fn matches_text(wanted: &Option<String>, actual: &str) -> bool {
    wanted
        .as_deref()
        .map_or(true, |w| w.eq_ignore_ascii_case(actual))
}

pub fn filter_and_sort_tracks(
    tracks: &[RatedTrack],
    filter: &TrackFilter,
    sort: TrackSort,
) -> Vec<RatedTrack> {
    let mut out: Vec<RatedTrack> = tracks
        .iter()
        .filter(|t| matches_text(&filter.genre, &t.track.genre))
        .filter(|t| matches_text(&filter.mood, &t.track.mood))
        .cloned()
        .collect();

    out.sort_by(|a, b| {
        let ordering = match sort.key {
            TrackSortKey::Date => a.rated_at.cmp(&b.rated_at),
            TrackSortKey::Title => text_cmp(&a.track.title, &b.track.title),
            TrackSortKey::Artist => text_cmp(&a.track.artist.name, &b.track.artist.name),
            TrackSortKey::Rating => a.rating.cmp(&b.rating),
        };
        sort.order.apply(ordering)
    });
    out
}

pub fn filter_and_sort_artists(
    artists: &[FollowedArtist],
    filter: &ArtistFilter,
    sort: ArtistSort,
) -> Vec<FollowedArtist> {
    let wanted: BTreeSet<String> = filter.genres.iter().map(|g| g.to_lowercase()).collect();
    let mut out: Vec<FollowedArtist> = artists
        .iter()
        .filter(|a| {
            wanted.is_empty()
                || a.artist
                    .genres
                    .iter()
                    .any(|g| wanted.contains(&g.to_lowercase()))
        })
        .cloned()
        .collect();

    out.sort_by(|a, b| {
        let ordering = match sort.key {
            ArtistSortKey::Date => a.subscribed_at.cmp(&b.subscribed_at),
            ArtistSortKey::Name => text_cmp(&a.artist.name, &b.artist.name),
        };
        sort.order.apply(ordering)
    });
    out
}

/// Distinct genres in the list, for the filter chips.
pub fn available_genres(tracks: &[RatedTrack]) -> Vec<String> {
    distinct(tracks.iter().map(|t| t.track.genre.as_str()))
}

pub fn available_moods(tracks: &[RatedTrack]) -> Vec<String> {
    distinct(tracks.iter().map(|t| t.track.mood.as_str()))
}

pub fn available_artist_genres(artists: &[FollowedArtist]) -> Vec<String> {
    distinct(
        artists
            .iter()
            .flat_map(|a| a.artist.genres.iter().map(String::as_str)),
    )
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

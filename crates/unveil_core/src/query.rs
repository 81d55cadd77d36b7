//! crates/unveil_core/src/query.rs
//!
//! Builds the candidate query for the next discovery track.

use uuid::Uuid;

use crate::domain::UserPreferences;

/// Tracks at or above this many streams are not "underground".
pub const MAX_UNDERGROUND_STREAMS: u64 = 5000;
/// Size of the candidate pool a track is drawn from.
pub const CANDIDATE_LIMIT: usize = 50;

/// Which constraints narrow the next candidate fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveFilter {
    SessionMood(String),
    Preferences(UserPreferences),
    Unfiltered,
}

impl ActiveFilter {
    /// Filter precedence: a broadened session ignores everything, then the mood
    /// picked for this session, then the stored preferences, then nothing.
    pub fn resolve(
        broadened: bool,
        session_mood: Option<&str>,
        stored: Option<&UserPreferences>,
    ) -> Self {
        if broadened {
            return ActiveFilter::Unfiltered;
        }
        if let Some(mood) = session_mood {
            return ActiveFilter::SessionMood(mood.to_string());
        }
        match stored {
            Some(prefs) if !prefs.is_empty() => ActiveFilter::Preferences(prefs.clone()),
            _ => ActiveFilter::Unfiltered,
        }
    }

    pub fn is_unfiltered(&self) -> bool {
        matches!(self, ActiveFilter::Unfiltered)
    }
}

/// A candidate query against the remote `tracks` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackQuery {
    pub max_streams: u64,
    pub genres: Vec<String>,
    pub moods: Vec<String>,
    pub min_duration_secs: Option<u32>,
    pub max_duration_secs: Option<u32>,
    pub exclude_ids: Vec<Uuid>,
    pub limit: usize,
}

impl TrackQuery {
    pub fn new(filter: &ActiveFilter, exclude_ids: &[Uuid]) -> Self {
        let mut query = Self::unfiltered(exclude_ids);
        match filter {
            ActiveFilter::SessionMood(mood) => query.moods = vec![mood.clone()],
            ActiveFilter::Preferences(prefs) => {
                query.genres = prefs.preferred_genres.clone();
                query.moods = prefs.preferred_moods.clone();
                query.min_duration_secs = prefs.min_duration_secs;
                query.max_duration_secs = prefs.max_duration_secs;
            }
            ActiveFilter::Unfiltered => {}
        }
        query
    }

    /// Keeps the stream cap and the exclusions, drops every taste constraint.
    pub fn unfiltered(exclude_ids: &[Uuid]) -> Self {
        Self {
            max_streams: MAX_UNDERGROUND_STREAMS,
            genres: Vec::new(),
            moods: Vec::new(),
            min_duration_secs: None,
            max_duration_secs: None,
            exclude_ids: exclude_ids.to_vec(),
            limit: CANDIDATE_LIMIT,
        }
    }

    pub fn has_taste_filters(&self) -> bool {
        !self.genres.is_empty()
            || !self.moods.is_empty()
            || self.min_duration_secs.is_some()
            || self.max_duration_secs.is_some()
    }
}

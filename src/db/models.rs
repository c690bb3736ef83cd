use chrono::{DateTime, Utc};

/// A track from the user's library, as supplied by the library export.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRef {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album_or_isrc: Option<String>,
}

/// A tempo-cache row.
///
/// `bpm == None` means the key was looked up and the service had no tempo for it.
/// A key that was never looked up has no record at all.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoRecord {
    pub normalized_key: String,
    pub bpm: Option<f64>,
    pub fetched_at: DateTime<Utc>,
    pub source: String,
}

/// A stored zone model snapshot with its row metadata.
#[derive(Debug, Clone)]
pub struct ZoneSnapshot {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub model: crate::cadence::zones::ZoneModel,
}

/// Summary counts for `cadence-beats stats`.
#[derive(Debug)]
pub struct LibraryStats {
    pub library_tracks: i64,
    pub tempos_known: i64,
    pub tempos_not_found: i64,
    pub zone_snapshots: i64,
    /// (source, count) for cached tempo records
    pub sources: Vec<(String, i64)>,
}

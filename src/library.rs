//! Library import from a JSON export.
//!
//! Accepts either a bare array of tracks or an object with a `tracks` array:
//!
//! ```json
//! {"tracks": [{"id": "3n3Ppam7vgaVa1iaRUc9Lp", "name": "Mr. Brightside", "artist": "The Killers"}]}
//! ```

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::db::models::TrackRef;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid library JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One library entry as exported. Parsed per entry so a malformed one is skipped
/// without losing the rest.
#[derive(Deserialize)]
struct RawTrack {
    id: String,
    #[serde(alias = "name")]
    title: String,
    #[serde(default)]
    artist: String,
    #[serde(default)]
    album: Option<String>,
    #[serde(default)]
    isrc: Option<String>,
    #[serde(default)]
    album_or_isrc: Option<String>,
}

impl RawTrack {
    fn into_track(self) -> TrackRef {
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        TrackRef {
            id: self.id.trim().to_string(),
            title: self.title.trim().to_string(),
            artist: self.artist.trim().to_string(),
            // ISRC identifies the recording, so it wins over the album name
            album_or_isrc: clean(self.isrc)
                .or_else(|| clean(self.album_or_isrc))
                .or_else(|| clean(self.album)),
        }
    }
}

/// Read and clean a library export.
///
/// Fields are trimmed; entries that don't parse, or have no id or title, are
/// dropped, as are repeated ids after the first. Order is preserved.
pub fn load_library(path: &Path) -> Result<Vec<TrackRef>, LibraryError> {
    let contents = std::fs::read_to_string(path).map_err(|source| LibraryError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_library(&contents).map_err(|source| LibraryError::Json {
        path: path.display().to_string(),
        source,
    })
}

fn parse_library(contents: &str) -> Result<Vec<TrackRef>, serde_json::Error> {
    let entries = match serde_json::from_str::<Value>(contents)? {
        Value::Array(entries) => entries,
        Value::Object(mut obj) => match obj.remove("tracks") {
            Some(Value::Array(entries)) => entries,
            _ => return Err(serde::de::Error::custom("expected a `tracks` array")),
        },
        _ => return Err(serde::de::Error::custom("expected an array of tracks")),
    };

    let total = entries.len();
    let mut seen = HashSet::new();
    let mut tracks = Vec::with_capacity(total);
    for (i, entry) in entries.into_iter().enumerate() {
        let track = match serde_json::from_value::<RawTrack>(entry) {
            Ok(raw) => raw.into_track(),
            Err(e) => {
                log::warn!("Skipping library entry {i}: {e}");
                continue;
            }
        };
        if track.id.is_empty() || track.title.is_empty() || !seen.insert(track.id.clone()) {
            continue;
        }
        tracks.push(track);
    }

    if tracks.len() < total {
        log::warn!(
            "Dropped {} library entries (malformed, missing id/title or duplicate id)",
            total - tracks.len()
        );
    }

    Ok(tracks)
}

//! Write generated playlists to a JSON file for import into a music service.

use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

use super::PlaylistGrouping;
use crate::cadence::zones::ZoneModel;
use crate::config::PlaylistConfig;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode playlists: {0}")]
    Json(#[from] serde_json::Error),
}

/// One playlist ready for the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedPlaylist {
    pub name: String,
    pub description: String,
    pub zone: String,
    pub lower_spm: f64,
    pub upper_spm: f64,
    pub track_ids: Vec<String>,
    pub track_uris: Vec<String>,
}

#[derive(Serialize)]
struct ExportFile<'a> {
    generated_at: String,
    zone_source: &'static str,
    sample_count: usize,
    playlists: &'a [ExportedPlaylist],
    unmatched: &'a [String],
}

fn title_case(label: &str) -> String {
    label
        .split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Playlists in zone order (slowest first), skipping zones with no tracks.
pub fn build_playlists(model: &ZoneModel, grouping: &PlaylistGrouping, config: &PlaylistConfig) -> Vec<ExportedPlaylist> {
    model
        .zones()
        .iter()
        .filter_map(|zone| {
            let ids = grouping.track_ids(&zone.label);
            if ids.is_empty() {
                return None;
            }
            let (lo, hi) = (zone.lower_bound_spm, zone.upper_bound_spm);
            Some(ExportedPlaylist {
                name: format!("{}: {} Pace ({lo:.0}-{hi:.0} spm)", config.prefix, title_case(&zone.label)),
                description: format!(
                    "Songs matched to a {lo:.0}-{hi:.0} steps/min running cadence. BPM data from GetSongBPM.com"
                ),
                zone: zone.label.clone(),
                lower_spm: lo,
                upper_spm: hi,
                track_ids: ids.to_vec(),
                track_uris: ids.iter().map(|id| format!("{}{id}", config.uri_prefix)).collect(),
            })
        })
        .collect()
}

/// Write playlists plus the unmatched list as pretty JSON, replacing `path`.
pub fn write_playlists(
    path: &Path,
    model: &ZoneModel,
    playlists: &[ExportedPlaylist],
    unmatched: &[String],
) -> Result<(), ExportError> {
    let file = ExportFile {
        generated_at: Utc::now().to_rfc3339(),
        zone_source: if model.is_fallback() { "fallback" } else { "derived" },
        sample_count: model.sample_count(),
        playlists,
        unmatched,
    };
    let json = serde_json::to_string_pretty(&file)?;

    let io_err = |source| ExportError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, json).map_err(io_err)?;
    Ok(())
}

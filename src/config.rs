use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::cadence::ZonePolicy;
use crate::cadence::default_fallback_zones;
use crate::cadence::zones::{Zone, ZoneModelError};
use crate::tempo::lookup::GETSONGBPM_BASE_URL;

/// Environment variable that overrides `tempo_lookup.api_key`.
pub const API_KEY_ENV: &str = "GETSONGBPM_API_KEY";

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults, the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Directory of exported activity JSON files (used when `analyze-runs` has no CLI arg).
    pub activity_dir: Option<PathBuf>,
    /// Library export to import (used when `import-library` has no CLI arg).
    pub library_file: Option<PathBuf>,
    /// Where generated playlists are written.
    pub output_path: Option<PathBuf>,
    pub zones: ZoneConfig,
    pub tempo_lookup: TempoLookupConfig,
    pub playlists: PlaylistConfig,
}

/// Zone derivation settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    /// Distinct runs required before zones are derived from the runner's data.
    pub min_runs: usize,
    /// Table used below `min_runs`, slowest zone first.
    pub fallback: Vec<Zone>,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            min_runs: crate::MIN_RUNS,
            fallback: default_fallback_zones(),
        }
    }
}

impl ZoneConfig {
    pub fn policy(&self) -> Result<ZonePolicy, ZoneModelError> {
        ZonePolicy::new(self.min_runs, self.fallback.clone())
    }
}

/// GetSongBPM API configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TempoLookupConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Rate limit between API requests in milliseconds.
    pub rate_limit_ms: u64,
    pub timeout_secs: u64,
}

impl Default for TempoLookupConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: GETSONGBPM_BASE_URL.to_string(),
            rate_limit_ms: 1000,
            timeout_secs: 10,
        }
    }
}

impl TempoLookupConfig {
    /// API key from the environment, else from the config file. Blank counts as unset.
    pub fn resolve_api_key(&self) -> Option<String> {
        Self::pick_api_key(std::env::var(API_KEY_ENV).ok(), self.api_key.clone())
    }

    fn pick_api_key(env: Option<String>, configured: Option<String>) -> Option<String> {
        [env, configured]
            .into_iter()
            .flatten()
            .map(|k| k.trim().to_string())
            .find(|k| !k.is_empty())
    }
}

/// Exported playlist naming.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PlaylistConfig {
    /// Playlist names look like "{prefix}: Easy Pace (150-165 spm)".
    pub prefix: String,
    /// Prepended to each track id to form a playable URI.
    pub uri_prefix: String,
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            prefix: "Run".to_string(),
            uri_prefix: "spotify:track:".to_string(),
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/cadence-beats/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    data_file("cadence-beats.db")
}

/// Default location for generated playlists, next to the database.
pub fn default_output_path() -> PathBuf {
    data_file("playlists.json")
}

fn data_file(name: &str) -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join(name)
    } else {
        // Fallback: current directory
        PathBuf::from(name)
    }
}

pub mod cadence;
pub mod config;
pub mod db;
pub mod library;
pub mod matcher;
pub mod normalize;
pub mod playlist;
pub mod tempo;

/// Application name for XDG paths
pub const APP_NAME: &str = "cadence-beats";

/// Minimum number of distinct qualifying runs before zones are derived from
/// percentiles instead of the fallback table.
pub const MIN_RUNS: usize = 10;

//! Activity archive: a directory of per-run FIT files or JSON exports.
//!
//! `*.fit` files are read with `fitparser`: every `record` message with a
//! timestamp and a positive `cadence` becomes a sample, and the `sport` of the
//! session (when present) decides whether the file is a run.
//!
//! `*.json` files hold one activity each:
//!
//! ```json
//! {
//!   "activity_id": 12345678,
//!   "activity_type": "running",
//!   "records": [
//!     { "timestamp": "2024-05-01T06:30:00Z", "cadence": 86 },
//!     { "timestamp": "2024-05-01T06:30:01Z", "steps_per_minute": 173 }
//!   ]
//! }
//! ```
//!
//! `activity_type` may also be a Garmin Connect object (`{"typeKey": "running"}`).
//! `cadence` is the per-foot value watches record and is doubled; `steps_per_minute`
//! is taken as-is. Activities whose type isn't a running type are skipped.

use chrono::{DateTime, Utc};
use fitparser::profile::MesgNum;
use rayon::prelude::*;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use super::CadenceSample;

#[derive(Error, Debug)]
pub enum ActivityError {
    #[error("Activity directory not found: {0}")]
    MissingDir(String),
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid activity JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid FIT file {path}: {source}")]
    Fit {
        path: String,
        #[source]
        source: fitparser::Error,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ActivityId {
    Number(u64),
    Text(String),
}

/// A bare type name, or Garmin Connect's `{"typeKey": "running", "typeId": 1, ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ActivityType {
    Name(String),
    Typed {
        #[serde(alias = "typeKey")]
        type_key: String,
    },
}

impl ActivityType {
    fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Typed { type_key } => type_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ActivityFile {
    #[serde(default, alias = "activityId")]
    activity_id: Option<ActivityId>,
    #[serde(default, alias = "activityType", alias = "sport")]
    activity_type: Option<ActivityType>,
    #[serde(default)]
    records: Vec<ActivityRecord>,
}

#[derive(Debug, Deserialize)]
struct ActivityRecord {
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    steps_per_minute: Option<f64>,
    #[serde(default)]
    cadence: Option<f64>,
}

impl ActivityRecord {
    fn spm(&self) -> Option<f64> {
        self.steps_per_minute.or(self.cadence.map(|c| c * 2.0))
    }
}

/// Per-run summary, for reporting.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub samples: usize,
    pub mean_spm: f64,
}

/// Everything loaded from an archive directory.
#[derive(Debug, Default)]
pub struct ActivityLoad {
    pub samples: Vec<CadenceSample>,
    pub runs: Vec<RunSummary>,
    /// Files skipped because they aren't running activities
    pub skipped: usize,
    /// Files that failed to read or parse
    pub errors: usize,
}

struct ParsedRun {
    run_id: String,
    samples: Vec<CadenceSample>,
}

/// Load every `*.json` activity under `dir`.
///
/// Files are parsed in parallel; results are ordered by run id so the sample
/// sequence is the same on every run. One bad file never stops the rest.
pub fn load_activities(dir: &Path) -> Result<ActivityLoad, ActivityError> {
    if !dir.is_dir() {
        return Err(ActivityError::MissingDir(dir.display().to_string()));
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("json") || e.eq_ignore_ascii_case("fit"))
        })
        .collect();
    paths.sort();

    log::info!("Found {} activity files in {}", paths.len(), dir.display());

    let parsed: Vec<_> = paths.par_iter().map(|p| parse_activity_file(p)).collect();

    let mut load = ActivityLoad::default();
    let mut runs = Vec::new();
    for (path, result) in paths.iter().zip(parsed) {
        match result {
            Ok(Some(run)) => runs.push(run),
            Ok(None) => {
                log::debug!("Skipping non-running activity {}", path.display());
                load.skipped += 1;
            }
            Err(e) => {
                log::warn!("{e}");
                load.errors += 1;
            }
        }
    }

    runs.sort_by(|a, b| a.run_id.cmp(&b.run_id));

    for run in runs {
        let valid: Vec<f64> = run
            .samples
            .iter()
            .filter(|s| s.is_valid())
            .map(|s| s.steps_per_minute)
            .collect();
        let mean_spm = if valid.is_empty() {
            0.0
        } else {
            valid.iter().sum::<f64>() / valid.len() as f64
        };
        load.runs.push(RunSummary {
            run_id: run.run_id,
            samples: valid.len(),
            mean_spm,
        });
        load.samples.extend(run.samples);
    }

    Ok(load)
}

fn is_running_type(activity_type: Option<&str>) -> bool {
    match activity_type {
        // Archives are expected to hold runs only; untyped files are trusted
        None => true,
        Some(t) => t.to_lowercase().contains("run"),
    }
}

fn is_fit(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("fit"))
}

fn file_stem_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn parse_activity_file(path: &Path) -> Result<Option<ParsedRun>, ActivityError> {
    if is_fit(path) {
        parse_fit_file(path)
    } else {
        parse_json_file(path)
    }
}

fn parse_json_file(path: &Path) -> Result<Option<ParsedRun>, ActivityError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ActivityError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let file: ActivityFile = serde_json::from_str(&contents).map_err(|source| ActivityError::Json {
        path: path.display().to_string(),
        source,
    })?;

    if !is_running_type(file.activity_type.as_ref().map(ActivityType::name)) {
        return Ok(None);
    }

    let run_id = match file.activity_id {
        Some(ActivityId::Number(n)) => n.to_string(),
        Some(ActivityId::Text(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => file_stem_id(path),
    };

    let samples = file
        .records
        .iter()
        .filter_map(|r| {
            let timestamp = r.timestamp?;
            let spm = r.spm()?;
            Some(CadenceSample::new(spm, timestamp, run_id.clone()))
        })
        .collect();

    Ok(Some(ParsedRun { run_id, samples }))
}

/// Numeric FIT field value as f64.
fn fit_number(value: &fitparser::Value) -> Option<f64> {
    use fitparser::Value;
    match value {
        Value::Byte(v) | Value::Enum(v) | Value::UInt8(v) | Value::UInt8z(v) => Some(f64::from(*v)),
        Value::SInt8(v) => Some(f64::from(*v)),
        Value::UInt16(v) | Value::UInt16z(v) => Some(f64::from(*v)),
        Value::SInt16(v) => Some(f64::from(*v)),
        Value::UInt32(v) | Value::UInt32z(v) => Some(f64::from(*v)),
        Value::SInt32(v) => Some(f64::from(*v)),
        Value::Float32(v) => Some(f64::from(*v)),
        Value::Float64(v) => Some(*v),
        _ => None,
    }
}

/// FIT sport names come through as strings; raw value 1 is running.
fn fit_sport_is_running(value: &fitparser::Value) -> bool {
    match value {
        fitparser::Value::String(name) => is_running_type(Some(name.as_str())),
        other => fit_number(other) == Some(1.0),
    }
}

fn parse_fit_file(path: &Path) -> Result<Option<ParsedRun>, ActivityError> {
    let bytes = std::fs::read(path).map_err(|source| ActivityError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let records = fitparser::from_bytes(&bytes).map_err(|source| ActivityError::Fit {
        path: path.display().to_string(),
        source,
    })?;

    let sport = records
        .iter()
        .filter(|r| matches!(r.kind(), MesgNum::Session | MesgNum::Sport))
        .flat_map(|r| r.fields())
        .find(|f| f.name() == "sport")
        .map(|f| fit_sport_is_running(f.value()));
    if sport == Some(false) {
        return Ok(None);
    }

    let run_id = file_stem_id(path);
    let mut samples = Vec::new();
    for record in records.iter().filter(|r| matches!(r.kind(), MesgNum::Record)) {
        let mut timestamp = None;
        let mut cadence = None;
        for field in record.fields() {
            match (field.name(), field.value()) {
                ("timestamp", fitparser::Value::Timestamp(t)) => timestamp = Some(t.with_timezone(&Utc)),
                ("cadence", v) => cadence = fit_number(v),
                _ => {}
            }
        }
        // Per-foot cadence, doubled to steps per minute; zero means no reading
        if let (Some(ts), Some(c)) = (timestamp, cadence.filter(|c| *c > 0.0)) {
            samples.push(CadenceSample::new(c * 2.0, ts, run_id.clone()));
        }
    }

    Ok(Some(ParsedRun { run_id, samples }))
}

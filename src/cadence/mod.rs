//! Cadence aggregation: turn per-run cadence observations into a zone model.
//!
//! Zones come from percentiles of every qualifying observation:
//! easy `[min, p25)`, moderate `[p25, p50)`, tempo `[p50, p75)`,
//! fast `[p75, p90)`, very fast `[p90, max]`.
//! With fewer than `min_runs` distinct runs the configured fallback table is used.

pub mod activity;
pub mod zones;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use zones::{Zone, ZoneModel, ZoneModelError};

/// Labels for percentile-derived zones, slowest first.
pub const ZONE_LABELS: [&str; 5] = ["easy", "moderate", "tempo", "fast", "very fast"];

/// Percentiles bounding the zones in `ZONE_LABELS` (between min and max).
const ZONE_PERCENTILES: [f64; 4] = [0.25, 0.50, 0.75, 0.90];

/// Label of the single zone emitted when every observation is identical.
pub const DEGENERATE_LABEL: &str = "steady";

/// One cadence observation from a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CadenceSample {
    pub steps_per_minute: f64,
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
}

impl CadenceSample {
    pub fn new(steps_per_minute: f64, timestamp: DateTime<Utc>, run_id: impl Into<String>) -> Self {
        Self {
            steps_per_minute,
            timestamp,
            run_id: run_id.into(),
        }
    }

    /// Positive, finite cadence attached to a run.
    pub fn is_valid(&self) -> bool {
        self.steps_per_minute.is_finite() && self.steps_per_minute > 0.0 && !self.run_id.is_empty()
    }
}

/// Fallback table from conventional running cadence ranges.
pub fn default_fallback_zones() -> Vec<Zone> {
    vec![
        Zone::new("easy", 150.0, 165.0),
        Zone::new("moderate", 165.0, 175.0),
        Zone::new("tempo", 175.0, 185.0),
        Zone::new("fast", 185.0, 200.0),
    ]
}

/// How zones are derived: the run threshold and the table used below it.
#[derive(Debug, Clone)]
pub struct ZonePolicy {
    min_runs: usize,
    fallback: ZoneModel,
}

impl ZonePolicy {
    /// Validate the fallback table up front so derivation itself cannot fail.
    pub fn new(min_runs: usize, fallback_zones: Vec<Zone>) -> Result<Self, ZoneModelError> {
        let fallback = ZoneModel::new(fallback_zones, 0, 0, true)?;
        Ok(Self {
            min_runs: min_runs.max(1),
            fallback,
        })
    }

    pub fn min_runs(&self) -> usize {
        self.min_runs
    }

    pub fn fallback_zones(&self) -> &[Zone] {
        self.fallback.zones()
    }

    fn fallback_model(&self, run_count: usize, observation_count: usize) -> ZoneModel {
        self.fallback.with_counts(run_count, observation_count)
    }
}

impl Default for ZonePolicy {
    fn default() -> Self {
        Self {
            min_runs: crate::MIN_RUNS,
            fallback: ZoneModel::from_validated_parts(default_fallback_zones(), 0, 0, true, false),
        }
    }
}

/// Linear-interpolation percentile of pre-sorted values.
///
/// `rank = p × (n − 1)`, interpolated between the floor and ceil order statistics.
/// `p` is clamped to `[0, 1]`. Returns `None` for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Derive a zone model from cadence samples.
///
/// Invalid samples (non-positive, non-finite, or missing a run id) are ignored.
/// Fewer than `policy.min_runs()` distinct runs yields the fallback table with
/// `is_fallback` set. Zero-width zones from tied percentiles are dropped so the
/// remaining zones stay contiguous; identical observations across the board yield
/// a single degenerate zone.
pub fn derive_zones(samples: &[CadenceSample], policy: &ZonePolicy) -> ZoneModel {
    let mut values = Vec::with_capacity(samples.len());
    let mut runs: BTreeSet<&str> = BTreeSet::new();
    let mut invalid = 0usize;

    for sample in samples {
        if sample.is_valid() {
            values.push(sample.steps_per_minute);
            runs.insert(sample.run_id.as_str());
        } else {
            invalid += 1;
        }
    }

    if invalid > 0 {
        log::debug!("Ignored {invalid} invalid cadence samples");
    }

    let run_count = runs.len();
    let observation_count = values.len();

    if run_count < policy.min_runs() {
        log::info!(
            "Only {run_count} qualifying runs (need {}), using fallback zones",
            policy.min_runs()
        );
        return policy.fallback_model(run_count, observation_count);
    }

    values.sort_by(f64::total_cmp);
    let min = values[0];
    let max = values[values.len() - 1];

    if min == max {
        log::warn!("All {observation_count} cadence samples are {min} spm, emitting a single zone");
        // min is a valid sample here, so only a logic error can reach the Err arm
        return match ZoneModel::degenerate(DEGENERATE_LABEL, min, run_count, observation_count) {
            Ok(model) => model,
            Err(e) => {
                log::error!("Cannot build single-zone model at {min} spm: {e}, using fallback zones");
                policy.fallback_model(run_count, observation_count)
            }
        };
    }

    let mut bounds = Vec::with_capacity(ZONE_PERCENTILES.len() + 2);
    bounds.push(min);
    for p in ZONE_PERCENTILES {
        // values is non-empty here
        bounds.push(percentile(&values, p).unwrap_or(min));
    }
    bounds.push(max);

    let mut zones = Vec::with_capacity(ZONE_LABELS.len());
    for (i, label) in ZONE_LABELS.iter().enumerate() {
        let (lower, upper) = (bounds[i], bounds[i + 1]);
        if upper > lower {
            zones.push(Zone::new(*label, lower, upper));
        } else {
            log::debug!("Dropping zero-width zone '{label}' at {lower} spm");
        }
    }

    log::debug!(
        "Derived {} zones from {observation_count} samples across {run_count} runs",
        zones.len()
    );

    ZoneModel::from_validated_parts(zones, run_count, observation_count, false, false)
}

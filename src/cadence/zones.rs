use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Invariant violations in a zone model.
///
/// These are caller contract violations: a model that fails validation would
/// produce silently wrong groupings, so it is rejected at construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ZoneModelError {
    #[error("zone model has no zones")]
    Empty,
    #[error("zone '{label}' has non-finite or non-positive bounds")]
    BadBounds { label: String },
    #[error("zone '{label}' is empty or inverted ({lower} >= {upper})")]
    Inverted { label: String, lower: f64, upper: f64 },
    #[error("zones '{previous}' and '{next}' are not contiguous ({upper} != {lower})")]
    NotContiguous {
        previous: String,
        next: String,
        upper: f64,
        lower: f64,
    },
    #[error("duplicate zone label '{0}'")]
    DuplicateLabel(String),
    #[error("degenerate zone model must be a single zone with equal bounds")]
    Degenerate,
}

/// A labelled cadence range in steps per minute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub label: String,
    #[serde(alias = "lower_spm")]
    pub lower_bound_spm: f64,
    #[serde(alias = "upper_spm")]
    pub upper_bound_spm: f64,
}

impl Zone {
    pub fn new(label: impl Into<String>, lower_bound_spm: f64, upper_bound_spm: f64) -> Self {
        Self {
            label: label.into(),
            lower_bound_spm,
            upper_bound_spm,
        }
    }

    /// Half-open membership test; `inclusive_upper` admits the upper bound itself
    /// (used for the topmost zone).
    pub fn admits(&self, spm: f64, inclusive_upper: bool) -> bool {
        spm >= self.lower_bound_spm
            && (spm < self.upper_bound_spm || (inclusive_upper && spm == self.upper_bound_spm))
    }
}

/// An immutable snapshot of a runner's cadence zones.
///
/// Zones are ordered by ascending bound, contiguous (`zones[i].upper ==
/// zones[i + 1].lower`) and non-empty (`lower < upper`). The one exception is a
/// degenerate model, built when every observation had the same cadence: a single
/// zone whose bounds are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawZoneModel")]
pub struct ZoneModel {
    zones: Vec<Zone>,
    sample_count: usize,
    observation_count: usize,
    is_fallback: bool,
    is_degenerate: bool,
}

#[derive(Deserialize)]
struct RawZoneModel {
    zones: Vec<Zone>,
    sample_count: usize,
    #[serde(default)]
    observation_count: usize,
    is_fallback: bool,
    #[serde(default)]
    is_degenerate: bool,
}

impl TryFrom<RawZoneModel> for ZoneModel {
    type Error = ZoneModelError;

    fn try_from(raw: RawZoneModel) -> Result<Self, Self::Error> {
        let model = Self {
            zones: raw.zones,
            sample_count: raw.sample_count,
            observation_count: raw.observation_count,
            is_fallback: raw.is_fallback,
            is_degenerate: raw.is_degenerate,
        };
        model.validate()?;
        Ok(model)
    }
}

impl ZoneModel {
    /// Build a model, rejecting unordered, overlapping, gapped or empty zones.
    pub fn new(
        zones: Vec<Zone>,
        sample_count: usize,
        observation_count: usize,
        is_fallback: bool,
    ) -> Result<Self, ZoneModelError> {
        let model = Self {
            zones,
            sample_count,
            observation_count,
            is_fallback,
            is_degenerate: false,
        };
        model.validate()?;
        Ok(model)
    }

    /// A single zone spanning exactly `spm`.
    pub fn degenerate(
        label: impl Into<String>,
        spm: f64,
        sample_count: usize,
        observation_count: usize,
    ) -> Result<Self, ZoneModelError> {
        let model = Self {
            zones: vec![Zone::new(label, spm, spm)],
            sample_count,
            observation_count,
            is_fallback: false,
            is_degenerate: true,
        };
        model.validate()?;
        Ok(model)
    }

    /// Rebuild a stored model, re-checking every invariant.
    pub fn restore(
        zones: Vec<Zone>,
        sample_count: usize,
        observation_count: usize,
        is_fallback: bool,
        is_degenerate: bool,
    ) -> Result<Self, ZoneModelError> {
        RawZoneModel {
            zones,
            sample_count,
            observation_count,
            is_fallback,
            is_degenerate,
        }
        .try_into()
    }

    /// Construct from parts already known to satisfy the invariants.
    pub(crate) fn from_validated_parts(
        zones: Vec<Zone>,
        sample_count: usize,
        observation_count: usize,
        is_fallback: bool,
        is_degenerate: bool,
    ) -> Self {
        let model = Self {
            zones,
            sample_count,
            observation_count,
            is_fallback,
            is_degenerate,
        };
        if let Err(e) = model.validate() {
            // Rejected again when saved
            log::error!("Zone model built from invalid parts: {e}");
        }
        model
    }

    /// Copy of this model with different counts (fallback tables are reused
    /// across analyses, only the counts change).
    pub(crate) fn with_counts(&self, sample_count: usize, observation_count: usize) -> Self {
        Self {
            sample_count,
            observation_count,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), ZoneModelError> {
        if self.zones.is_empty() {
            return Err(ZoneModelError::Empty);
        }

        let mut labels = HashSet::new();
        for zone in &self.zones {
            let finite = zone.lower_bound_spm.is_finite() && zone.upper_bound_spm.is_finite();
            if !finite || zone.lower_bound_spm <= 0.0 {
                return Err(ZoneModelError::BadBounds {
                    label: zone.label.clone(),
                });
            }
            if !labels.insert(zone.label.as_str()) {
                return Err(ZoneModelError::DuplicateLabel(zone.label.clone()));
            }
        }

        if self.is_degenerate {
            let zone = &self.zones[0];
            if self.zones.len() != 1 || zone.lower_bound_spm != zone.upper_bound_spm {
                return Err(ZoneModelError::Degenerate);
            }
            return Ok(());
        }

        for zone in &self.zones {
            if zone.lower_bound_spm >= zone.upper_bound_spm {
                return Err(ZoneModelError::Inverted {
                    label: zone.label.clone(),
                    lower: zone.lower_bound_spm,
                    upper: zone.upper_bound_spm,
                });
            }
        }

        for pair in self.zones.windows(2) {
            if pair[0].upper_bound_spm != pair[1].lower_bound_spm {
                return Err(ZoneModelError::NotContiguous {
                    previous: pair[0].label.clone(),
                    next: pair[1].label.clone(),
                    upper: pair[0].upper_bound_spm,
                    lower: pair[1].lower_bound_spm,
                });
            }
        }

        Ok(())
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Number of distinct qualifying runs the model was derived from.
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Number of qualifying cadence observations across those runs.
    pub fn observation_count(&self) -> usize {
        self.observation_count
    }

    pub fn is_fallback(&self) -> bool {
        self.is_fallback
    }

    pub fn is_degenerate(&self) -> bool {
        self.is_degenerate
    }
}

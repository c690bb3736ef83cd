//! Zone matching with harmonic (double/half-time) equivalence.
//!
//! A song at 85 BPM can feel right at 170 spm: one step per half-beat. Each tempo
//! is tried at ×1, ×2 and ×0.5 against every zone.

use std::collections::HashMap;

use crate::cadence::zones::ZoneModel;
use crate::db::models::TrackRef;

/// Multiplier applied to a track's tempo before zone comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HarmonicFactor {
    Direct,
    Double,
    Half,
}

impl HarmonicFactor {
    /// Match order: direct first, then double-time, then half-time.
    pub const ALL: [HarmonicFactor; 3] = [Self::Direct, Self::Double, Self::Half];

    pub fn multiplier(self) -> f64 {
        match self {
            Self::Direct => 1.0,
            Self::Double => 2.0,
            Self::Half => 0.5,
        }
    }
}

/// One zone a track's tempo falls into, under one harmonic factor.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneMatch {
    pub zone_label: String,
    pub harmonic_factor: HarmonicFactor,
    /// The tempo after applying the factor, i.e. the value that fell in the zone.
    pub matched_bpm: f64,
}

/// All zones `tempo` falls into under each harmonic factor.
///
/// Zones are half-open `[lower, upper)` except the topmost, whose upper bound is
/// inclusive so the fastest observed cadence is reachable. Output is ordered by
/// factor (×1, ×2, ×0.5) then by zone. A non-positive or non-finite tempo
/// matches nothing.
pub fn match_track(tempo: f64, model: &ZoneModel) -> Vec<ZoneMatch> {
    let mut matches = Vec::new();
    if !tempo.is_finite() || tempo <= 0.0 {
        return matches;
    }

    let zones = model.zones();
    let top = zones.len().saturating_sub(1);

    for factor in HarmonicFactor::ALL {
        let effective = tempo * factor.multiplier();
        for (i, zone) in zones.iter().enumerate() {
            if zone.admits(effective, i == top) {
                matches.push(ZoneMatch {
                    zone_label: zone.label.clone(),
                    harmonic_factor: factor,
                    matched_bpm: effective,
                });
            }
        }
    }

    matches
}

/// Match every track that has a usable tempo.
///
/// `tempo_of` returns the known tempo for a track, or `None` when it was never
/// looked up or the lookup found nothing. Tracks without a tempo or without any
/// zone fit get no entry (or an empty one) and end up unmatched downstream.
pub fn match_tracks<F>(tracks: &[TrackRef], model: &ZoneModel, mut tempo_of: F) -> HashMap<String, Vec<ZoneMatch>>
where
    F: FnMut(&TrackRef) -> Option<f64>,
{
    let mut by_track = HashMap::with_capacity(tracks.len());
    for track in tracks {
        if by_track.contains_key(&track.id) {
            continue;
        }
        if let Some(bpm) = tempo_of(track) {
            let matches = match_track(bpm, model);
            if !matches.is_empty() {
                by_track.insert(track.id.clone(), matches);
            }
        }
    }
    by_track
}

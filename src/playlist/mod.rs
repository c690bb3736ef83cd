pub mod export;
pub mod generate;

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::db::models::TrackRef;
use crate::matcher::ZoneMatch;

/// The tracks grouped into one zone, in library order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZonePlaylist {
    pub zone_label: String,
    pub track_ids: Vec<String>,
}

/// Zone → tracks, plus every track that fit nowhere.
///
/// Zones appear in the order they first received a track. Built fresh on each
/// generation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlaylistGrouping {
    pub zones: Vec<ZonePlaylist>,
    pub unmatched: Vec<String>,
}

impl PlaylistGrouping {
    pub fn zone(&self, label: &str) -> Option<&ZonePlaylist> {
        self.zones.iter().find(|z| z.zone_label == label)
    }

    /// Track ids grouped under `label` (empty if the zone got nothing).
    pub fn track_ids(&self, label: &str) -> &[String] {
        self.zone(label).map(|z| z.track_ids.as_slice()).unwrap_or(&[])
    }
}

/// Group tracks into zone playlists.
///
/// A track goes into every zone it matched, so one song can sit in several
/// playlists. Within a zone, order follows `tracks` and repeats collapse to the
/// first occurrence (two harmonic factors landing in the same zone add the track
/// once). Tracks with no matches go to `unmatched`. Every input track ends up in
/// at least one zone or in `unmatched`.
pub fn assemble(tracks: &[TrackRef], matches_by_track: &HashMap<String, Vec<ZoneMatch>>) -> PlaylistGrouping {
    let mut grouping = PlaylistGrouping::default();
    let mut zone_index: HashMap<&str, usize> = HashMap::new();
    let mut placed: HashSet<(usize, &str)> = HashSet::new();
    let mut unmatched_seen: HashSet<&str> = HashSet::new();

    for track in tracks {
        let matches = matches_by_track
            .get(&track.id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        if matches.is_empty() {
            if unmatched_seen.insert(track.id.as_str()) {
                grouping.unmatched.push(track.id.clone());
            }
            continue;
        }

        for m in matches {
            let idx = *zone_index.entry(m.zone_label.as_str()).or_insert_with(|| {
                grouping.zones.push(ZonePlaylist {
                    zone_label: m.zone_label.clone(),
                    track_ids: Vec::new(),
                });
                grouping.zones.len() - 1
            });
            if placed.insert((idx, track.id.as_str())) {
                grouping.zones[idx].track_ids.push(track.id.clone());
            }
        }
    }

    grouping
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::HarmonicFactor;

    fn track(id: &str) -> TrackRef {
        TrackRef {
            id: id.to_string(),
            title: format!("Song {id}"),
            artist: "Artist".to_string(),
            album_or_isrc: None,
        }
    }

    fn zm(label: &str, factor: HarmonicFactor, bpm: f64) -> ZoneMatch {
        ZoneMatch {
            zone_label: label.to_string(),
            harmonic_factor: factor,
            matched_bpm: bpm,
        }
    }

    #[test]
    fn test_multi_zone_membership() {
        let tracks = vec![track("a")];
        let mut matches = HashMap::new();
        matches.insert(
            "a".to_string(),
            vec![zm("tempo", HarmonicFactor::Direct, 85.0), zm("fast", HarmonicFactor::Double, 170.0)],
        );

        let g = assemble(&tracks, &matches);
        assert_eq!(g.track_ids("tempo"), ["a".to_string()]);
        assert_eq!(g.track_ids("fast"), ["a".to_string()]);
        assert!(g.unmatched.is_empty());
    }

    #[test]
    fn test_same_zone_two_factors_collapses() {
        let tracks = vec![track("a")];
        let mut matches = HashMap::new();
        matches.insert(
            "a".to_string(),
            vec![zm("wide", HarmonicFactor::Direct, 100.0), zm("wide", HarmonicFactor::Double, 200.0)],
        );

        let g = assemble(&tracks, &matches);
        assert_eq!(g.zones.len(), 1);
        assert_eq!(g.track_ids("wide"), ["a".to_string()]);
    }

    #[test]
    fn test_unmatched_and_insertion_order() {
        let tracks = vec![track("c"), track("a"), track("x"), track("b")];
        let mut matches = HashMap::new();
        matches.insert("a".to_string(), vec![zm("easy", HarmonicFactor::Direct, 155.0)]);
        matches.insert("b".to_string(), vec![zm("easy", HarmonicFactor::Half, 160.0)]);
        matches.insert("c".to_string(), vec![zm("easy", HarmonicFactor::Double, 158.0)]);
        // An empty match list counts as unmatched too
        matches.insert("x".to_string(), vec![]);

        let g = assemble(&tracks, &matches);
        assert_eq!(g.track_ids("easy"), ["c", "a", "b"].map(String::from));
        assert_eq!(g.unmatched, vec!["x".to_string()]);
    }

    #[test]
    fn test_duplicate_input_tracks() {
        let tracks = vec![track("a"), track("z"), track("a"), track("z")];
        let mut matches = HashMap::new();
        matches.insert("a".to_string(), vec![zm("easy", HarmonicFactor::Direct, 155.0)]);

        let g = assemble(&tracks, &matches);
        assert_eq!(g.track_ids("easy"), ["a".to_string()]);
        assert_eq!(g.unmatched, vec!["z".to_string()]);
    }

    #[test]
    fn test_completeness() {
        let tracks: Vec<TrackRef> = (0..50).map(|i| track(&format!("t{i}"))).collect();
        let mut matches = HashMap::new();
        for (i, t) in tracks.iter().enumerate() {
            let m = match i % 4 {
                0 => vec![],
                1 => vec![zm("easy", HarmonicFactor::Direct, 150.0)],
                2 => vec![zm("easy", HarmonicFactor::Direct, 150.0), zm("fast", HarmonicFactor::Double, 180.0)],
                _ => continue,
            };
            matches.insert(t.id.clone(), m);
        }

        let g = assemble(&tracks, &matches);
        let zone_total: usize = g.zones.iter().map(|z| z.track_ids.len()).sum();
        assert!(g.unmatched.len() + zone_total >= tracks.len());

        for t in &tracks {
            let in_zone = g.zones.iter().any(|z| z.track_ids.contains(&t.id));
            let unmatched = g.unmatched.contains(&t.id);
            assert!(in_zone ^ unmatched, "track {} accounted for exactly one way", t.id);
        }
    }

    #[test]
    fn test_deterministic() {
        let tracks: Vec<TrackRef> = (0..20).map(|i| track(&format!("t{i}"))).collect();
        let mut matches = HashMap::new();
        for (i, t) in tracks.iter().enumerate() {
            let label = ["easy", "tempo", "fast"][i % 3];
            matches.insert(t.id.clone(), vec![zm(label, HarmonicFactor::Direct, 160.0)]);
        }
        let a = serde_json::to_string(&assemble(&tracks, &matches)).unwrap();
        let b = serde_json::to_string(&assemble(&tracks, &matches)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_input() {
        let g = assemble(&[], &HashMap::new());
        assert!(g.zones.is_empty());
        assert!(g.unmatched.is_empty());
    }
}

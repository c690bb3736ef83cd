use anyhow::{Context, Result};
use std::collections::HashMap;

use super::{PlaylistGrouping, assemble};
use crate::cadence::zones::ZoneModel;
use crate::db::Database;
use crate::db::models::TrackRef;
use crate::matcher::match_tracks;
use crate::normalize::normalize;
use crate::tempo::TempoStore;

/// Where each library track ended up, by tempo status.
#[derive(Debug, Default, PartialEq)]
pub struct GenerationReport {
    pub tracks: usize,
    /// Placed in at least one zone
    pub matched: usize,
    /// No tempo record yet (scan hasn't reached it)
    pub never_looked_up: usize,
    /// Looked up, service had no tempo
    pub not_found: usize,
    /// Known tempo, but no zone fits at any harmonic factor
    pub outside_zones: usize,
}

/// A finished generation run.
#[derive(Debug)]
pub struct Generation {
    pub model: ZoneModel,
    pub grouping: PlaylistGrouping,
    pub report: GenerationReport,
}

/// Group `tracks` into `model`'s zones using cached tempos.
///
/// Only the store is consulted; tracks never looked up simply land in
/// `unmatched`. Storage errors propagate.
pub fn group_tracks<S>(
    model: &ZoneModel,
    tracks: &[TrackRef],
    store: &S,
) -> crate::db::Result<(PlaylistGrouping, GenerationReport)>
where
    S: TempoStore + ?Sized,
{
    // key → Some(Some(bpm)) known, Some(None) not found, None never looked up
    let mut tempos: HashMap<String, Option<Option<f64>>> = HashMap::new();
    for track in tracks {
        let key = normalize(&track.title, &track.artist);
        if !tempos.contains_key(&key) {
            let record = store.get(&key)?;
            tempos.insert(key, record.map(|r| r.bpm));
        }
    }

    let tempo_of = |t: &TrackRef| -> Option<Option<f64>> {
        tempos.get(&normalize(&t.title, &t.artist)).copied().flatten()
    };

    let matches = match_tracks(tracks, model, |t| tempo_of(t).flatten());
    let grouping = assemble(tracks, &matches);

    let mut report = GenerationReport::default();
    for track in tracks {
        report.tracks += 1;
        if matches.get(&track.id).is_some_and(|m| !m.is_empty()) {
            report.matched += 1;
            continue;
        }
        match tempo_of(track) {
            None => report.never_looked_up += 1,
            Some(None) => report.not_found += 1,
            Some(Some(_)) => report.outside_zones += 1,
        }
    }

    Ok((grouping, report))
}

/// Load the latest zone model and the stored library, then group.
pub fn generate_playlists(db: &Database) -> Result<Generation> {
    let snapshot = db
        .latest_zone_model()
        .context("Failed to load zone model")?;
    let Some(snapshot) = snapshot else {
        anyhow::bail!("No cadence zones found. Run `cadence-beats analyze-runs` first.");
    };

    let tracks = db.get_library().context("Failed to load library")?;
    if tracks.is_empty() {
        anyhow::bail!("Library is empty. Run `cadence-beats import-library` first.");
    }

    log::info!(
        "Grouping {} tracks into {} zones (model #{} from {})",
        tracks.len(),
        snapshot.model.zones().len(),
        snapshot.id,
        snapshot.created_at.format("%Y-%m-%d %H:%M")
    );

    let (grouping, report) =
        group_tracks(&snapshot.model, &tracks, db).context("Failed to read tempo cache")?;

    Ok(Generation {
        model: snapshot.model,
        grouping,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cadence::zones::Zone;
    use chrono::Utc;

    fn track(id: &str, title: &str) -> TrackRef {
        TrackRef {
            id: id.to_string(),
            title: title.to_string(),
            artist: "Artist".to_string(),
            album_or_isrc: None,
        }
    }

    fn model() -> ZoneModel {
        ZoneModel::new(
            vec![
                Zone::new("easy", 120.0, 140.0),
                Zone::new("moderate", 140.0, 150.0),
                Zone::new("tempo", 150.0, 160.0),
                Zone::new("fast", 160.0, 190.0),
            ],
            12,
            5000,
            false,
        )
        .unwrap()
    }

    #[test]
    fn test_group_tracks_end_to_end() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.put(&normalize("Double", "Artist"), Some(85.0), "test", now).unwrap();
        db.put(&normalize("Both", "Artist"), Some(75.0), "test", now).unwrap();
        db.put(&normalize("Lost", "Artist"), None, "test", now).unwrap();
        db.put(&normalize("Glacial", "Artist"), Some(30.0), "test", now).unwrap();

        let tracks = vec![
            track("d", "Double"),
            track("b", "Both (Radio Edit)"),
            track("l", "Lost"),
            track("g", "Glacial"),
            track("n", "Never"),
        ];

        let (g, report) = group_tracks(&model(), &tracks, &db).unwrap();
        // 85 → 170 at ×2
        assert_eq!(g.track_ids("fast"), ["d".to_string()]);
        // 75 → 150 at ×2 only (×1 and ×0.5 fall outside)
        assert_eq!(g.track_ids("tempo"), ["b".to_string()]);
        assert_eq!(g.unmatched, ["l", "g", "n"].map(String::from));

        assert_eq!(
            report,
            GenerationReport {
                tracks: 5,
                matched: 2,
                never_looked_up: 1,
                not_found: 1,
                outside_zones: 1,
            }
        );
    }

    #[test]
    fn test_track_in_several_zones() {
        let db = Database::open_in_memory().unwrap();
        db.put(&normalize("Wide", "Artist"), Some(130.0), "test", Utc::now()).unwrap();
        let m = ZoneModel::new(
            vec![Zone::new("slow", 60.0, 100.0), Zone::new("quick", 100.0, 300.0)],
            10,
            10,
            false,
        )
        .unwrap();

        let (g, _) = group_tracks(&m, &[track("w", "Wide")], &db).unwrap();
        // ×1 130 and ×2 260 both quick, ×0.5 65 slow
        assert_eq!(g.track_ids("quick"), ["w".to_string()]);
        assert_eq!(g.track_ids("slow"), ["w".to_string()]);
        assert_eq!(g.zones[0].zone_label, "quick");
    }

    #[test]
    fn test_generate_requires_zones_and_library() {
        let db = Database::open_in_memory().unwrap();
        let err = generate_playlists(&db).unwrap_err();
        assert!(err.to_string().contains("analyze-runs"));

        db.save_zone_model(&model()).unwrap();
        let err = generate_playlists(&db).unwrap_err();
        assert!(err.to_string().contains("import-library"));

        db.replace_library(&[track("x", "Unknown")]).unwrap();
        let generation = generate_playlists(&db).unwrap();
        assert_eq!(generation.grouping.unmatched, vec!["x".to_string()]);
        assert_eq!(generation.report.never_looked_up, 1);
    }
}

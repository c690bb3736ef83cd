use super::models::{LibraryStats, TrackRef, ZoneSnapshot};
use super::{Database, Result};
use crate::cadence::zones::{Zone, ZoneModel};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

impl Database {
    /// Replace the stored library with `tracks`, keeping their order.
    /// Repeated ids keep their first position. Returns the number stored.
    pub fn replace_library(&self, tracks: &[TrackRef]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM library_tracks", [])?;

        let mut stored = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO library_tracks (position, track_id, title, artist, album_or_isrc)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (position, t) in tracks.iter().enumerate() {
                stored += stmt.execute(params![
                    position as i64,
                    t.id,
                    t.title,
                    t.artist,
                    t.album_or_isrc
                ])?;
            }
        }

        tx.commit()?;
        Ok(stored)
    }

    /// The stored library in import order.
    pub fn get_library(&self) -> Result<Vec<TrackRef>> {
        let mut stmt = self.conn.prepare(
            "SELECT track_id, title, artist, album_or_isrc
             FROM library_tracks ORDER BY position",
        )?;

        let tracks = stmt
            .query_map([], |row| {
                Ok(TrackRef {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    artist: row.get(2)?,
                    album_or_isrc: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tracks)
    }

    /// Store a new zone model snapshot. Returns its id.
    /// A model that breaks the zone invariants is refused.
    pub fn save_zone_model(&self, model: &ZoneModel) -> Result<i64> {
        model.validate()?;
        let zones_json = serde_json::to_string(model.zones())?;
        self.conn.execute(
            "INSERT INTO zone_models (
                is_fallback, is_degenerate, sample_count, observation_count, zones_json, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                model.is_fallback(),
                model.is_degenerate(),
                model.sample_count() as i64,
                model.observation_count() as i64,
                zones_json,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// The most recently saved zone model, if any.
    pub fn latest_zone_model(&self) -> Result<Option<ZoneSnapshot>> {
        let row: Option<(i64, bool, bool, i64, i64, String, String)> = self
            .conn
            .query_row(
                "SELECT id, is_fallback, is_degenerate, sample_count, observation_count,
                        zones_json, created_at
                 FROM zone_models ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, is_fallback, is_degenerate, sample_count, observation_count, zones_json, created_at)) = row
        else {
            return Ok(None);
        };

        let zones: Vec<Zone> = serde_json::from_str(&zones_json)?;
        let model = ZoneModel::restore(
            zones,
            sample_count.max(0) as usize,
            observation_count.max(0) as usize,
            is_fallback,
            is_degenerate,
        )?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc);

        Ok(Some(ZoneSnapshot { id, created_at, model }))
    }

    /// Get library statistics.
    pub fn stats(&self) -> Result<LibraryStats> {
        let library_tracks: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM library_tracks",
            [],
            |row| row.get(0),
        )?;

        let tempos_known: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tempo_cache WHERE bpm IS NOT NULL",
            [],
            |row| row.get(0),
        )?;

        let tempos_not_found: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tempo_cache WHERE bpm IS NULL",
            [],
            |row| row.get(0),
        )?;

        let zone_snapshots: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM zone_models",
            [],
            |row| row.get(0),
        )?;

        let mut src_stmt = self.conn.prepare(
            "SELECT source, COUNT(*) FROM tempo_cache GROUP BY source ORDER BY COUNT(*) DESC, source",
        )?;
        let sources: Vec<(String, i64)> = src_stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(LibraryStats {
            library_tracks,
            tempos_known,
            tempos_not_found,
            zone_snapshots,
            sources,
        })
    }
}

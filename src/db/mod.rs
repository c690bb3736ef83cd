pub mod models;
pub mod queries;

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Stored zone model is invalid: {0}")]
    ZoneModel(#[from] crate::cadence::zones::ZoneModelError),
    #[error("Stored zone model could not be decoded: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Stored timestamp could not be parsed: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// The single SQLite connection backing the tempo cache, library and zone snapshots.
///
/// `rusqlite::Connection` is `Send` but not `Sync`, so a `Database` has exactly
/// one writer at a time.
pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.migrate()?;
        Ok(())
    }

    fn migrate(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if version < 1 {
            self.migrate_v1()?;
        }

        self.conn.pragma_update(None, "user_version", 1)?;
        Ok(())
    }

    /// V1: tempo cache, imported library, zone model snapshots
    fn migrate_v1(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            -- One row per normalized key. bpm NULL = looked up, not found.
            CREATE TABLE IF NOT EXISTS tempo_cache (
                normalized_key  TEXT PRIMARY KEY,
                bpm             REAL,
                source          TEXT NOT NULL,
                fetched_at      TEXT NOT NULL
            );

            -- The current library, replaced wholesale on each import.
            CREATE TABLE IF NOT EXISTS library_tracks (
                position        INTEGER NOT NULL,
                track_id        TEXT PRIMARY KEY,
                title           TEXT NOT NULL,
                artist          TEXT NOT NULL,
                album_or_isrc   TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_library_position ON library_tracks(position);

            -- Immutable zone model snapshots. Latest row is the current model.
            CREATE TABLE IF NOT EXISTS zone_models (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                is_fallback         INTEGER NOT NULL,
                is_degenerate       INTEGER NOT NULL,
                sample_count        INTEGER NOT NULL,
                observation_count   INTEGER NOT NULL,
                zones_json          TEXT NOT NULL,
                created_at          TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }
}

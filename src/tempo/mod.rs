//! Tempo cache: normalized track key → tempo record.
//!
//! The store distinguishes "never looked up" (no record) from "looked up, not
//! found" (a record with `bpm: None`) so misses aren't re-queried on every scan.

pub mod lookup;
pub mod scan;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use std::collections::BTreeSet;

use crate::db::models::TempoRecord;
use crate::db::{Database, Result};

/// Narrow interface to the tempo cache, injected wherever tempos are read or written.
pub trait TempoStore {
    /// The record for `key`, or `None` if it was never looked up.
    fn get(&self, key: &str) -> Result<Option<TempoRecord>>;

    /// Insert or overwrite the record for `key`. A non-finite or non-positive
    /// `bpm` is stored as not found.
    fn put(&self, key: &str, bpm: Option<f64>, source: &str, fetched_at: DateTime<Utc>) -> Result<()>;

    /// The subset of `keys` with no stored record.
    fn list_uncached(&self, keys: &BTreeSet<String>) -> Result<BTreeSet<String>>;
}

/// Keep only tempos that can be matched against zones.
pub fn sanitize_bpm(bpm: Option<f64>) -> Option<f64> {
    bpm.filter(|b| b.is_finite() && *b > 0.0)
}

impl TempoStore for Database {
    fn get(&self, key: &str) -> Result<Option<TempoRecord>> {
        let row: Option<(String, Option<f64>, String, String)> = self
            .conn
            .query_row(
                "SELECT normalized_key, bpm, source, fetched_at
                 FROM tempo_cache WHERE normalized_key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        match row {
            Some((normalized_key, bpm, source, fetched_at)) => {
                let fetched_at = DateTime::parse_from_rfc3339(&fetched_at)?.with_timezone(&Utc);
                Ok(Some(TempoRecord {
                    normalized_key,
                    bpm,
                    fetched_at,
                    source,
                }))
            }
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, bpm: Option<f64>, source: &str, fetched_at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO tempo_cache (normalized_key, bpm, source, fetched_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(normalized_key) DO UPDATE SET
                bpm = excluded.bpm,
                source = excluded.source,
                fetched_at = excluded.fetched_at",
            params![key, sanitize_bpm(bpm), source, fetched_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn list_uncached(&self, keys: &BTreeSet<String>) -> Result<BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT 1 FROM tempo_cache WHERE normalized_key = ?1")?;

        let mut uncached = BTreeSet::new();
        for key in keys {
            if !stmt.exists(params![key])? {
                uncached.insert(key.clone());
            }
        }
        Ok(uncached)
    }
}

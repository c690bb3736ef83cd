use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{BTreeMap, BTreeSet};
use std::thread;
use std::time::Duration;

use super::TempoStore;
use super::lookup::{LookupError, TempoLookup};
use crate::db::Result;
use crate::db::models::TrackRef;
use crate::normalize::NormalizedTrack;

/// Give up after this many transport/decode failures in a row (bad key, service down).
const MAX_CONSECUTIVE_FAILURES: usize = 5;

pub struct ScanOptions {
    /// Pause between lookups.
    pub rate_limit: Duration,
    /// Stop after this many lookups (None = all uncached keys).
    pub limit: Option<usize>,
}

#[derive(Debug, Default)]
pub struct ScanResult {
    /// Distinct normalized keys in the library
    pub unique_keys: usize,
    /// Keys that already had a record (found or not found)
    pub cached: usize,
    pub found: usize,
    pub not_found: usize,
    /// Lookups that errored; these keys stay uncached and are retried next scan
    pub failed: usize,
    /// Uncached keys not attempted this run (limit, quota, or too many failures)
    pub remaining: usize,
    pub quota_exhausted: bool,
    /// "artist - title" for keys newly recorded as not found
    pub missing: Vec<String>,
}

/// Look up tempos for every library track whose key isn't cached yet.
///
/// Keys are looked up in sorted order. A found tempo and a confirmed miss are
/// both recorded; transient errors leave the key uncached. Quota exhaustion
/// ends the scan early without error, so whatever was cached so far is still
/// usable for playlist generation.
pub fn scan_tempos<S, L>(
    store: &S,
    lookup: &L,
    tracks: &[TrackRef],
    options: &ScanOptions,
) -> Result<ScanResult>
where
    S: TempoStore + ?Sized,
    L: TempoLookup + ?Sized,
{
    let by_key: BTreeMap<String, NormalizedTrack> = tracks
        .iter()
        .map(|t| {
            let normalized = NormalizedTrack::new(&t.title, &t.artist);
            (normalized.key(), normalized)
        })
        .collect();
    let keys: BTreeSet<String> = by_key.keys().cloned().collect();

    let uncached = store.list_uncached(&keys)?;
    let mut result = ScanResult {
        unique_keys: keys.len(),
        cached: keys.len() - uncached.len(),
        ..ScanResult::default()
    };

    let to_fetch: Vec<&String> = match options.limit {
        Some(limit) => uncached.iter().take(limit).collect(),
        None => uncached.iter().collect(),
    };

    log::info!(
        "{} unique tracks, {} cached, {} to look up",
        result.unique_keys,
        result.cached,
        to_fetch.len()
    );

    if to_fetch.is_empty() {
        return Ok(result);
    }

    let pb = ProgressBar::new(to_fetch.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut attempted = 0usize;
    let mut consecutive_failures = 0usize;

    for (i, key) in to_fetch.iter().enumerate() {
        if i > 0 && !options.rate_limit.is_zero() {
            thread::sleep(options.rate_limit);
        }

        let Some(track) = by_key.get(*key) else {
            continue;
        };
        pb.set_message(track.query());
        attempted += 1;

        match lookup.lookup(track) {
            Ok(Some(bpm)) => {
                store.put(key, Some(bpm), lookup.source(), Utc::now())?;
                log::debug!("  {key} => {bpm} BPM");
                result.found += 1;
                consecutive_failures = 0;
            }
            Ok(None) => {
                // Cache the miss so we don't re-query it
                store.put(key, None, lookup.source(), Utc::now())?;
                result.not_found += 1;
                result.missing.push(format!("{} - {}", track.artist, track.title));
                consecutive_failures = 0;
            }
            Err(LookupError::QuotaExhausted) => {
                log::warn!("Tempo lookup quota exhausted, stopping scan");
                result.quota_exhausted = true;
                // This key wasn't answered
                attempted -= 1;
                break;
            }
            Err(e) => {
                log::warn!("Lookup failed for {key}: {e}");
                result.failed += 1;
                consecutive_failures += 1;
                if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    log::warn!("{consecutive_failures} lookups failed in a row, stopping scan");
                    break;
                }
            }
        }

        pb.inc(1);
    }

    pb.finish_with_message(format!(
        "Done: {} found, {} not found, {} failed",
        result.found, result.not_found, result.failed
    ));

    result.remaining = uncached.len() - attempted + result.failed;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::normalize::normalize;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Canned answers keyed by normalized title; records every query.
    struct FakeLookup {
        answers: HashMap<&'static str, std::result::Result<Option<f64>, &'static str>>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeLookup {
        fn new(answers: &[(&'static str, std::result::Result<Option<f64>, &'static str>)]) -> Self {
            Self {
                answers: answers.iter().cloned().collect(),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl TempoLookup for FakeLookup {
        fn source(&self) -> &str {
            "fake"
        }

        fn lookup(&self, track: &NormalizedTrack) -> std::result::Result<Option<f64>, LookupError> {
            self.calls.borrow_mut().push(track.title.clone());
            match self.answers.get(track.title.as_str()) {
                Some(Ok(bpm)) => Ok(*bpm),
                Some(Err("quota")) => Err(LookupError::QuotaExhausted),
                Some(Err(msg)) => Err(LookupError::Http(msg.to_string())),
                None => Ok(None),
            }
        }
    }

    fn track(id: &str, title: &str) -> TrackRef {
        TrackRef {
            id: id.into(),
            title: title.into(),
            artist: "Band".into(),
            album_or_isrc: None,
        }
    }

    fn options() -> ScanOptions {
        ScanOptions {
            rate_limit: Duration::ZERO,
            limit: None,
        }
    }

    #[test]
    fn test_scan_caches_found_and_missing() {
        let db = Database::open_in_memory().unwrap();
        let lookup = FakeLookup::new(&[("alpha", Ok(Some(170.0))), ("beta", Ok(None))]);
        let tracks = vec![track("1", "Alpha"), track("2", "Beta - Remastered"), track("3", "Beta")];

        let r = scan_tempos(&db, &lookup, &tracks, &options()).unwrap();
        assert_eq!(r.unique_keys, 2);
        assert_eq!(r.found, 1);
        assert_eq!(r.not_found, 1);
        assert_eq!(r.missing, vec!["band - beta".to_string()]);
        assert_eq!(r.remaining, 0);

        assert_eq!(db.get(&normalize("Alpha", "Band")).unwrap().unwrap().bpm, Some(170.0));
        let miss = db.get(&normalize("Beta", "Band")).unwrap().unwrap();
        assert_eq!(miss.bpm, None);
        assert_eq!(miss.source, "fake");
    }

    #[test]
    fn test_scan_skips_cached_keys() {
        let db = Database::open_in_memory().unwrap();
        db.put(&normalize("Alpha", "Band"), None, "fake", Utc::now()).unwrap();
        let lookup = FakeLookup::new(&[("gamma", Ok(Some(90.0)))]);
        let tracks = vec![track("1", "Alpha"), track("2", "Gamma")];

        let r = scan_tempos(&db, &lookup, &tracks, &options()).unwrap();
        assert_eq!(r.cached, 1);
        assert_eq!(*lookup.calls.borrow(), vec!["gamma".to_string()]);
    }

    #[test]
    fn test_scan_stops_on_quota() {
        let db = Database::open_in_memory().unwrap();
        let lookup = FakeLookup::new(&[
            ("a", Ok(Some(120.0))),
            ("b", Err("quota")),
            ("c", Ok(Some(130.0))),
        ]);
        let tracks = vec![track("1", "A"), track("2", "B"), track("3", "C")];

        let r = scan_tempos(&db, &lookup, &tracks, &options()).unwrap();
        assert!(r.quota_exhausted);
        assert_eq!(r.found, 1);
        assert_eq!(r.remaining, 2);
        assert!(db.get(&normalize("B", "Band")).unwrap().is_none());
        assert!(db.get(&normalize("C", "Band")).unwrap().is_none());
    }

    #[test]
    fn test_transient_failures_stay_uncached() {
        let db = Database::open_in_memory().unwrap();
        let lookup = FakeLookup::new(&[("a", Err("timeout")), ("b", Ok(Some(100.0)))]);
        let tracks = vec![track("1", "A"), track("2", "B")];

        let r = scan_tempos(&db, &lookup, &tracks, &options()).unwrap();
        assert_eq!(r.failed, 1);
        assert_eq!(r.found, 1);
        assert_eq!(r.remaining, 1);
        assert!(db.get(&normalize("A", "Band")).unwrap().is_none());
    }

    #[test]
    fn test_consecutive_failures_abort() {
        let db = Database::open_in_memory().unwrap();
        let titles = ["a", "b", "c", "d", "e", "f", "g"];
        let answers: Vec<(&'static str, std::result::Result<Option<f64>, &'static str>)> =
            titles.iter().map(|t| (*t, Err("down"))).collect();
        let lookup = FakeLookup::new(&answers);
        let tracks: Vec<TrackRef> = titles.iter().map(|t| track(t, t)).collect();

        let r = scan_tempos(&db, &lookup, &tracks, &options()).unwrap();
        assert_eq!(r.failed, MAX_CONSECUTIVE_FAILURES);
        assert_eq!(lookup.calls.borrow().len(), MAX_CONSECUTIVE_FAILURES);
        assert_eq!(r.remaining, titles.len());
    }

    #[test]
    fn test_limit() {
        let db = Database::open_in_memory().unwrap();
        let lookup = FakeLookup::new(&[]);
        let tracks = vec![track("1", "A"), track("2", "B"), track("3", "C")];
        let opts = ScanOptions {
            rate_limit: Duration::ZERO,
            limit: Some(2),
        };

        let r = scan_tempos(&db, &lookup, &tracks, &opts).unwrap();
        assert_eq!(r.not_found, 2);
        assert_eq!(r.remaining, 1);
        assert_eq!(*lookup.calls.borrow(), vec!["a".to_string(), "b".to_string()]);
    }
}

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::normalize::NormalizedTrack;

/// Source tag stored with tempos from GetSongBPM.
pub const GETSONGBPM_SOURCE: &str = "getsongbpm";

pub const GETSONGBPM_BASE_URL: &str = "https://api.getsongbpm.com";

#[derive(Error, Debug)]
pub enum LookupError {
    /// The service refuses further requests (daily quota or rate limit hit).
    #[error("Tempo lookup quota exhausted")]
    QuotaExhausted,
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("Unexpected response: {0}")]
    Decode(String),
}

/// An external tempo source.
pub trait TempoLookup {
    /// Tag stored alongside each record this lookup produces.
    fn source(&self) -> &str;

    /// `Ok(None)` means the service answered and has no tempo for this track.
    fn lookup(&self, track: &NormalizedTrack) -> Result<Option<f64>, LookupError>;
}

/// GetSongBPM search response. `search` is a list of hits, or an object like
/// `{"error": "no result"}` when nothing matched.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    search: Option<SearchField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchField {
    Hits(Vec<SearchHit>),
    #[allow(dead_code)]
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    tempo: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SongResponse {
    #[serde(default)]
    song: Option<SongDetail>,
}

#[derive(Debug, Deserialize)]
struct SongDetail {
    #[serde(default)]
    tempo: Option<serde_json::Value>,
}

/// What the first search hit tells us.
#[derive(Debug, PartialEq)]
enum SearchOutcome {
    Tempo(f64),
    /// Hit without a tempo; the song detail endpoint has it.
    Detail(String),
    NotFound,
}

/// Tempos arrive as strings ("120") or numbers; anything non-positive is no tempo.
fn parse_tempo(value: Option<&serde_json::Value>) -> Option<f64> {
    let bpm = match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    (bpm.is_finite() && bpm > 0.0).then_some(bpm)
}

fn search_outcome(response: &SearchResponse) -> SearchOutcome {
    let first = match &response.search {
        Some(SearchField::Hits(hits)) => hits.first(),
        _ => None,
    };
    match first {
        Some(hit) => match parse_tempo(hit.tempo.as_ref()) {
            Some(bpm) => SearchOutcome::Tempo(bpm),
            None => match &hit.id {
                Some(id) if !id.is_empty() => SearchOutcome::Detail(id.clone()),
                _ => SearchOutcome::NotFound,
            },
        },
        None => SearchOutcome::NotFound,
    }
}

fn map_http_error(e: ureq::Error) -> Result<(), LookupError> {
    match e {
        ureq::Error::StatusCode(429) => Err(LookupError::QuotaExhausted),
        // Unknown song ids come back as 404
        ureq::Error::StatusCode(404) => Ok(()),
        other => Err(LookupError::Http(other.to_string())),
    }
}

/// Client for the GetSongBPM API (https://getsongbpm.com/api).
pub struct GetSongBpm {
    api_key: String,
    base_url: String,
    agent: ureq::Agent,
}

impl GetSongBpm {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent,
        }
    }

    fn search(&self, query: &str) -> Result<Option<SearchResponse>, LookupError> {
        let url = format!("{}/search/", self.base_url);
        log::debug!("Searching GetSongBPM for {query:?}");

        let mut response = match self
            .agent
            .get(&url)
            .query("api_key", &self.api_key)
            .query("type", "both")
            .query("lookup", query)
            .call()
        {
            Ok(r) => r,
            Err(e) => return map_http_error(e).map(|_| None),
        };

        response
            .body_mut()
            .read_json::<SearchResponse>()
            .map(Some)
            .map_err(|e| LookupError::Decode(e.to_string()))
    }

    fn song_tempo(&self, id: &str) -> Result<Option<f64>, LookupError> {
        let url = format!("{}/song/", self.base_url);
        log::debug!("Fetching GetSongBPM song {id}");

        let mut response = match self
            .agent
            .get(&url)
            .query("api_key", &self.api_key)
            .query("id", id)
            .call()
        {
            Ok(r) => r,
            Err(e) => return map_http_error(e).map(|_| None),
        };

        let song: SongResponse = response
            .body_mut()
            .read_json()
            .map_err(|e| LookupError::Decode(e.to_string()))?;
        Ok(song.song.and_then(|s| parse_tempo(s.tempo.as_ref())))
    }
}

impl TempoLookup for GetSongBpm {
    fn source(&self) -> &str {
        GETSONGBPM_SOURCE
    }

    fn lookup(&self, track: &NormalizedTrack) -> Result<Option<f64>, LookupError> {
        let Some(response) = self.search(&track.query())? else {
            return Ok(None);
        };
        match search_outcome(&response) {
            SearchOutcome::Tempo(bpm) => Ok(Some(bpm)),
            SearchOutcome::Detail(id) => self.song_tempo(&id),
            SearchOutcome::NotFound => Ok(None),
        }
    }
}

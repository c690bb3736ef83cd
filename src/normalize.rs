//! Track/artist normalization for tempo-cache lookups.
//!
//! Streaming libraries decorate titles with featured artists, remaster years,
//! edit markers and bracketed edition info. Two listings of the same recording
//! should reduce to the same key so a tempo looked up once is reused.

use regex::Regex;
use std::sync::LazyLock;

/// Separator between the artist and title halves of a key.
pub const KEY_SEPARATOR: &str = " :: ";

// Innermost (...) or [...] group. Applied repeatedly so nested groups peel off.
static BRACKETED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\([^()]*\)|\[[^\[\]]*\]").unwrap()
});

// A separator (preceded by whitespace or at start) followed, anywhere later, by
// a marker token. Everything from the separator onward is dropped.
// e.g. "song - 2011 remaster", "song | radio edit", "song – live at wembley"
static MARKER_TAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        (?:^|\s)[-–—|]\s*
        .*?
        \b(?:feat|ft|featuring|remaster(?:ed)?|radio\s+edit|live|mono|stereo|explicit|clean|remix(?:ed)?)\b
        .*$",
    )
    .unwrap()
});

// Everything after the first credited artist.
static ARTIST_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*(?:[,;]|\s&\s|\s(?:feat\.?|ft\.?|featuring)\s).*$").unwrap()
});

/// The normalized halves of a track identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct NormalizedTrack {
    pub artist: String,
    pub title: String,
}

impl NormalizedTrack {
    pub fn new(title: &str, artist: &str) -> Self {
        Self {
            artist: normalize_artist(artist),
            title: normalize_title(title),
        }
    }

    /// Canonical cache key: `"{artist} :: {title}"`.
    pub fn key(&self) -> String {
        format!("{}{KEY_SEPARATOR}{}", self.artist, self.title)
    }

    /// Free-text query for search APIs.
    pub fn query(&self) -> String {
        if self.artist.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.artist, self.title)
        }
    }
}

/// Reduce a title/artist pair to its cache key. Total and deterministic.
pub fn normalize(title: &str, artist: &str) -> String {
    NormalizedTrack::new(title, artist).key()
}

/// Normalize a track title.
///
/// Lower-cases, strips bracketed segments and marker tails ("- Radio Edit",
/// "| Live", "- 2011 Remaster"), collapses whitespace. If nothing survives the
/// stripping, the lower-cased original is used instead so the key is never empty.
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let stripped = strip_brackets(&lowered);
    let stripped = MARKER_TAIL_RE.replace(&stripped, "");
    let cleaned = collapse_whitespace(&stripped);

    if cleaned.is_empty() {
        collapse_whitespace(&lowered)
    } else {
        cleaned
    }
}

/// Normalize an artist credit down to the first credited artist.
pub fn normalize_artist(artist: &str) -> String {
    let lowered = artist.to_lowercase();
    let stripped = strip_brackets(&lowered);
    let first = ARTIST_SPLIT_RE.replace(&stripped, "");
    let cleaned = collapse_whitespace(&first);

    if cleaned.is_empty() {
        collapse_whitespace(&lowered)
    } else {
        cleaned
    }
}

fn strip_brackets(s: &str) -> String {
    let mut current = s.to_string();
    loop {
        let next = BRACKETED_RE.replace_all(&current, " ").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feat_and_radio_edit_stripped() {
        assert_eq!(
            normalize("Song Name (feat. Artist B) - Radio Edit", "Artist A"),
            normalize("Song Name", "Artist A"),
        );
        assert_eq!(normalize("Song Name", "Artist A"), "artist a :: song name");
    }

    #[test]
    fn test_bracketed_segments() {
        assert_eq!(normalize_title("Hey Jude [Remastered 2015]"), "hey jude");
        assert_eq!(normalize_title("Intro (Live) [Deluxe Edition]"), "intro");
        // Nested groups peel off completely
        assert_eq!(normalize_title("Track (Mix (Extended))"), "track");
    }

    #[test]
    fn test_marker_tails() {
        assert_eq!(normalize_title("Heroes - 2017 Remaster"), "heroes");
        assert_eq!(normalize_title("Heroes – Remastered"), "heroes");
        assert_eq!(normalize_title("Yellow | Live at Glastonbury"), "yellow");
        assert_eq!(normalize_title("Wonderwall - Mono"), "wonderwall");
        assert_eq!(normalize_title("Bad Guy - Explicit"), "bad guy");
        assert_eq!(normalize_title("Song - Jay-Z Remix"), "song");
    }

    #[test]
    fn test_hyphenated_words_survive() {
        assert_eq!(normalize_title("X-Ray Vision"), "x-ray vision");
        assert_eq!(normalize_title("X-Ray - Live"), "x-ray");
        // Separator without a marker is part of the title
        assert_eq!(normalize_title("Part 1 - The Beginning"), "part 1 - the beginning");
    }

    #[test]
    fn test_marker_words_without_separator_kept() {
        assert_eq!(normalize_title("Live Forever"), "live forever");
        assert_eq!(normalize_title("Clean"), "clean");
    }

    #[test]
    fn test_whitespace_collapsed() {
        assert_eq!(normalize_title("  Mr.   Brightside  "), "mr. brightside");
    }

    #[test]
    fn test_empty_after_strip_falls_back() {
        assert_eq!(normalize_title("(Intro)"), "(intro)");
        assert_eq!(normalize_title("[Untitled]  "), "[untitled]");
        assert!(!normalize("(Interlude)", "Someone").ends_with(KEY_SEPARATOR));
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "Song Name (feat. Artist B) - Radio Edit",
            "(Intro)",
            "Heroes - 2017 Remaster",
            "  Spaced   Out  ",
            "Part 1 - The Beginning",
        ];
        for input in inputs {
            let once = normalize_title(input);
            assert_eq!(normalize_title(&once), once, "title not idempotent for {input:?}");
        }

        for artist in ["Daft Punk, Pharrell Williams", "Calvin Harris feat. Rihanna", "(Unknown)"] {
            let once = normalize_artist(artist);
            assert_eq!(normalize_artist(&once), once, "artist not idempotent for {artist:?}");
        }
    }

    #[test]
    fn test_first_artist_only() {
        assert_eq!(normalize_artist("Daft Punk, Pharrell Williams"), "daft punk");
        assert_eq!(normalize_artist("Calvin Harris feat. Rihanna"), "calvin harris");
        assert_eq!(normalize_artist("Drake; Future"), "drake");
        assert_eq!(normalize_artist("Artist A & Artist B"), "artist a");
        assert_eq!(normalize("Song", "Artist A & Artist B"), normalize("Song", "Artist A"));
        // No spaces around the ampersand, one name
        assert_eq!(normalize_artist("AC&DC"), "ac&dc");
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(
            normalize("SONG NAME - RADIO EDIT", "ARTIST A"),
            normalize("song name", "artist a"),
        );
    }

    #[test]
    fn test_query() {
        let t = NormalizedTrack::new("Mr. Brightside - Remastered", "The Killers");
        assert_eq!(t.query(), "the killers mr. brightside");
        assert_eq!(t.key(), "the killers :: mr. brightside");
    }
}

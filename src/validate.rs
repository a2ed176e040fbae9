//! Structural sniff for fetched content.
//!
//! This only checks shape (length, marker substring). Playlist syntax is not parsed.

use thiserror::Error;

use crate::models::FetchTarget;

/// Reason content was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("empty response body")]
    Empty,
    #[error("response too short: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },
    #[error("expected marker {0:?} not found")]
    MissingMarker(String),
}

/// Predicate deciding whether fetched bytes are an acceptable result.
#[derive(Debug, Clone)]
pub struct ContentValidator {
    min_bytes: usize,
    marker: Option<String>,
}

impl ContentValidator {
    pub fn new(target: &FetchTarget) -> Self {
        Self {
            min_bytes: target.min_bytes,
            marker: target
                .expected_marker
                .clone()
                .filter(|m| !m.is_empty()),
        }
    }

    /// Check content, returning the first rule it violates.
    pub fn check(&self, bytes: &[u8]) -> Result<(), Rejection> {
        if bytes.is_empty() {
            return Err(Rejection::Empty);
        }
        if bytes.len() < self.min_bytes {
            return Err(Rejection::TooShort {
                len: bytes.len(),
                min: self.min_bytes,
            });
        }
        if let Some(ref marker) = self.marker {
            if !contains(bytes, marker.as_bytes()) {
                return Err(Rejection::MissingMarker(marker.clone()));
            }
        }
        Ok(())
    }

    pub fn accepts(&self, bytes: &[u8]) -> bool {
        self.check(bytes).is_ok()
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.len() <= haystack.len() && haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(marker: Option<&str>, min_bytes: usize) -> ContentValidator {
        let mut target = FetchTarget::new("https://example.com/list.m3u").with_min_bytes(min_bytes);
        if let Some(m) = marker {
            target = target.with_marker(m);
        }
        ContentValidator::new(&target)
    }

    #[test]
    fn test_rejects_empty() {
        assert!(!validator(None, 0).accepts(b""));
        assert_eq!(validator(None, 0).check(b""), Err(Rejection::Empty));
    }

    #[test]
    fn test_rejects_short() {
        let v = validator(None, 16);
        assert_eq!(
            v.check(b"#EXTM3U"),
            Err(Rejection::TooShort { len: 7, min: 16 })
        );
    }

    #[test]
    fn test_rejects_missing_marker() {
        let v = validator(Some("#EXTM3U"), 0);
        assert!(!v.accepts(b"<html>Just a moment...</html>"));
    }

    #[test]
    fn test_accepts_when_thresholds_met() {
        let v = validator(Some("#EXTM3U"), 10);
        assert!(v.accepts(b"#EXTM3U\n#EXTINF:-1,Channel\nhttp://a/b.m3u8\n"));
    }

    #[test]
    fn test_marker_anywhere_in_body() {
        let v = validator(Some("#EXTINF"), 0);
        assert!(v.accepts(b"#EXTM3U\n#EXTINF:-1,News\n"));
    }

    #[test]
    fn test_min_bytes_boundary_is_inclusive() {
        let v = validator(None, 4);
        assert!(v.accepts(b"abcd"));
        assert!(!v.accepts(b"abc"));
    }

    #[test]
    fn test_empty_marker_is_ignored() {
        let v = validator(Some(""), 0);
        assert!(v.accepts(b"anything"));
    }
}

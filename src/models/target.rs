//! The resource a fetch run is trying to retrieve.

use serde::{Deserialize, Serialize};

/// Remote resource plus the thresholds fetched content must meet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchTarget {
    pub url: String,
    /// Substring the content must contain (e.g. `#EXTM3U`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_marker: Option<String>,
    /// Minimum acceptable content length in bytes.
    #[serde(default)]
    pub min_bytes: usize,
}

impl FetchTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            expected_marker: None,
            min_bytes: 0,
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.expected_marker = Some(marker.into());
        self
    }

    pub fn with_min_bytes(mut self, min_bytes: usize) -> Self {
        self.min_bytes = min_bytes;
        self
    }
}

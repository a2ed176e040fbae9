//! Browser transport configuration.

use serde::{Deserialize, Serialize};

/// Headless rendering settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run in headless mode (default: true).
    /// Set to false for debugging or if headless detection is an issue.
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Quiet period after document ready, for challenge scripts to resolve.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Wait for this CSS selector before extracting text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for_selector: Option<String>,

    /// Explicit Chrome/Chromium executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<String>,

    /// Additional Chrome arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chrome_args: Vec<String>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to an existing browser instead of launching one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
}

fn default_headless() -> bool {
    true
}

fn default_settle_ms() -> u64 {
    1500
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            settle_ms: default_settle_ms(),
            wait_for_selector: None,
            chrome_path: None,
            chrome_args: Vec::new(),
            remote_url: None,
        }
    }
}

impl BrowserConfig {
    /// Apply environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        // BROWSER_URL - remote DevTools endpoint
        if let Ok(url) = std::env::var("BROWSER_URL") {
            if !url.is_empty() {
                self.remote_url = Some(url);
            }
        }
        // CHROME_PATH - explicit executable
        if let Ok(path) = std::env::var("CHROME_PATH") {
            if !path.is_empty() {
                self.chrome_path = Some(path);
            }
        }
        self
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

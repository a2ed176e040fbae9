//! Transports perform exactly one retrieval attempt through a given egress path.
//!
//! Two implementations share the [`Transport`] contract:
//! - [`HttpTransport`]: plain GET via reqwest
//! - [`BrowserTransport`]: headless Chrome rendering for JS-challenge pages
//!
//! Every call builds its own client or browser session; nothing is reused
//! across attempts.

mod browser;
mod http;

pub use browser::{BrowserConfig, BrowserTransport};
pub use http::{
    resolve_user_agent, HttpTransport, HttpTransportBuilder, IMPERSONATE_USER_AGENTS,
    PLAYER_USER_AGENTS, USER_AGENT,
};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{AttemptResult, ConnectionDescriptor, FetchTarget};

/// Errors constructing a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid header {name:?}: {message}")]
    InvalidHeader { name: String, message: String },
    #[error("unknown transport {0:?} (expected http or browser)")]
    UnknownKind(String),
}

/// One-shot retrieval capability.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Perform a single fetch of `target` through `descriptor`.
    ///
    /// Must return within roughly `timeout`, yielding `Failure{Timeout}` and
    /// releasing any sockets or sessions when the budget is exceeded.
    async fn fetch(
        &self,
        target: &FetchTarget,
        descriptor: &ConnectionDescriptor,
        timeout: Duration,
    ) -> AttemptResult;
}

/// Transport selection from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportKind {
    #[default]
    Http,
    Browser,
}

impl TransportKind {
    pub fn from_name(name: &str) -> Result<Self, TransportError> {
        match name.trim().to_lowercase().as_str() {
            "http" | "plain" => Ok(TransportKind::Http),
            "browser" | "rendered" | "chrome" => Ok(TransportKind::Browser),
            other => Err(TransportError::UnknownKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Http => write!(f, "http"),
            TransportKind::Browser => write!(f, "browser"),
        }
    }
}

/// Render an error together with its source chain.
pub(crate) fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_from_name() {
        assert_eq!(TransportKind::from_name("HTTP").unwrap(), TransportKind::Http);
        assert_eq!(
            TransportKind::from_name("browser").unwrap(),
            TransportKind::Browser
        );
        assert!(TransportKind::from_name("carrier-pigeon").is_err());
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let inner = std::io::Error::other("connection refused");
        let outer = std::io::Error::new(std::io::ErrorKind::Other, inner);
        let text = error_chain(&outer);
        assert!(text.contains("connection refused"));
    }
}

//! Headless browser transport.
//!
//! Renders the target in Chrome so JavaScript challenges can resolve, then
//! returns the page's visible text. Every attempt gets its own browser
//! session routed through the attempt's descriptor.

mod config;
#[cfg(feature = "browser")]
mod session;

pub use config::BrowserConfig;

use std::time::Duration;
#[cfg(feature = "browser")]
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use super::{resolve_user_agent, Transport};
use crate::models::{AttemptResult, ConnectionDescriptor, FailureKind, FetchTarget};

/// Chrome-backed transport.
#[derive(Debug, Clone)]
#[cfg_attr(not(feature = "browser"), allow(dead_code))]
pub struct BrowserTransport {
    config: BrowserConfig,
    user_agent: String,
}

impl BrowserTransport {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            user_agent: resolve_user_agent(None),
        }
    }

    /// Override the user agent config value (see [`resolve_user_agent`]).
    pub fn with_user_agent(mut self, ua: Option<&str>) -> Self {
        self.user_agent = resolve_user_agent(ua);
        self
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl Transport for BrowserTransport {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn fetch(
        &self,
        target: &FetchTarget,
        descriptor: &ConnectionDescriptor,
        timeout: Duration,
    ) -> AttemptResult {
        let start = Instant::now();

        let opened =
            tokio::time::timeout(timeout, session::RenderSession::open(&self.config, descriptor))
                .await;
        let session = match opened {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                return AttemptResult::failure(FailureKind::Network, format!("{:#}", e));
            }
            Err(_) => {
                return AttemptResult::failure(
                    FailureKind::Timeout,
                    format!("browser not ready within {:.1}s", timeout.as_secs_f64()),
                );
            }
        };

        let remaining = timeout.saturating_sub(start.elapsed());
        let rendered = tokio::time::timeout(
            remaining,
            session.render(&target.url, &self.user_agent, &self.config),
        )
        .await;

        // Always tear down, even when rendering failed or ran out of time
        session.close().await;
        debug!("Browser session via {} closed", descriptor);

        match rendered {
            Ok(Ok(text)) => AttemptResult::success(text.into_bytes(), start.elapsed()),
            Ok(Err((kind, message))) => AttemptResult::failure(kind, message),
            Err(_) => AttemptResult::failure(
                FailureKind::Timeout,
                format!("page did not settle within {:.1}s", timeout.as_secs_f64()),
            ),
        }
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl Transport for BrowserTransport {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn fetch(
        &self,
        _target: &FetchTarget,
        descriptor: &ConnectionDescriptor,
        _timeout: Duration,
    ) -> AttemptResult {
        debug!("Browser transport requested via {} without browser support", descriptor);
        AttemptResult::failure(
            FailureKind::Network,
            "browser support not compiled in (rebuild with --features browser)",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_transport_user_agent() {
        let transport = BrowserTransport::new(BrowserConfig::default());
        assert!(transport.user_agent.contains("Mozilla"));

        let transport = transport.with_user_agent(Some("vlc"));
        assert!(transport.user_agent.starts_with("VLC/"));
        assert_eq!(transport.name(), "browser");
    }

    #[test]
    fn test_browser_config_defaults() {
        let config = BrowserConfig::default();
        assert!(config.headless);
        assert_eq!(config.settle_ms, 1500);
        assert!(config.is_default());

        let parsed: BrowserConfig = toml::from_str("settle_ms = 500").unwrap();
        assert_eq!(parsed.settle_ms, 500);
        assert!(parsed.headless);
        assert!(!parsed.is_default());
    }
}

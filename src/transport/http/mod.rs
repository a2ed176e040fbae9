//! Plain HTTP transport.
//!
//! Each attempt builds a fresh reqwest client bound to the attempt's
//! descriptor, so a dead proxy's connections or TLS sessions never carry
//! over to the next candidate. Direct attempts ignore `HTTP(S)_PROXY`.

mod user_agent;

pub use user_agent::{
    resolve_user_agent, IMPERSONATE_USER_AGENTS, PLAYER_USER_AGENTS, USER_AGENT,
};

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, Proxy, StatusCode};
use tracing::debug;

use super::{error_chain, Transport, TransportError};
use crate::models::{AttemptResult, ConnectionDescriptor, FailureKind, FetchTarget};

/// Default `Accept-Language` sent with every request.
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// HTTP transport with a realistic browser fingerprint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    user_agent: String,
    headers: HeaderMap,
}

/// Builder for [`HttpTransport`].
pub struct HttpTransportBuilder {
    user_agent: Option<String>,
    accept_language: String,
    headers: BTreeMap<String, String>,
}

impl HttpTransportBuilder {
    /// Set the user agent config value (see [`resolve_user_agent`]).
    pub fn user_agent(mut self, ua: &str) -> Self {
        self.user_agent = Some(ua.to_string());
        self
    }

    pub fn accept_language(mut self, value: &str) -> Self {
        self.accept_language = value.to_string();
        self
    }

    /// Add an extra request header such as `Referer`.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn headers(mut self, headers: &BTreeMap<String, String>) -> Self {
        for (name, value) in headers {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn build(self) -> Result<HttpTransport, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&self.accept_language).map_err(|e| {
                TransportError::InvalidHeader {
                    name: "Accept-Language".to_string(),
                    message: e.to_string(),
                }
            })?,
        );

        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                TransportError::InvalidHeader {
                    name: name.clone(),
                    message: e.to_string(),
                }
            })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| TransportError::InvalidHeader {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            headers.insert(header_name, header_value);
        }

        Ok(HttpTransport {
            user_agent: resolve_user_agent(self.user_agent.as_deref()),
            headers,
        })
    }
}

impl HttpTransport {
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder {
            user_agent: None,
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            headers: BTreeMap::new(),
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Build a single-use client routed through `descriptor`.
    fn client_for(
        &self,
        descriptor: &ConnectionDescriptor,
        timeout: Duration,
    ) -> Result<Client, reqwest::Error> {
        let mut builder = Client::builder()
            .user_agent(&self.user_agent)
            .default_headers(self.headers.clone())
            .timeout(timeout)
            .connect_timeout(timeout)
            .pool_max_idle_per_host(0)
            .gzip(true)
            .brotli(true);

        builder = match descriptor.proxy_url() {
            None => builder.no_proxy(),
            Some(proxy_url) => {
                let mut proxy = Proxy::all(&proxy_url)?;
                if let Some(creds) = descriptor.credentials() {
                    proxy = proxy.basic_auth(&creds.username, &creds.password);
                }
                builder.proxy(proxy)
            }
        };

        builder.build()
    }

    async fn fetch_inner(
        &self,
        client: &Client,
        target: &FetchTarget,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Vec<u8>, (FailureKind, String)> {
        let response = client
            .get(&target.url)
            .send()
            .await
            .map_err(|e| classify_error(&e, descriptor))?;

        let status = response.status();
        debug!("GET {} via {} -> {}", target.url, descriptor, status);

        if status == StatusCode::PROXY_AUTHENTICATION_REQUIRED && descriptor.is_proxy() {
            return Err((
                FailureKind::ProxyUnavailable,
                format!("proxy rejected credentials ({})", status),
            ));
        }
        if !status.is_success() {
            return Err((
                FailureKind::HttpStatus(status.as_u16()),
                format!("server returned {}", status),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| classify_error(&e, descriptor))?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(
        &self,
        target: &FetchTarget,
        descriptor: &ConnectionDescriptor,
        timeout: Duration,
    ) -> AttemptResult {
        let start = Instant::now();

        let client = match self.client_for(descriptor, timeout) {
            Ok(c) => c,
            Err(e) => {
                let kind = if descriptor.is_proxy() {
                    FailureKind::ProxyUnavailable
                } else {
                    FailureKind::Network
                };
                return AttemptResult::failure(kind, format!("client setup: {}", error_chain(&e)));
            }
        };

        // The client dies with this future, closing its sockets on timeout
        match tokio::time::timeout(timeout, self.fetch_inner(&client, target, descriptor)).await {
            Ok(Ok(bytes)) => AttemptResult::success(bytes, start.elapsed()),
            Ok(Err((kind, message))) => AttemptResult::failure(kind, message),
            Err(_) => AttemptResult::failure(
                FailureKind::Timeout,
                format!("no response within {:.1}s", timeout.as_secs_f64()),
            ),
        }
    }
}

/// Map a reqwest error onto the failure taxonomy.
///
/// Connection failures while routed through a proxy are attributed to the proxy.
fn classify_error(err: &reqwest::Error, descriptor: &ConnectionDescriptor) -> (FailureKind, String) {
    let message = error_chain(err);
    let kind = if err.is_timeout() {
        FailureKind::Timeout
    } else if descriptor.is_proxy() && err.is_connect() {
        FailureKind::ProxyUnavailable
    } else {
        FailureKind::Network
    };
    (kind, message)
}

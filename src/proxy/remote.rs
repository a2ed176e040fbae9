//! Remote proxy list retrieval: plaintext lists and proxy-broker services.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::entry::{parse_entry, ProxyProtocol};
use super::ProxySourceError;
use crate::models::ConnectionDescriptor;

/// Timeout for proxy list and broker requests.
pub const LIST_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Port as returned by brokers; some send numbers, some strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum BrokerPort {
    Number(u16),
    Text(String),
}

impl BrokerPort {
    fn value(&self) -> Option<u16> {
        match self {
            BrokerPort::Number(p) => Some(*p),
            BrokerPort::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// One record from a proxy-broker response.
#[derive(Debug, Clone, Deserialize)]
struct BrokerRecord {
    #[serde(alias = "host", alias = "address")]
    ip: String,
    port: BrokerPort,
    #[serde(default, alias = "type")]
    protocol: Option<String>,
}

impl BrokerRecord {
    fn into_descriptor(self) -> Option<ConnectionDescriptor> {
        let port = self.port.value().filter(|p| *p != 0)?;
        let protocol = match self.protocol.as_deref() {
            Some(p) => ProxyProtocol::from_name(p)?,
            None => ProxyProtocol::Http,
        };
        Some(protocol.descriptor(self.ip, port))
    }
}

/// Broker responses come either as a bare array or wrapped in an object.
/// Records stay raw so one malformed entry cannot sink the whole response.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BrokerResponse {
    List(Vec<serde_json::Value>),
    Wrapped {
        #[serde(alias = "proxies", alias = "results")]
        data: Vec<serde_json::Value>,
    },
}

impl BrokerResponse {
    fn into_records(self) -> Vec<serde_json::Value> {
        match self {
            BrokerResponse::List(records) => records,
            BrokerResponse::Wrapped { data } => data,
        }
    }
}

/// Fetches proxy candidates over a direct connection.
#[derive(Clone)]
pub struct ProxyListFetcher {
    client: Client,
}

impl ProxyListFetcher {
    pub fn new() -> Result<Self, ProxySourceError> {
        let client = Client::builder()
            .timeout(LIST_FETCH_TIMEOUT)
            .no_proxy()
            .gzip(true)
            .build()
            .map_err(|e| ProxySourceError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// Fetch a plaintext list (one `host:port[:protocol]` per line).
    pub async fn fetch_list(&self, url: &str) -> Result<Vec<ConnectionDescriptor>, ProxySourceError> {
        debug!("Fetching proxy list from {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProxySourceError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProxySourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let text = response.text().await.map_err(|e| ProxySourceError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        Ok(parse_list(&text))
    }

    /// Query a proxy-broker service returning `{ip, port, protocol}` records.
    pub async fn fetch_broker(
        &self,
        url: &str,
        api_key: Option<&str>,
    ) -> Result<Vec<ConnectionDescriptor>, ProxySourceError> {
        debug!("Querying proxy broker at {}", url);
        let mut request = self.client.get(url).header("Accept", "application/json");
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| ProxySourceError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProxySourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| ProxySourceError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        parse_broker_response(&body)
    }
}

/// Parse a plaintext list, skipping anything that is not a proxy entry.
pub fn parse_list(text: &str) -> Vec<ConnectionDescriptor> {
    text.lines()
        .filter_map(|line| {
            let parsed = parse_entry(line);
            if parsed.is_none() && !line.trim().is_empty() && !line.trim_start().starts_with('#') {
                debug!("Skipping unparseable proxy entry: {}", line.trim());
            }
            parsed
        })
        .collect()
}

/// Parse a broker JSON body into descriptors.
pub fn parse_broker_response(body: &str) -> Result<Vec<ConnectionDescriptor>, ProxySourceError> {
    let response: BrokerResponse =
        serde_json::from_str(body).map_err(|e| ProxySourceError::Parse(e.to_string()))?;

    Ok(response
        .into_records()
        .into_iter()
        .filter_map(|raw| {
            let shown = raw.to_string();
            let descriptor = serde_json::from_value::<BrokerRecord>(raw)
                .ok()
                .and_then(BrokerRecord::into_descriptor);
            if descriptor.is_none() {
                debug!("Skipping unusable broker record: {}", shown);
            }
            descriptor
        })
        .collect())
}

//! Configuration file handling.
//!
//! Files are discovered with `prefer` (`plfetch.toml`, `plfetch.yaml`,
//! `plfetch.json`, ... in the usual config locations) and parsed with serde
//! according to their extension. Environment variables override file values;
//! CLI flags override both.

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::FetchTarget;
use crate::pipeline::FetchJob;
use crate::proxy::{parse_entry, PoolSource, ProxyStrategy};
use crate::report::DEFAULT_SUMMARY_LEN;
use crate::retry::{
    Backoff, RetryPolicy, DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_BACKOFF, DEFAULT_BACKOFF_CAP,
    DEFAULT_MAX_ATTEMPTS,
};
use crate::transport::{BrowserConfig, TransportError, TransportKind};

/// Default output file.
pub const DEFAULT_OUTPUT: &str = "playlist.m3u";

/// Upper bound on the per-attempt timeout.
const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("failed to serialize config: {0}")]
    Serialize(String),
    #[error("no target URL configured (set `url`, PLFETCH_URL or --url)")]
    MissingUrl,
    #[error("invalid target URL {url:?}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
    #[error("unknown proxy strategy {0:?} (expected none, fixed or pool)")]
    UnknownStrategy(String),
    #[error("unknown backoff strategy {0:?} (expected constant, linear or exponential)")]
    UnknownBackoff(String),
    #[error("fixed proxy strategy needs `proxy`, PLFETCH_PROXY or HTTPS_PROXY")]
    MissingProxy,
    #[error("invalid proxy {0:?}")]
    InvalidProxy(String),
    #[error("pool strategy needs `proxy_list`, `proxy_list_url` or `proxy_broker_url`")]
    MissingPool,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// On-disk configuration. Every field except `url` is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Playlist URL to fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Output file path (tilde-expanded, relative to the config file).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Substring fetched content must contain, e.g. `#EXTM3U`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_marker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_bytes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Per-attempt time budget in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Backoff strategy: constant, linear or exponential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_max_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub jitter: bool,
    /// none, fixed or pool. Inferred from the proxy settings when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_strategy: Option<String>,
    /// Fixed proxy entry (`host:port`, `host:port:proto` or URL form).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub proxy_list: Vec<String>,
    /// Plaintext proxy list, one entry per line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_list_url: Option<String>,
    /// Proxy broker endpoint returning JSON records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_broker_url: Option<String>,
    #[serde(default, skip_serializing)]
    pub proxy_broker_api_key: Option<String>,
    /// http or browser.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    /// User agent: unset for the default, "impersonate", "vlc", or a literal string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Attempts shown in failure summaries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_len: Option<usize>,
    /// Extra request headers, e.g. `Referer`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BrowserConfig::is_default")]
    pub browser: BrowserConfig,

    /// Path the config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
    /// Proxy taken from `HTTPS_PROXY`/`HTTP_PROXY`, used by the fixed strategy.
    #[serde(skip)]
    pub env_proxy: Option<String>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    ///
    /// No config file is not an error; a broken one is.
    pub async fn load() -> Result<Self, ConfigError> {
        // Use prefer for file discovery, then parse with serde
        let discovered = match prefer::load("plfetch").await {
            Ok(pref_config) => pref_config.source_path().map(|p| p.to_path_buf()),
            Err(e) => {
                debug!("No plfetch config file discovered: {}", e);
                None
            }
        };

        match discovered {
            Some(path) => Self::load_from_path(&path).await,
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let mut config = Self::parse(&contents, path)?;
        config.source_path = Some(path.to_path_buf());
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_err = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        match ext {
            "toml" => toml::from_str(contents).map_err(|e| parse_err(e.to_string())),
            "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| parse_err(e.to_string())),
            _ => serde_json::from_str(contents).map_err(|e| parse_err(e.to_string())),
        }
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        let mut config = self.with_env_lookup(|key| std::env::var(key).ok());
        config.browser = config.browser.with_env_overrides();
        config
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("PLFETCH_URL") {
            self.url = Some(url);
        }
        if let Some(output) = get("PLFETCH_OUTPUT") {
            self.output = Some(output);
        }
        if let Some(proxy) = get("PLFETCH_PROXY") {
            self.proxy = Some(proxy);
        }
        if let Some(strategy) = get("PLFETCH_PROXY_STRATEGY") {
            self.proxy_strategy = Some(strategy);
        }
        if let Some(key) = get("PLFETCH_BROKER_API_KEY") {
            self.proxy_broker_api_key = Some(key);
        }
        self.env_proxy = ["HTTPS_PROXY", "https_proxy", "HTTP_PROXY", "http_proxy"]
            .into_iter()
            .find_map(|key| get(key));
        self
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved against the config file's directory, if any
    pub fn resolve_path(&self, path_str: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        match self.base_dir() {
            Some(base) if !path.is_absolute() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Serialize as TOML (secrets omitted).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Effective proxy strategy.
    pub fn proxy_strategy(&self) -> Result<ProxyStrategy, ConfigError> {
        let name = match self.proxy_strategy.as_deref() {
            Some(name) => name.trim().to_lowercase(),
            None if self.proxy.is_some() => "fixed".to_string(),
            None if self.has_pool() => "pool".to_string(),
            None => "none".to_string(),
        };

        match name.as_str() {
            "none" | "direct" => Ok(ProxyStrategy::None),
            "fixed" | "static" => {
                let raw = self
                    .proxy
                    .clone()
                    .or_else(|| self.env_proxy.clone())
                    .ok_or(ConfigError::MissingProxy)?;
                let descriptor = parse_entry(&raw).ok_or(ConfigError::InvalidProxy(raw))?;
                Ok(ProxyStrategy::Fixed(descriptor))
            }
            "pool" | "rotating" => Ok(ProxyStrategy::Pool(self.pool_source()?)),
            _ => Err(ConfigError::UnknownStrategy(name)),
        }
    }

    fn has_pool(&self) -> bool {
        !self.proxy_list.is_empty()
            || self.proxy_list_url.is_some()
            || self.proxy_broker_url.is_some()
    }

    fn pool_source(&self) -> Result<PoolSource, ConfigError> {
        if let Some(ref url) = self.proxy_broker_url {
            Ok(PoolSource::Broker {
                url: url.clone(),
                api_key: self.proxy_broker_api_key.clone(),
            })
        } else if let Some(ref url) = self.proxy_list_url {
            Ok(PoolSource::Remote { url: url.clone() })
        } else if !self.proxy_list.is_empty() {
            Ok(PoolSource::Static(self.proxy_list.clone()))
        } else {
            Err(ConfigError::MissingPool)
        }
    }

    /// Effective retry policy.
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        let max_attempts = NonZeroU32::new(self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS))
            .ok_or(ConfigError::InvalidValue {
                field: "max_attempts",
                message: "must be at least 1".to_string(),
            })?;

        let timeout = match self.timeout_secs {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    field: "timeout_secs",
                    message: "must be greater than 0".to_string(),
                })
            }
            Some(secs) if secs > MAX_TIMEOUT_SECS => {
                return Err(ConfigError::InvalidValue {
                    field: "timeout_secs",
                    message: format!("must be at most {}", MAX_TIMEOUT_SECS),
                })
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_ATTEMPT_TIMEOUT,
        };

        let base = self
            .backoff_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_BACKOFF);
        let cap = self
            .backoff_max_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_BACKOFF_CAP);
        let name = self.backoff.as_deref().unwrap_or("constant");
        let backoff = Backoff::from_name(name, base, cap)
            .ok_or_else(|| ConfigError::UnknownBackoff(name.to_string()))?;

        Ok(RetryPolicy::new(max_attempts, timeout, backoff).with_jitter(self.jitter))
    }

    /// Validate and turn the configuration into a runnable job.
    pub fn resolve(&self) -> Result<FetchJob, ConfigError> {
        let raw_url = self.url.as_deref().map(str::trim).unwrap_or_default();
        if raw_url.is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        let url = url::Url::parse(raw_url).map_err(|e| ConfigError::InvalidUrl {
            url: raw_url.to_string(),
            message: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: raw_url.to_string(),
                message: format!("unsupported scheme {}", url.scheme()),
            });
        }

        let mut target = FetchTarget::new(url.as_str()).with_min_bytes(self.min_bytes.unwrap_or(0));
        if let Some(ref marker) = self.expected_marker {
            target = target.with_marker(marker.clone());
        }

        let transport = match self.transport.as_deref() {
            Some(name) => TransportKind::from_name(name)?,
            None => TransportKind::default(),
        };

        let output = self.resolve_path(self.output.as_deref().unwrap_or(DEFAULT_OUTPUT));

        Ok(FetchJob {
            target,
            policy: self.retry_policy()?,
            strategy: self.proxy_strategy()?,
            transport,
            output,
            user_agent: self.user_agent.clone(),
            headers: self.headers.clone(),
            browser: self.browser.clone(),
            summary_len: self.summary_len.unwrap_or(DEFAULT_SUMMARY_LEN),
        })
    }
}

//! Proxy sources: the sequence of egress descriptors a fetch run draws from.
//!
//! # Strategies
//!
//! - **none**: a single direct connection
//! - **fixed**: a single configured proxy
//! - **pool**: a shuffled sample of a static list, a remote plaintext list,
//!   or a proxy-broker response, capped at the run's attempt bound
//!
//! A source is finite and consumed as it is drawn from; it is never restarted
//! within a run. A pool that cannot be obtained yields no descriptors.

mod entry;
mod remote;

pub use entry::{parse_entry, ProxyProtocol};
pub use remote::{parse_broker_response, parse_list, ProxyListFetcher};

use std::collections::HashSet;

use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::ConnectionDescriptor;

/// Errors obtaining a proxy pool.
#[derive(Debug, Error)]
pub enum ProxySourceError {
    #[error("failed to build proxy list client: {0}")]
    Client(String),
    #[error("proxy list request to {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("proxy list request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("invalid proxy broker response: {0}")]
    Parse(String),
}

/// Where a proxy pool comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolSource {
    /// Entries given directly in configuration.
    Static(Vec<String>),
    /// Plaintext list fetched over HTTP.
    Remote { url: String },
    /// Proxy-brokering service returning JSON records.
    Broker { url: String, api_key: Option<String> },
}

/// Configured proxy strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyStrategy {
    None,
    Fixed(ConnectionDescriptor),
    Pool(PoolSource),
}

impl ProxyStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ProxyStrategy::None => "none",
            ProxyStrategy::Fixed(_) => "fixed",
            ProxyStrategy::Pool(_) => "pool",
        }
    }
}

/// Finite, non-restartable sequence of connection descriptors.
#[derive(Debug)]
pub struct ProxySource {
    descriptors: std::vec::IntoIter<ConnectionDescriptor>,
}

impl ProxySource {
    /// Yields one direct descriptor.
    pub fn direct() -> Self {
        Self::from_descriptors(vec![ConnectionDescriptor::Direct])
    }

    /// Yields the given proxy once.
    pub fn fixed(descriptor: ConnectionDescriptor) -> Self {
        Self::from_descriptors(vec![descriptor])
    }

    /// Yields nothing.
    pub fn empty() -> Self {
        Self::from_descriptors(Vec::new())
    }

    /// Yields the descriptors in the given order.
    pub fn from_descriptors(descriptors: Vec<ConnectionDescriptor>) -> Self {
        Self {
            descriptors: descriptors.into_iter(),
        }
    }

    /// Yields a random permutation of up to `limit` distinct entries.
    pub fn pool(entries: Vec<ConnectionDescriptor>, limit: usize) -> Self {
        let mut seen = HashSet::new();
        let mut unique: Vec<ConnectionDescriptor> = entries
            .into_iter()
            .filter(|d| seen.insert(d.clone()))
            .collect();

        unique.shuffle(&mut rand::rng());
        unique.truncate(limit);
        Self::from_descriptors(unique)
    }

    /// Build the source for a strategy, fetching remote pools as needed.
    ///
    /// Pool retrieval failures are logged and produce an empty source.
    pub async fn resolve(strategy: &ProxyStrategy, limit: usize) -> Self {
        match strategy {
            ProxyStrategy::None => Self::direct(),
            ProxyStrategy::Fixed(descriptor) => Self::fixed(descriptor.clone()),
            ProxyStrategy::Pool(pool) => match load_pool(pool).await {
                Ok(entries) => {
                    info!("Proxy pool has {} candidate(s)", entries.len());
                    Self::pool(entries, limit)
                }
                Err(e) => {
                    warn!("Proxy pool unavailable: {}", e);
                    Self::empty()
                }
            },
        }
    }

    /// Number of descriptors not yet drawn.
    pub fn remaining(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

impl Iterator for ProxySource {
    type Item = ConnectionDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        self.descriptors.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.descriptors.size_hint()
    }
}

/// Load all candidate descriptors for a pool (unshuffled, possibly with duplicates).
pub async fn load_pool(pool: &PoolSource) -> Result<Vec<ConnectionDescriptor>, ProxySourceError> {
    match pool {
        PoolSource::Static(entries) => Ok(entries.iter().filter_map(|e| parse_entry(e)).collect()),
        PoolSource::Remote { url } => ProxyListFetcher::new()?.fetch_list(url).await,
        PoolSource::Broker { url, api_key } => {
            ProxyListFetcher::new()?
                .fetch_broker(url, api_key.as_deref())
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(n: usize) -> Vec<ConnectionDescriptor> {
        (0..n)
            .map(|i| ConnectionDescriptor::http(format!("10.0.0.{}", i), 8080))
            .collect()
    }

    #[test]
    fn test_direct_yields_once() {
        let mut source = ProxySource::direct();
        assert_eq!(source.next(), Some(ConnectionDescriptor::Direct));
        assert_eq!(source.next(), None);
        assert!(source.is_exhausted());
    }

    #[test]
    fn test_fixed_yields_once() {
        let proxy = ConnectionDescriptor::http("222.252.194.29", 8080);
        let drawn: Vec<_> = ProxySource::fixed(proxy.clone()).collect();
        assert_eq!(drawn, vec![proxy]);
    }

    #[test]
    fn test_pool_is_a_capped_permutation() {
        let entries = sample(20);
        let drawn: Vec<_> = ProxySource::pool(entries.clone(), 5).collect();
        assert_eq!(drawn.len(), 5);
        for d in &drawn {
            assert!(entries.contains(d));
        }
        let distinct: HashSet<_> = drawn.iter().collect();
        assert_eq!(distinct.len(), 5);
    }

    #[test]
    fn test_pool_smaller_than_limit() {
        let drawn: Vec<_> = ProxySource::pool(sample(3), 10).collect();
        assert_eq!(drawn.len(), 3);
    }

    #[test]
    fn test_pool_removes_duplicates() {
        let mut entries = sample(2);
        entries.push(entries[0].clone());
        let drawn: Vec<_> = ProxySource::pool(entries, 10).collect();
        assert_eq!(drawn.len(), 2);
    }

    #[test]
    fn test_empty_pool_yields_nothing() {
        let mut source = ProxySource::pool(Vec::new(), 5);
        assert_eq!(source.next(), None);
    }

    #[tokio::test]
    async fn test_resolve_static_pool() {
        let strategy = ProxyStrategy::Pool(PoolSource::Static(vec![
            "1.1.1.1:80".to_string(),
            "bogus".to_string(),
            "2.2.2.2:1080:socks5".to_string(),
        ]));
        let source = ProxySource::resolve(&strategy, 10).await;
        assert_eq!(source.remaining(), 2);
    }

    #[tokio::test]
    async fn test_resolve_unreachable_remote_is_empty() {
        let strategy = ProxyStrategy::Pool(PoolSource::Remote {
            url: "http://127.0.0.1:9/proxies.txt".to_string(),
        });
        let source = ProxySource::resolve(&strategy, 10).await;
        assert!(source.is_exhausted());
    }
}

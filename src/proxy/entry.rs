//! Parsing of raw proxy list entries into connection descriptors.
//!
//! Accepted forms:
//! - `host:port` (HTTP proxy)
//! - `host:port:protocol`
//! - `scheme://[user:pass@]host:port`

use url::Url;

use crate::models::{ConnectionDescriptor, ProxyCredentials};

/// Proxy protocols understood by the transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyProtocol {
    Http,
    Socks5,
}

impl ProxyProtocol {
    /// Map a protocol/scheme name. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "http" | "https" => Some(ProxyProtocol::Http),
            "socks5" | "socks5h" | "socks" => Some(ProxyProtocol::Socks5),
            _ => None,
        }
    }

    pub fn descriptor(self, host: String, port: u16) -> ConnectionDescriptor {
        match self {
            ProxyProtocol::Http => ConnectionDescriptor::HttpProxy {
                host,
                port,
                credentials: None,
            },
            ProxyProtocol::Socks5 => ConnectionDescriptor::Socks5Proxy { host, port },
        }
    }
}

/// Parse one proxy list entry. Blank lines, comments and malformed entries yield `None`.
pub fn parse_entry(raw: &str) -> Option<ConnectionDescriptor> {
    // Plain lists sometimes carry trailing columns (country, latency...)
    let entry = raw.split_whitespace().next()?;
    if entry.starts_with('#') {
        return None;
    }

    if entry.contains("://") {
        return parse_url_entry(entry);
    }

    let mut parts = entry.split(':');
    let host = parts.next().filter(|h| !h.is_empty())?;
    let port = parse_port(parts.next()?)?;
    let protocol = match parts.next() {
        Some(p) => ProxyProtocol::from_name(p)?,
        None => ProxyProtocol::Http,
    };
    if parts.next().is_some() {
        return None;
    }

    Some(protocol.descriptor(host.to_string(), port))
}

fn parse_url_entry(entry: &str) -> Option<ConnectionDescriptor> {
    let url = Url::parse(entry).ok()?;
    let protocol = ProxyProtocol::from_name(url.scheme())?;
    let host = url.host_str()?.to_string();
    let port = url.port_or_known_default()?;

    let descriptor = match protocol {
        ProxyProtocol::Http if !url.username().is_empty() => ConnectionDescriptor::HttpProxy {
            host,
            port,
            credentials: Some(ProxyCredentials {
                username: url.username().to_string(),
                password: url.password().unwrap_or_default().to_string(),
            }),
        },
        other => other.descriptor(host, port),
    };
    Some(descriptor)
}

fn parse_port(raw: &str) -> Option<u16> {
    raw.trim().parse::<u16>().ok().filter(|p| *p != 0)
}

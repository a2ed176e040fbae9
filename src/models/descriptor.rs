//! Network egress descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Username/password for an authenticating HTTP proxy.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// How a single fetch attempt reaches the network.
///
/// Values are created by a proxy source and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionDescriptor {
    Direct,
    HttpProxy {
        host: String,
        port: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credentials: Option<ProxyCredentials>,
    },
    Socks5Proxy {
        host: String,
        port: u16,
    },
}

impl ConnectionDescriptor {
    pub fn http(host: impl Into<String>, port: u16) -> Self {
        ConnectionDescriptor::HttpProxy {
            host: host.into(),
            port,
            credentials: None,
        }
    }

    pub fn socks5(host: impl Into<String>, port: u16) -> Self {
        ConnectionDescriptor::Socks5Proxy {
            host: host.into(),
            port,
        }
    }

    /// Check if this descriptor routes through a proxy.
    pub fn is_proxy(&self) -> bool {
        !matches!(self, ConnectionDescriptor::Direct)
    }

    /// Proxy URL without credentials, suitable for reqwest or `--proxy-server`.
    ///
    /// SOCKS proxies use `socks5h` so name resolution happens on the proxy side.
    pub fn proxy_url(&self) -> Option<String> {
        match self {
            ConnectionDescriptor::Direct => None,
            ConnectionDescriptor::HttpProxy { host, port, .. } => {
                Some(format!("http://{}:{}", host, port))
            }
            ConnectionDescriptor::Socks5Proxy { host, port } => {
                Some(format!("socks5h://{}:{}", host, port))
            }
        }
    }

    pub fn credentials(&self) -> Option<&ProxyCredentials> {
        match self {
            ConnectionDescriptor::HttpProxy { credentials, .. } => credentials.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionDescriptor::Direct => write!(f, "direct"),
            ConnectionDescriptor::HttpProxy {
                host,
                port,
                credentials,
            } => {
                if credentials.is_some() {
                    write!(f, "http://***@{}:{}", host, port)
                } else {
                    write!(f, "http://{}:{}", host, port)
                }
            }
            ConnectionDescriptor::Socks5Proxy { host, port } => {
                write!(f, "socks5://{}:{}", host, port)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_hides_credentials() {
        let d = ConnectionDescriptor::HttpProxy {
            host: "10.0.0.1".to_string(),
            port: 3128,
            credentials: Some(ProxyCredentials {
                username: "user".to_string(),
                password: "hunter2".to_string(),
            }),
        };
        let shown = d.to_string();
        assert_eq!(shown, "http://***@10.0.0.1:3128");
        assert!(!format!("{:?}", d).contains("hunter2"));
    }

    #[test]
    fn test_proxy_url() {
        assert_eq!(ConnectionDescriptor::Direct.proxy_url(), None);
        assert_eq!(
            ConnectionDescriptor::http("1.2.3.4", 8080).proxy_url().as_deref(),
            Some("http://1.2.3.4:8080")
        );
        assert_eq!(
            ConnectionDescriptor::socks5("5.6.7.8", 1080).proxy_url().as_deref(),
            Some("socks5h://5.6.7.8:1080")
        );
    }

    #[test]
    fn test_equality_by_fields() {
        assert_eq!(
            ConnectionDescriptor::http("a", 1),
            ConnectionDescriptor::http("a", 1)
        );
        assert_ne!(
            ConnectionDescriptor::http("a", 1),
            ConnectionDescriptor::socks5("a", 1)
        );
        assert!(!ConnectionDescriptor::Direct.is_proxy());
    }
}

//! Attempt results and terminal fetch outcomes.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ConnectionDescriptor;

/// Why an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// DNS, connect or reset errors.
    Network,
    /// Attempt exceeded its time budget.
    Timeout,
    /// Non-2xx response.
    HttpStatus(u16),
    /// Content did not pass the structural sniff.
    ValidationFailed,
    /// Proxy handshake or authentication failed.
    ProxyUnavailable,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Network => write!(f, "network"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::HttpStatus(code) => write!(f, "http {}", code),
            FailureKind::ValidationFailed => write!(f, "validation failed"),
            FailureKind::ProxyUnavailable => write!(f, "proxy unavailable"),
        }
    }
}

/// Raw result of one transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    Success { bytes: Vec<u8>, elapsed: Duration },
    Failure { kind: FailureKind, message: String },
}

impl AttemptResult {
    pub fn success(bytes: Vec<u8>, elapsed: Duration) -> Self {
        AttemptResult::Success { bytes, elapsed }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        AttemptResult::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            AttemptResult::Failure { kind, .. } => Some(*kind),
            AttemptResult::Success { .. } => None,
        }
    }
}

/// Logged status of an attempt. Never holds the fetched bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptStatus {
    Accepted { len: usize },
    Failed { kind: FailureKind, message: String },
}

/// One entry of the attempt log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    /// 1-based position in issue order.
    pub index: u32,
    pub descriptor: ConnectionDescriptor,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub status: AttemptStatus,
}

impl AttemptRecord {
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.status {
            AttemptStatus::Failed { kind, .. } => Some(*kind),
            AttemptStatus::Accepted { .. } => None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.status, AttemptStatus::Accepted { .. })
    }
}

impl fmt::Display for AttemptRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            AttemptStatus::Accepted { len } => write!(
                f,
                "#{} via {}: accepted {} bytes in {:.2}s",
                self.index,
                self.descriptor,
                len,
                self.elapsed.as_secs_f64()
            ),
            AttemptStatus::Failed { kind, message } => write!(
                f,
                "#{} via {}: {} ({}) after {:.2}s",
                self.index,
                self.descriptor,
                kind,
                message,
                self.elapsed.as_secs_f64()
            ),
        }
    }
}

/// Terminal result of an orchestration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Succeeded {
        bytes: Vec<u8>,
        attempts_used: u32,
        descriptor_used: ConnectionDescriptor,
        /// Full log, ending with the accepted attempt.
        attempts: Vec<AttemptRecord>,
    },
    Exhausted {
        attempts: Vec<AttemptRecord>,
    },
    Cancelled {
        attempts: Vec<AttemptRecord>,
    },
}

impl FetchOutcome {
    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            FetchOutcome::Succeeded { attempts, .. }
            | FetchOutcome::Exhausted { attempts }
            | FetchOutcome::Cancelled { attempts } => attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Succeeded { .. })
    }

    pub fn into_attempts(self) -> Vec<AttemptRecord> {
        match self {
            FetchOutcome::Succeeded { attempts, .. }
            | FetchOutcome::Exhausted { attempts }
            | FetchOutcome::Cancelled { attempts } => attempts,
        }
    }
}

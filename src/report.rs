//! Human-readable summaries of an attempt log.

use std::collections::HashMap;
use std::fmt;

use crate::models::{AttemptRecord, FailureKind, FetchOutcome};

/// Number of trailing attempts shown by default.
pub const DEFAULT_SUMMARY_LEN: usize = 5;

/// Likely cause of an exhausted run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnosis {
    /// No descriptor was ever drawn.
    NoCandidates,
    AllProxiesUnavailable,
    ContentConsistentlyInvalid,
    ConsistentlyTimingOut,
    /// Every attempt got the same HTTP status.
    ConsistentStatus(u16),
    /// Every attempt hit a DNS, connect or reset error.
    Unreachable,
    Mixed,
}

impl Diagnosis {
    /// Classify a log of failed attempts.
    pub fn classify(attempts: &[AttemptRecord]) -> Self {
        let kinds: Vec<FailureKind> = attempts.iter().filter_map(|a| a.failure_kind()).collect();
        let Some(first) = kinds.first().copied() else {
            return Diagnosis::NoCandidates;
        };

        if kinds.iter().all(|k| *k == first) {
            return match first {
                FailureKind::ProxyUnavailable => Diagnosis::AllProxiesUnavailable,
                FailureKind::ValidationFailed => Diagnosis::ContentConsistentlyInvalid,
                FailureKind::Timeout => Diagnosis::ConsistentlyTimingOut,
                FailureKind::HttpStatus(code) => Diagnosis::ConsistentStatus(code),
                FailureKind::Network => Diagnosis::Unreachable,
            };
        }
        Diagnosis::Mixed
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnosis::NoCandidates => write!(f, "no connection candidates were available"),
            Diagnosis::AllProxiesUnavailable => write!(f, "all proxies unavailable"),
            Diagnosis::ContentConsistentlyInvalid => write!(f, "content consistently invalid"),
            Diagnosis::ConsistentlyTimingOut => write!(f, "target consistently times out"),
            Diagnosis::ConsistentStatus(code) => {
                write!(f, "target consistently answers HTTP {}", code)
            }
            Diagnosis::Unreachable => write!(f, "target unreachable"),
            Diagnosis::Mixed => write!(f, "mixed failures"),
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub total_attempts: usize,
    pub diagnosis: Option<Diagnosis>,
    pub failure_counts: Vec<(FailureKind, usize)>,
    /// Last attempts in issue order.
    pub recent: Vec<AttemptRecord>,
}

impl FetchReport {
    pub fn from_outcome(outcome: &FetchOutcome, last_n: usize) -> Self {
        let attempts = outcome.attempts();
        let diagnosis = match outcome {
            FetchOutcome::Exhausted { attempts } => Some(Diagnosis::classify(attempts)),
            _ => None,
        };
        Self::build(attempts, diagnosis, last_n)
    }

    fn build(attempts: &[AttemptRecord], diagnosis: Option<Diagnosis>, last_n: usize) -> Self {
        let mut counts: HashMap<FailureKind, usize> = HashMap::new();
        for kind in attempts.iter().filter_map(|a| a.failure_kind()) {
            *counts.entry(kind).or_default() += 1;
        }
        let mut failure_counts: Vec<(FailureKind, usize)> = counts.into_iter().collect();
        failure_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.to_string().cmp(&b.0.to_string())));

        let skip = attempts.len().saturating_sub(last_n);
        Self {
            total_attempts: attempts.len(),
            diagnosis,
            failure_counts,
            recent: attempts[skip..].to_vec(),
        }
    }
}

impl fmt::Display for FetchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} attempt(s)", self.total_attempts)?;
        if let Some(diagnosis) = self.diagnosis {
            write!(f, ": {}", diagnosis)?;
        }
        if !self.failure_counts.is_empty() {
            let counts: Vec<String> = self
                .failure_counts
                .iter()
                .map(|(kind, n)| format!("{} x{}", kind, n))
                .collect();
            write!(f, " [{}]", counts.join(", "))?;
        }
        for record in &self.recent {
            write!(f, "\n  {}", record)?;
        }
        Ok(())
    }
}

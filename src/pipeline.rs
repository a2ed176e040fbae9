//! End-to-end fetch: resolve candidates, orchestrate attempts, persist.
//!
//! Content is persisted only after it has been accepted by the validator.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::models::{AttemptRecord, ConnectionDescriptor, FetchOutcome, FetchTarget};
use crate::orchestrator::FetchOrchestrator;
use crate::proxy::{ProxySource, ProxyStrategy};
use crate::report::{FetchReport, DEFAULT_SUMMARY_LEN};
use crate::retry::RetryPolicy;
use crate::sink::{self, PersistReport, SinkError};
use crate::transport::{
    BrowserConfig, BrowserTransport, HttpTransport, Transport, TransportError, TransportKind,
};

/// Exit code for a successful run.
pub const EXIT_OK: i32 = 0;
/// Exit code for IO and configuration errors.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code when every permitted attempt failed.
pub const EXIT_EXHAUSTED: i32 = 2;
/// Exit code for an externally cancelled run.
pub const EXIT_CANCELLED: i32 = 130;

/// Outcomes that end a run without output.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Every permitted attempt failed. Carries the full attempt log.
    #[error("all attempts failed: {report}")]
    Exhausted {
        attempts: Vec<AttemptRecord>,
        report: FetchReport,
    },
    #[error("cancelled after {report}")]
    Cancelled {
        attempts: Vec<AttemptRecord>,
        report: FetchReport,
    },
    #[error(transparent)]
    Io(#[from] SinkError),
    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),
}

impl PipelineError {
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Exhausted { .. } => EXIT_EXHAUSTED,
            PipelineError::Cancelled { .. } => EXIT_CANCELLED,
            PipelineError::Io(_) | PipelineError::Transport(_) => EXIT_FAILURE,
        }
    }

    /// Attempt summary, when the run got as far as attempting.
    pub fn report(&self) -> Option<&FetchReport> {
        match self {
            PipelineError::Exhausted { report, .. } | PipelineError::Cancelled { report, .. } => {
                Some(report)
            }
            _ => None,
        }
    }

    /// Every attempt made before the run ended, in issue order.
    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            PipelineError::Exhausted { attempts, .. } | PipelineError::Cancelled { attempts, .. } => {
                attempts
            }
            _ => &[],
        }
    }

    fn exhausted(attempts: Vec<AttemptRecord>, summary_len: usize) -> Self {
        let outcome = FetchOutcome::Exhausted { attempts };
        let report = FetchReport::from_outcome(&outcome, summary_len);
        PipelineError::Exhausted {
            attempts: outcome.into_attempts(),
            report,
        }
    }

    fn cancelled(attempts: Vec<AttemptRecord>, summary_len: usize) -> Self {
        let outcome = FetchOutcome::Cancelled { attempts };
        let report = FetchReport::from_outcome(&outcome, summary_len);
        PipelineError::Cancelled {
            attempts: outcome.into_attempts(),
            report,
        }
    }
}

/// Everything one invocation needs, fully resolved from configuration.
#[derive(Debug, Clone)]
pub struct FetchJob {
    pub target: FetchTarget,
    pub policy: RetryPolicy,
    pub strategy: ProxyStrategy,
    pub transport: TransportKind,
    pub output: PathBuf,
    pub user_agent: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub browser: BrowserConfig,
    /// Trailing attempts included in failure summaries.
    pub summary_len: usize,
}

impl FetchJob {
    pub fn new(target: FetchTarget, output: impl Into<PathBuf>) -> Self {
        Self {
            target,
            policy: RetryPolicy::default(),
            strategy: ProxyStrategy::None,
            transport: TransportKind::Http,
            output: output.into(),
            user_agent: None,
            headers: BTreeMap::new(),
            browser: BrowserConfig::default(),
            summary_len: DEFAULT_SUMMARY_LEN,
        }
    }

    /// Construct the transport this job selects.
    pub fn build_transport(&self) -> Result<Arc<dyn Transport>, TransportError> {
        match self.transport {
            TransportKind::Http => {
                let mut builder = HttpTransport::builder().headers(&self.headers);
                if let Some(ref ua) = self.user_agent {
                    builder = builder.user_agent(ua);
                }
                Ok(Arc::new(builder.build()?))
            }
            TransportKind::Browser => Ok(Arc::new(
                BrowserTransport::new(self.browser.clone())
                    .with_user_agent(self.user_agent.as_deref()),
            )),
        }
    }
}

/// A persisted fetch.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub persisted: PersistReport,
    pub attempts_used: u32,
    pub descriptor_used: ConnectionDescriptor,
    pub attempts: Vec<AttemptRecord>,
}

/// Run a job with the transport it selects.
pub async fn run(job: &FetchJob, cancel: &CancellationToken) -> Result<Delivery, PipelineError> {
    let transport = job.build_transport()?;
    run_with_transport(job, transport, cancel).await
}

/// Run a job with an explicit transport.
pub async fn run_with_transport(
    job: &FetchJob,
    transport: Arc<dyn Transport>,
    cancel: &CancellationToken,
) -> Result<Delivery, PipelineError> {
    info!(
        "Fetching {} (strategy {}, transport {}, up to {} attempt(s))",
        job.target.url,
        job.strategy.name(),
        transport.name(),
        job.policy.max_attempts()
    );

    let limit = job.policy.max_attempts() as usize;
    let source = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(PipelineError::cancelled(Vec::new(), job.summary_len));
        }
        source = ProxySource::resolve(&job.strategy, limit) => source,
    };

    let orchestrator = FetchOrchestrator::new(transport, job.policy.clone());
    let outcome = orchestrator.run(&job.target, source, cancel).await;

    match outcome {
        FetchOutcome::Succeeded {
            bytes,
            attempts_used,
            descriptor_used,
            attempts,
        } => {
            let output = job.output.clone();
            let persisted = tokio::task::spawn_blocking(move || sink::persist(&bytes, &output))
                .await
                .map_err(|e| SinkError::Io {
                    path: job.output.clone(),
                    source: std::io::Error::other(e.to_string()),
                })??;

            info!(
                "Wrote {} bytes to {} via {} after {} attempt(s)",
                persisted.bytes_written,
                persisted.path.display(),
                descriptor_used,
                attempts_used
            );
            Ok(Delivery {
                persisted,
                attempts_used,
                descriptor_used,
                attempts,
            })
        }
        FetchOutcome::Exhausted { attempts } => {
            let err = PipelineError::exhausted(attempts, job.summary_len);
            if let Some(report) = err.report() {
                error!("Fetch of {} exhausted: {}", job.target.url, report);
            }
            Err(err)
        }
        FetchOutcome::Cancelled { attempts } => {
            info!("Fetch of {} cancelled", job.target.url);
            Err(PipelineError::cancelled(attempts, job.summary_len))
        }
    }
}

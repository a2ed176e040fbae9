//! Resilient playlist fetching.
//!
//! A [`FetchOrchestrator`] draws connection descriptors from a
//! [`ProxySource`], performs one [`Transport`] attempt per descriptor, checks
//! the content with a [`ContentValidator`] and hands accepted bytes to the
//! atomic [`sink`]. The [`pipeline`] module wires these together for a
//! [`FetchJob`] resolved from [`Config`].

pub mod cli;
pub mod config;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod proxy;
pub mod report;
pub mod retry;
pub mod sink;
pub mod transport;
pub mod validate;

pub use config::{Config, ConfigError};
pub use models::{
    AttemptRecord, AttemptResult, AttemptStatus, ConnectionDescriptor, FailureKind, FetchOutcome,
    FetchTarget, ProxyCredentials,
};
pub use orchestrator::FetchOrchestrator;
pub use pipeline::{Delivery, FetchJob, PipelineError};
pub use proxy::{PoolSource, ProxySource, ProxySourceError, ProxyStrategy};
pub use report::{Diagnosis, FetchReport};
pub use retry::{Backoff, RetryPolicy};
pub use sink::{persist, PersistReport, SinkError};
pub use transport::{BrowserConfig, BrowserTransport, HttpTransport, Transport, TransportError, TransportKind};
pub use validate::{ContentValidator, Rejection};

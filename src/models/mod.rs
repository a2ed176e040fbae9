//! Data models for plfetch.

mod attempt;
mod descriptor;
mod target;

pub use attempt::{AttemptRecord, AttemptResult, AttemptStatus, FailureKind, FetchOutcome};
pub use descriptor::{ConnectionDescriptor, ProxyCredentials};
pub use target::FetchTarget;

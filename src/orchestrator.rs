//! Retry and rotation state machine.
//!
//! The orchestrator pulls descriptors from a [`ProxySource`], runs one
//! transport attempt per descriptor under the policy's time budget, validates
//! what comes back and backs off between failures. Attempts never overlap.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{
    AttemptRecord, AttemptResult, AttemptStatus, ConnectionDescriptor, FailureKind, FetchOutcome,
    FetchTarget,
};
use crate::proxy::ProxySource;
use crate::retry::RetryPolicy;
use crate::transport::Transport;
use crate::validate::ContentValidator;

/// Slack given to a transport past its own budget before the attempt is abandoned.
const ATTEMPT_GRACE: Duration = Duration::from_secs(2);

enum State {
    Idle,
    Attempting(ConnectionDescriptor),
    Retrying,
    Succeeded {
        bytes: Vec<u8>,
        descriptor: ConnectionDescriptor,
    },
    Exhausted,
    Cancelled,
}

/// Drives one fetch run to a terminal [`FetchOutcome`].
pub struct FetchOrchestrator {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl FetchOrchestrator {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Run attempts until one is accepted, attempts run out or `cancel` fires.
    pub async fn run(
        &self,
        target: &FetchTarget,
        mut source: ProxySource,
        cancel: &CancellationToken,
    ) -> FetchOutcome {
        let validator = ContentValidator::new(target);
        let max_attempts = self.policy.max_attempts() as usize;
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut state = State::Idle;

        loop {
            state = match state {
                State::Idle => {
                    if cancel.is_cancelled() {
                        State::Cancelled
                    } else {
                        match source.next() {
                            Some(descriptor) => State::Attempting(descriptor),
                            None => {
                                warn!("No connection candidates available for {}", target.url);
                                State::Exhausted
                            }
                        }
                    }
                }

                State::Attempting(descriptor) => {
                    let index = attempts.len() as u32 + 1;
                    info!(
                        "Attempt {}/{} via {} ({})",
                        index,
                        max_attempts,
                        descriptor,
                        self.transport.name()
                    );

                    let started_at = Utc::now();
                    let start = Instant::now();
                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        result = self.attempt(target, &descriptor) => Some(result),
                    };

                    let Some(result) = result else {
                        info!(
                            "Attempt {} via {} cancelled after {} completed attempt(s)",
                            index,
                            descriptor,
                            attempts.len()
                        );
                        state = State::Cancelled;
                        continue;
                    };

                    let elapsed = start.elapsed();
                    let (status, accepted) = match result {
                        AttemptResult::Success { bytes, .. } => match validator.check(&bytes) {
                            Ok(()) => (AttemptStatus::Accepted { len: bytes.len() }, Some(bytes)),
                            Err(rejection) => (
                                AttemptStatus::Failed {
                                    kind: FailureKind::ValidationFailed,
                                    message: rejection.to_string(),
                                },
                                None,
                            ),
                        },
                        AttemptResult::Failure { kind, message } => {
                            (AttemptStatus::Failed { kind, message }, None)
                        }
                    };

                    let record = AttemptRecord {
                        index,
                        descriptor: descriptor.clone(),
                        started_at,
                        elapsed,
                        status,
                    };
                    if record.is_accepted() {
                        info!("{}", record);
                    } else {
                        warn!("{}", record);
                    }
                    attempts.push(record);

                    match accepted {
                        Some(bytes) => State::Succeeded { bytes, descriptor },
                        None if attempts.len() >= max_attempts => {
                            debug!("Attempt limit of {} reached", max_attempts);
                            State::Exhausted
                        }
                        None if source.is_exhausted() => {
                            debug!("Connection candidates exhausted");
                            State::Exhausted
                        }
                        None => State::Retrying,
                    }
                }

                State::Retrying => {
                    let delay = self.policy.delay_for(attempts.len() as u32);
                    debug!("Backing off for {:?}", delay);

                    let slept = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => false,
                        _ = tokio::time::sleep(delay) => true,
                    };

                    if !slept {
                        info!("Cancelled during backoff");
                        State::Cancelled
                    } else {
                        match source.next() {
                            Some(descriptor) => State::Attempting(descriptor),
                            None => State::Exhausted,
                        }
                    }
                }

                State::Succeeded { bytes, descriptor } => {
                    return FetchOutcome::Succeeded {
                        bytes,
                        attempts_used: attempts.len() as u32,
                        descriptor_used: descriptor,
                        attempts,
                    };
                }
                State::Exhausted => return FetchOutcome::Exhausted { attempts },
                State::Cancelled => return FetchOutcome::Cancelled { attempts },
            };
        }
    }

    /// One transport call, bounded even if the transport ignores its budget.
    async fn attempt(&self, target: &FetchTarget, descriptor: &ConnectionDescriptor) -> AttemptResult {
        let budget = self.policy.per_attempt_timeout;
        let call = self.transport.fetch(target, descriptor, budget);
        match tokio::time::timeout(budget.saturating_add(ATTEMPT_GRACE), call).await {
            Ok(result) => result,
            Err(_) => AttemptResult::failure(
                FailureKind::Timeout,
                format!("attempt exceeded {:.1}s", budget.as_secs_f64()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::num::NonZeroU32;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::retry::Backoff;

    enum Step {
        Respond(AttemptResult),
        /// Never completes within any reasonable budget.
        Hang,
    }

    /// Transport that replays a script and records every call.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Step>>,
        fallback: AttemptResult,
        calls: Mutex<Vec<ConnectionDescriptor>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Step>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback: AttemptResult::failure(FailureKind::Network, "connection reset"),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn always(result: AttemptResult) -> Self {
            let mut transport = Self::new(Vec::new());
            transport.fallback = result;
            transport
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn fetch(
            &self,
            _target: &FetchTarget,
            descriptor: &ConnectionDescriptor,
            timeout: Duration,
        ) -> AttemptResult {
            self.calls.lock().unwrap().push(descriptor.clone());
            let step = self.script.lock().unwrap().pop_front();
            match step {
                Some(Step::Respond(result)) => result,
                Some(Step::Hang) => {
                    tokio::time::sleep(timeout * 100).await;
                    AttemptResult::failure(FailureKind::Network, "woke up")
                }
                None => self.fallback.clone(),
            }
        }
    }

    fn ok(body: &str) -> Step {
        Step::Respond(AttemptResult::success(
            body.as_bytes().to_vec(),
            Duration::from_millis(10),
        ))
    }

    fn fail(kind: FailureKind) -> Step {
        Step::Respond(AttemptResult::failure(kind, kind.to_string()))
    }

    fn policy(max: u32) -> RetryPolicy {
        RetryPolicy::new(
            NonZeroU32::new(max).unwrap(),
            Duration::from_secs(10),
            Backoff::Constant(Duration::from_secs(1)),
        )
    }

    fn pool(n: usize) -> ProxySource {
        ProxySource::from_descriptors(
            (0..n)
                .map(|i| ConnectionDescriptor::http(format!("10.0.0.{}", i + 1), 8080))
                .collect(),
        )
    }

    fn playlist() -> FetchTarget {
        FetchTarget::new("https://playlists.example/live.m3u")
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_direct_success() {
        let transport = Arc::new(ScriptedTransport::new(vec![ok("#EXTM3U\n#EXTINF:-1,One\nhttp://a/1\n")]));
        let orchestrator = FetchOrchestrator::new(transport.clone(), policy(5));

        let outcome = orchestrator
            .run(&playlist(), ProxySource::direct(), &CancellationToken::new())
            .await;

        match outcome {
            FetchOutcome::Succeeded {
                bytes,
                attempts_used,
                descriptor_used,
                attempts,
            } => {
                assert!(bytes.starts_with(b"#EXTM3U"));
                assert_eq!(attempts_used, 1);
                assert_eq!(descriptor_used, ConnectionDescriptor::Direct);
                assert_eq!(attempts.len(), 1);
                assert!(attempts[0].is_accepted());
            }
            other => panic!("expected success, got {:?}", other),
        }
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_rotates_past_network_failures() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            fail(FailureKind::Network),
            fail(FailureKind::Network),
            ok("#EXTM3U\nhttp://a/1\n"),
        ]));
        let orchestrator = FetchOrchestrator::new(transport.clone(), policy(5));

        let outcome = orchestrator
            .run(&playlist(), pool(3), &CancellationToken::new())
            .await;

        let FetchOutcome::Succeeded {
            attempts_used,
            descriptor_used,
            attempts,
            ..
        } = outcome
        else {
            panic!("expected success");
        };
        assert_eq!(attempts_used, 3);
        assert_eq!(descriptor_used, ConnectionDescriptor::http("10.0.0.3", 8080));
        assert_eq!(attempts[0].failure_kind(), Some(FailureKind::Network));
        assert_eq!(attempts[1].failure_kind(), Some(FailureKind::Network));
        assert!(attempts[2].is_accepted());
        assert_eq!(
            attempts.iter().map(|a| a.index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        // Each attempt used a distinct descriptor, in draw order
        let calls = transport.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], ConnectionDescriptor::http("10.0.0.1", 8080));
        assert_eq!(calls[2], ConnectionDescriptor::http("10.0.0.3", 8080));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_timeout_exhausts_after_max_attempts() {
        let transport = Arc::new(ScriptedTransport::always(AttemptResult::failure(
            FailureKind::Timeout,
            "no response",
        )));
        let orchestrator = FetchOrchestrator::new(transport.clone(), policy(5));

        let outcome = orchestrator
            .run(&playlist(), pool(10), &CancellationToken::new())
            .await;

        let FetchOutcome::Exhausted { attempts } = outcome else {
            panic!("expected exhaustion");
        };
        assert_eq!(attempts.len(), 5);
        assert!(attempts
            .iter()
            .all(|a| a.failure_kind() == Some(FailureKind::Timeout)));
        assert_eq!(transport.call_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exactly_n_attempts_for_each_bound() {
        for n in [1u32, 2, 7] {
            let transport = Arc::new(ScriptedTransport::always(AttemptResult::failure(
                FailureKind::HttpStatus(403),
                "forbidden",
            )));
            let orchestrator = FetchOrchestrator::new(transport.clone(), policy(n));
            let outcome = orchestrator
                .run(&playlist(), pool(n as usize + 3), &CancellationToken::new())
                .await;
            assert!(matches!(outcome, FetchOutcome::Exhausted { .. }));
            assert_eq!(outcome.attempts().len(), n as usize);
            assert_eq!(transport.call_count(), n as usize);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_content_is_retried() {
        let target = playlist().with_marker("#EXTM3U");
        let transport = Arc::new(ScriptedTransport::new(vec![
            ok("<html>Just a moment...</html>"),
            ok("#EXTM3U\nhttp://a/1\n"),
        ]));
        let orchestrator = FetchOrchestrator::new(transport.clone(), policy(5));

        let outcome = orchestrator
            .run(&target, pool(3), &CancellationToken::new())
            .await;

        assert!(outcome.is_success());
        let attempts = outcome.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(
            attempts[0].failure_kind(),
            Some(FailureKind::ValidationFailed)
        );
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_source_never_calls_transport() {
        let transport = Arc::new(ScriptedTransport::new(vec![ok("#EXTM3U\n")]));
        let orchestrator = FetchOrchestrator::new(transport.clone(), policy(5));

        let outcome = orchestrator
            .run(&playlist(), ProxySource::empty(), &CancellationToken::new())
            .await;

        assert!(matches!(outcome, FetchOutcome::Exhausted { ref attempts } if attempts.is_empty()));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_shorter_than_bound_exhausts_early() {
        let transport = Arc::new(ScriptedTransport::always(AttemptResult::failure(
            FailureKind::ProxyUnavailable,
            "tunnel failed",
        )));
        let orchestrator = FetchOrchestrator::new(transport.clone(), policy(5));

        let start = Instant::now();
        let outcome = orchestrator
            .run(&playlist(), pool(2), &CancellationToken::new())
            .await;

        assert_eq!(outcome.attempts().len(), 2);
        assert!(matches!(outcome, FetchOutcome::Exhausted { .. }));
        // One backoff between the two attempts, none after the last
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_follows_policy() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            fail(FailureKind::Network),
            fail(FailureKind::Network),
            ok("#EXTM3U\n"),
        ]));
        let policy = RetryPolicy::new(
            NonZeroU32::new(5).unwrap(),
            Duration::from_secs(10),
            Backoff::Linear {
                base: Duration::from_secs(2),
                max: Duration::from_secs(60),
            },
        );
        let orchestrator = FetchOrchestrator::new(transport, policy);

        let start = Instant::now();
        let outcome = orchestrator
            .run(&playlist(), pool(3), &CancellationToken::new())
            .await;

        assert!(outcome.is_success());
        // 2s after attempt 1, 4s after attempt 2
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_transport_is_timed_out() {
        let transport = Arc::new(ScriptedTransport::new(vec![Step::Hang, ok("#EXTM3U\n")]));
        let orchestrator = FetchOrchestrator::new(transport, policy(3));

        let outcome = orchestrator
            .run(&playlist(), pool(3), &CancellationToken::new())
            .await;

        assert!(outcome.is_success());
        assert_eq!(
            outcome.attempts()[0].failure_kind(),
            Some(FailureKind::Timeout)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_attempt_budget_does_not_overflow() {
        let transport = Arc::new(ScriptedTransport::new(vec![ok("#EXTM3U\n")]));
        let policy = RetryPolicy::new(
            NonZeroU32::new(1).unwrap(),
            Duration::MAX,
            Backoff::Constant(Duration::from_secs(1)),
        );
        let orchestrator = FetchOrchestrator::new(transport, policy);

        let outcome = orchestrator
            .run(&playlist(), ProxySource::direct(), &CancellationToken::new())
            .await;

        assert!(outcome.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let transport = Arc::new(ScriptedTransport::always(AttemptResult::failure(
            FailureKind::Network,
            "reset",
        )));
        let policy = RetryPolicy::new(
            NonZeroU32::new(5).unwrap(),
            Duration::from_secs(10),
            Backoff::Constant(Duration::from_secs(3600)),
        );
        let orchestrator = FetchOrchestrator::new(transport.clone(), policy);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let outcome = orchestrator.run(&playlist(), pool(5), &cancel).await;

        let FetchOutcome::Cancelled { attempts } = outcome else {
            panic!("expected cancellation");
        };
        assert_eq!(attempts.len(), 1);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_attempt() {
        let transport = Arc::new(ScriptedTransport::new(vec![Step::Hang]));
        let orchestrator = FetchOrchestrator::new(transport.clone(), policy(5));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let outcome = orchestrator.run(&playlist(), pool(5), &cancel).await;

        assert!(matches!(outcome, FetchOutcome::Cancelled { ref attempts } if attempts.is_empty()));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_precancelled_token_makes_no_attempt() {
        let transport = Arc::new(ScriptedTransport::new(vec![ok("#EXTM3U\n")]));
        let orchestrator = FetchOrchestrator::new(transport.clone(), policy(5));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = orchestrator.run(&playlist(), pool(5), &cancel).await;

        assert!(matches!(outcome, FetchOutcome::Cancelled { .. }));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_attempt_after_success() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ok("#EXTM3U\n"),
            ok("#EXTM3U\nsecond\n"),
        ]));
        let orchestrator = FetchOrchestrator::new(transport.clone(), policy(5));

        let outcome = orchestrator
            .run(&playlist(), pool(5), &CancellationToken::new())
            .await;

        assert!(outcome.is_success());
        assert_eq!(transport.call_count(), 1);
    }
}

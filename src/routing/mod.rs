//! Fallback Coordination
//!
//! Walks a ranked candidate list in order, retrying transient failures and
//! tracking per-backend health so known-bad backends are skipped.
//!
//! # Waterfall
//!
//! ```text
//! candidate 1 (score 0.91) ── degraded? skip ──┐
//! candidate 2 (score 0.87) ── transient ── retry 1s ── retry 2s ── fail ──┐
//! candidate 3 (score 0.80) ── success ──> CallResult                      │
//!                                                                         v
//!                                  (list exhausted: ProviderUnavailable + trail)
//! ```
//!
//! Per attempt:
//! - a backend whose health is DEGRADED (cooldown pending) or MISCONFIGURED
//!   is skipped outright
//! - a transient failure (timeout, 5xx, rate limit) gets up to 2 immediate
//!   retries with exponential backoff against the *same* backend
//! - a permanent failure (auth, malformed request) moves to the next
//!   candidate at once
//!
//! Attempts are strictly sequential; fallback candidates are never raced,
//! so a request never pays for speculative calls.

pub mod health;

pub use health::{HealthConfig, HealthSnapshot, HealthState, HealthTracker};

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::OrchestratorError;
use crate::provider::{
    AdapterRegistry, CallResult, ChatMessage, ErrorKind, FunctionRegistry, InvokeOptions,
    InvokeRequest, ProviderError, Usage,
};
use crate::registry::CapabilityRecord;

// ============================================================================
// Retry Configuration
// ============================================================================

/// Retry behavior for transient failures on a single backend
#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    /// Immediate retries after the first transient failure
    pub max_retries: u32,
    /// Base backoff; doubles per retry (1s, 2s, ...)
    pub backoff_base: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `retry` (0-based)
    #[must_use]
    pub fn backoff_for(&self, retry: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(retry)
    }
}

// ============================================================================
// Attempt Trail
// ============================================================================

/// Why an attempt on one backend ended the way it did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The backend served the request
    Served,
    /// Exhausted retries on transient failures
    Transient(String),
    /// Failed permanently; no retries attempted
    Permanent(String),
    /// Skipped: degraded and still cooling down
    SkippedDegraded,
    /// Skipped: marked misconfigured
    SkippedMisconfigured,
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Served => write!(f, "served"),
            Self::Transient(msg) => write!(f, "transient failure: {msg}"),
            Self::Permanent(msg) => write!(f, "permanent failure: {msg}"),
            Self::SkippedDegraded => write!(f, "skipped (degraded)"),
            Self::SkippedMisconfigured => write!(f, "skipped (misconfigured)"),
        }
    }
}

/// One entry in the attempt history of a routed request
#[derive(Clone, Debug)]
pub struct AttemptRecord {
    /// Backend that was attempted (or skipped)
    pub backend_id: String,
    /// How the attempt ended
    pub outcome: AttemptOutcome,
    /// Retries consumed on this backend
    pub retries: u32,
    /// Tokens billed by failed-but-charged calls, for the ledger
    pub usage: Option<Usage>,
}

// ============================================================================
// Coordinator
// ============================================================================

/// Walks ranked candidates, retries transients, and updates health state
pub struct FallbackCoordinator {
    adapters: Arc<AdapterRegistry>,
    health: Arc<HealthTracker>,
    retry: RetryConfig,
}

impl FallbackCoordinator {
    /// Create a coordinator over an adapter set and health tracker
    #[must_use]
    pub fn new(
        adapters: Arc<AdapterRegistry>,
        health: Arc<HealthTracker>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            adapters,
            health,
            retry,
        }
    }

    /// Health tracker shared with the rest of the orchestrator
    #[must_use]
    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    /// Attempt candidates in order until one succeeds.
    ///
    /// Returns the winning [`CallResult`] together with the full attempt
    /// trail; on exhaustion returns
    /// [`OrchestratorError::ProviderUnavailable`] carrying the same trail.
    pub async fn execute(
        &self,
        candidates: &[Arc<CapabilityRecord>],
        messages: &[ChatMessage],
        options: &InvokeOptions,
        functions: &Arc<FunctionRegistry>,
        cancel: &CancellationToken,
    ) -> Result<(CallResult, Vec<AttemptRecord>), OrchestratorError> {
        let mut attempts = Vec::new();

        for record in candidates {
            match self.health.state(&record.id) {
                HealthState::Misconfigured => {
                    tracing::debug!(backend = %record.id, "skipping misconfigured backend");
                    attempts.push(AttemptRecord {
                        backend_id: record.id.clone(),
                        outcome: AttemptOutcome::SkippedMisconfigured,
                        retries: 0,
                        usage: None,
                    });
                    continue;
                }
                HealthState::Degraded if !self.health.is_routable(&record.id) => {
                    tracing::debug!(backend = %record.id, "skipping degraded backend");
                    attempts.push(AttemptRecord {
                        backend_id: record.id.clone(),
                        outcome: AttemptOutcome::SkippedDegraded,
                        retries: 0,
                        usage: None,
                    });
                    continue;
                }
                _ => {}
            }

            match self
                .attempt_backend(record, messages, options, functions, cancel)
                .await
            {
                Ok((result, retries)) => {
                    attempts.push(AttemptRecord {
                        backend_id: record.id.clone(),
                        outcome: AttemptOutcome::Served,
                        retries,
                        usage: None,
                    });
                    return Ok((result, attempts));
                }
                Err((error, retries)) => {
                    tracing::info!(
                        backend = %record.id,
                        error = %error,
                        "backend failed, falling back to next candidate"
                    );
                    let outcome = match error.kind {
                        ErrorKind::Transient => AttemptOutcome::Transient(error.message.clone()),
                        ErrorKind::Permanent => AttemptOutcome::Permanent(error.message.clone()),
                    };
                    attempts.push(AttemptRecord {
                        backend_id: record.id.clone(),
                        outcome,
                        retries,
                        usage: error.usage,
                    });
                }
            }
        }

        Err(OrchestratorError::ProviderUnavailable { attempts })
    }

    /// Execute against exactly one backend with retry but no fallback.
    ///
    /// Used for forced-backend routing and consensus panel seats, where a
    /// failure must not waterfall to other backends.
    pub async fn execute_single(
        &self,
        record: &CapabilityRecord,
        messages: &[ChatMessage],
        options: &InvokeOptions,
        functions: &Arc<FunctionRegistry>,
        cancel: &CancellationToken,
    ) -> Result<CallResult, ProviderError> {
        self.attempt_backend(record, messages, options, functions, cancel)
            .await
            .map(|(result, _)| result)
            .map_err(|(error, _)| error)
    }

    /// One backend, with transient retries; reports retries consumed
    async fn attempt_backend(
        &self,
        record: &CapabilityRecord,
        messages: &[ChatMessage],
        options: &InvokeOptions,
        functions: &Arc<FunctionRegistry>,
        cancel: &CancellationToken,
    ) -> Result<(CallResult, u32), (ProviderError, u32)> {
        let Some(adapter) = self.adapters.get(&record.provider_id) else {
            self.health.mark_misconfigured(&record.id);
            return Err((
                ProviderError::permanent(format!(
                    "no adapter registered for provider `{}`",
                    record.provider_id
                )),
                0,
            ));
        };

        let mut retries = 0;
        loop {
            let request = InvokeRequest::new(
                record.id.clone(),
                messages.to_vec(),
                options.clone(),
                functions.clone(),
            );

            match self.invoke_once(adapter.as_ref(), &request, options, cancel).await {
                Ok(result) => {
                    self.health.record_success(&record.id);
                    return Ok((result, retries));
                }
                Err(error) => {
                    self.health.record_failure(&record.id);

                    let retryable = error.kind == ErrorKind::Transient
                        && retries < self.retry.max_retries
                        && !cancel.is_cancelled();
                    if !retryable {
                        return Err((error, retries));
                    }

                    let backoff = self.retry.backoff_for(retries);
                    tracing::debug!(
                        backend = %record.id,
                        retry = retries + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying after transient failure"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            return Err((ProviderError::transient("cancelled during backoff"), retries));
                        }
                        () = tokio::time::sleep(backoff) => {}
                    }
                    retries += 1;
                }
            }
        }
    }

    /// Single adapter invocation under the per-call timeout and cancel signal
    async fn invoke_once(
        &self,
        adapter: &dyn crate::provider::ProviderAdapter,
        request: &InvokeRequest,
        options: &InvokeOptions,
        cancel: &CancellationToken,
    ) -> Result<CallResult, ProviderError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ProviderError::transient("cancelled")),
            outcome = tokio::time::timeout(options.timeout, adapter.invoke(request, cancel)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::transient(format!(
                        "timed out after {}ms",
                        options.timeout.as_millis()
                    ))),
                }
            }
        }
    }
}

impl std::fmt::Debug for FallbackCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackCoordinator")
            .field("retry", &self.retry)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

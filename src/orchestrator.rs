//! Orchestrator Facade
//!
//! Composes the registry, analyzer, scorer, fallback coordinator, consensus
//! engine, and ledger into the two routing entry points:
//!
//! - [`Orchestrator::route`] — classify, rank, waterfall, record usage
//! - [`Orchestrator::route_with_consensus`] — classify, rank, fan out a
//!   panel, reconcile, record every participant's usage
//!
//! Construction goes through [`OrchestratorBuilder`]: all collaborators are
//! wired explicitly, nothing is global.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::analyzer::{Classification, SecondaryClassifier, TaskAnalyzer, TaskCategory};
use crate::config::{ForcedRoutePolicy, OrchestratorConfig};
use crate::consensus::{ConsensusEngine, ConsensusOutcome, ConsensusStrategy};
use crate::error::OrchestratorError;
use crate::ledger::{estimate_cost, UsageFilter, UsageLedger, UsageRecord, UsageReport};
use crate::provider::{
    AdapterRegistry, CallResult, ChatMessage, FunctionHandler, FunctionRegistry, InvokeOptions,
    ProviderAdapter, Usage,
};
use crate::registry::{CapabilityRecord, CapabilityRegistry, RegistrySnapshot};
use crate::routing::{AttemptRecord, FallbackCoordinator, HealthTracker};
use crate::scoring::CandidateScorer;

// ============================================================================
// Route Options
// ============================================================================

/// Per-request routing options
#[derive(Clone, Debug, Default)]
pub struct RouteOptions {
    /// Bypass analysis and scoring; call exactly this backend.
    /// Ignored by consensus routing (a panel is never forced).
    pub forced_backend: Option<String>,
    /// Skip classification and use this category's requirements
    pub forced_category: Option<TaskCategory>,
    /// Session id attributed to usage records
    pub session_id: Option<String>,
}

impl RouteOptions {
    /// Default options: full analysis, automatic candidate selection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a specific backend
    #[must_use]
    pub fn with_forced_backend(mut self, backend_id: impl Into<String>) -> Self {
        self.forced_backend = Some(backend_id.into());
        self
    }

    /// Force a task category
    #[must_use]
    pub fn with_forced_category(mut self, category: TaskCategory) -> Self {
        self.forced_category = Some(category);
        self
    }

    /// Attribute usage to a session
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Explicit wiring for an [`Orchestrator`]
pub struct OrchestratorBuilder {
    registry: Option<Arc<CapabilityRegistry>>,
    adapters: AdapterRegistry,
    secondary: Option<Arc<dyn SecondaryClassifier>>,
    config: OrchestratorConfig,
}

impl OrchestratorBuilder {
    /// Start a builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: None,
            adapters: AdapterRegistry::new(),
            secondary: None,
            config: OrchestratorConfig::default(),
        }
    }

    /// Use an explicit capability registry (defaults to the XDG catalog,
    /// falling back to the built-in set)
    #[must_use]
    pub fn registry(mut self, registry: Arc<CapabilityRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Register a provider adapter
    #[must_use]
    pub fn adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.register(adapter);
        self
    }

    /// Attach a stage-two classifier for low-confidence prompts
    #[must_use]
    pub fn secondary_classifier(mut self, classifier: Arc<dyn SecondaryClassifier>) -> Self {
        self.secondary = Some(classifier);
        self
    }

    /// Override the orchestrator configuration
    #[must_use]
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Wire everything together
    pub fn build(self) -> Result<Orchestrator, OrchestratorError> {
        let registry = match self.registry {
            Some(registry) => registry,
            None => Arc::new(CapabilityRegistry::from_default_location()?),
        };

        let mut analyzer = TaskAnalyzer::new();
        if let Some(secondary) = self.secondary {
            analyzer = analyzer.with_secondary(secondary);
        }

        let health = Arc::new(HealthTracker::with_config(self.config.health));
        let coordinator = Arc::new(FallbackCoordinator::new(
            Arc::new(self.adapters),
            health,
            self.config.retry,
        ));
        let consensus = ConsensusEngine::new(coordinator.clone(), self.config.consensus.clone());

        Ok(Orchestrator {
            registry,
            analyzer,
            scorer: CandidateScorer::new(),
            coordinator,
            consensus,
            ledger: Arc::new(UsageLedger::new()),
            functions: Arc::new(FunctionRegistry::new()),
            config: self.config,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// The model orchestrator
pub struct Orchestrator {
    registry: Arc<CapabilityRegistry>,
    analyzer: TaskAnalyzer,
    scorer: CandidateScorer,
    coordinator: Arc<FallbackCoordinator>,
    consensus: ConsensusEngine,
    ledger: Arc<UsageLedger>,
    functions: Arc<FunctionRegistry>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Start building an orchestrator
    #[must_use]
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Route one request to the best available backend.
    ///
    /// Classifies the prompt (unless a category is forced), ranks eligible
    /// candidates, walks the waterfall, records usage, and returns the
    /// winning [`CallResult`] — or [`OrchestratorError::ProviderUnavailable`]
    /// with the full attempt trail.
    pub async fn route(
        &self,
        prompt: &str,
        options: RouteOptions,
    ) -> Result<CallResult, OrchestratorError> {
        let classification = self.classify(prompt, options.forced_category).await;
        let requirements = classification.requirements();
        let snapshot = self.registry.snapshot();
        let messages = vec![ChatMessage::user(prompt)];
        let invoke_options = InvokeOptions::default().with_timeout(self.config.call_timeout);
        let cancel = CancellationToken::new();

        tracing::info!(
            category = %classification.category,
            confidence = classification.confidence,
            forced_backend = options.forced_backend.as_deref(),
            "routing request"
        );

        let candidates: Vec<Arc<CapabilityRecord>> = match &options.forced_backend {
            Some(forced_id) => {
                let record = snapshot
                    .get(forced_id)
                    .ok_or_else(|| OrchestratorError::UnknownBackend(forced_id.clone()))?;
                if !snapshot.record_routable(&record) {
                    return Err(OrchestratorError::Credential {
                        provider: record.provider_id.clone(),
                        env_var: snapshot
                            .provider(&record.provider_id)
                            .and_then(|p| p.spec.credential_env.clone())
                            .unwrap_or_default(),
                    });
                }
                match self.config.forced_route {
                    // Explicit override, explicit responsibility: the
                    // forced backend is the only candidate.
                    ForcedRoutePolicy::FailHard => vec![record],
                    ForcedRoutePolicy::FallBack => {
                        let mut list = vec![record.clone()];
                        list.extend(
                            self.scorer
                                .rank(&snapshot, &requirements)
                                .into_iter()
                                .map(|c| c.record)
                                .filter(|r| r.id != record.id),
                        );
                        list
                    }
                }
            }
            None => {
                let ranked = self.scorer.rank(&snapshot, &requirements);
                if ranked.is_empty() {
                    return Err(OrchestratorError::NoEligibleCandidates(
                        requirements.category,
                    ));
                }
                ranked.into_iter().map(|c| c.record).collect()
            }
        };

        let outcome = self
            .coordinator
            .execute(
                &candidates,
                &messages,
                &invoke_options,
                &self.functions,
                &cancel,
            )
            .await;

        match outcome {
            Ok((result, attempts)) => {
                self.record_billed_failures(&snapshot, &attempts, options.session_id.as_deref());
                self.record_usage(
                    &snapshot,
                    &result.backend_id,
                    result.usage,
                    result.latency_ms,
                    options.session_id.as_deref(),
                );
                Ok(result)
            }
            Err(error) => {
                if let OrchestratorError::ProviderUnavailable { attempts } = &error {
                    self.record_billed_failures(&snapshot, attempts, options.session_id.as_deref());
                }
                Err(error)
            }
        }
    }

    /// Route one request through a consensus panel.
    ///
    /// Asks the scorer for the top `panel_size` candidates, fans the
    /// request out to all of them concurrently, reconciles with `strategy`,
    /// and records every participant's usage. `options.forced_backend` is
    /// ignored: panels are always selected by score.
    pub async fn route_with_consensus(
        &self,
        prompt: &str,
        panel_size: usize,
        strategy: ConsensusStrategy,
        options: RouteOptions,
    ) -> Result<ConsensusOutcome, OrchestratorError> {
        let classification = self.classify(prompt, options.forced_category).await;
        let requirements = classification.requirements();
        let snapshot = self.registry.snapshot();
        let cancel = CancellationToken::new();

        let ranked = self.scorer.rank(&snapshot, &requirements);
        if ranked.is_empty() || panel_size == 0 {
            return Err(OrchestratorError::NoEligibleCandidates(
                requirements.category,
            ));
        }

        let panel: Vec<Arc<CapabilityRecord>> = ranked
            .iter()
            .take(panel_size)
            .map(|c| c.record.clone())
            .collect();

        // Judge preference: explicit configuration, then the best-ranked
        // candidate outside the panel, then the top panel member.
        let judge = self
            .config
            .consensus
            .judge_backend
            .as_ref()
            .and_then(|id| snapshot.get(id))
            .or_else(|| ranked.get(panel.len()).map(|c| c.record.clone()))
            .or_else(|| panel.first().cloned());

        tracing::info!(
            category = %classification.category,
            panel = panel.len(),
            strategy = %strategy,
            "routing request through consensus panel"
        );

        let outcome = self
            .consensus
            .run(prompt, &panel, judge, strategy, &self.functions, &cancel)
            .await?;

        for response in &outcome.responses {
            // Cost accrues for calls that returned a response or billed an
            // error; cancelled seats carry no usage.
            if response.is_response() || response.usage.total() > 0 {
                self.record_usage(
                    &snapshot,
                    &response.backend_id,
                    response.usage,
                    response.latency_ms,
                    options.session_id.as_deref(),
                );
            }
        }

        Ok(outcome)
    }

    /// Aggregate usage matching a filter
    #[must_use]
    pub fn usage_report(&self, filter: &UsageFilter) -> UsageReport {
        self.ledger.report(filter)
    }

    /// Register a named function for function-calling pass-through
    pub fn register_function(&self, name: impl Into<String>, handler: Arc<FunctionHandler>) {
        self.functions.register(name, handler);
    }

    /// The capability registry (for reloads and operator surfaces)
    #[must_use]
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// The shared health tracker
    #[must_use]
    pub fn health(&self) -> &Arc<HealthTracker> {
        self.coordinator.health()
    }

    /// The usage ledger
    #[must_use]
    pub fn ledger(&self) -> &Arc<UsageLedger> {
        &self.ledger
    }

    async fn classify(&self, prompt: &str, forced: Option<TaskCategory>) -> Classification {
        match forced {
            Some(category) => Classification::new(category, 1.0),
            None => self.analyzer.analyze(prompt).await,
        }
    }

    fn record_usage(
        &self,
        snapshot: &RegistrySnapshot,
        backend_id: &str,
        usage: Usage,
        latency_ms: u64,
        session_id: Option<&str>,
    ) {
        let (provider_id, cost_estimate) = match snapshot.get(backend_id) {
            Some(record) => (record.provider_id.clone(), estimate_cost(&record, usage)),
            None => ("unknown".to_string(), 0.0),
        };
        self.ledger.record(UsageRecord {
            backend_id: backend_id.to_string(),
            provider_id,
            session_id: session_id.map(str::to_string),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost_estimate,
            latency_ms,
            timestamp: Utc::now(),
        });
    }

    /// Failed attempts that still billed tokens get ledger entries too
    fn record_billed_failures(
        &self,
        snapshot: &RegistrySnapshot,
        attempts: &[AttemptRecord],
        session_id: Option<&str>,
    ) {
        for attempt in attempts {
            if let Some(usage) = attempt.usage {
                if usage.total() > 0 {
                    self.record_usage(snapshot, &attempt.backend_id, usage, 0, session_id);
                }
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry.snapshot().stats())
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ProviderSpec;

    fn registry() -> Arc<CapabilityRegistry> {
        let providers = vec![
            ProviderSpec {
                id: "local".to_string(),
                display_name: "Local".to_string(),
                credential_env: None,
            },
            ProviderSpec {
                id: "keyless".to_string(),
                display_name: "Keyless".to_string(),
                credential_env: Some("SWITCHBOARD_TEST_MISSING_KEY".to_string()),
            },
        ];
        let records = vec![
            CapabilityRecord {
                id: "worker".to_string(),
                display_name: "Worker".to_string(),
                provider_id: "local".to_string(),
                context_window: 128_000,
                input_cost_per_mtok: 1.0,
                output_cost_per_mtok: 2.0,
                reasoning_score: 80,
                coding_score: 85,
                speed_rating: 6,
                supports_vision: false,
                supports_function_calling: true,
            },
            CapabilityRecord {
                id: "locked".to_string(),
                display_name: "Locked".to_string(),
                provider_id: "keyless".to_string(),
                context_window: 128_000,
                input_cost_per_mtok: 1.0,
                output_cost_per_mtok: 2.0,
                reasoning_score: 90,
                coding_score: 90,
                speed_rating: 8,
                supports_vision: false,
                supports_function_calling: true,
            },
        ];
        Arc::new(CapabilityRegistry::from_parts(providers, records).unwrap())
    }

    #[tokio::test]
    async fn test_forced_unknown_backend_errors() {
        let orchestrator = Orchestrator::builder()
            .registry(registry())
            .build()
            .unwrap();

        let error = orchestrator
            .route(
                "hello",
                RouteOptions::new().with_forced_backend("no-such-backend"),
            )
            .await
            .unwrap_err();

        assert!(matches!(error, OrchestratorError::UnknownBackend(id) if id == "no-such-backend"));
    }

    #[tokio::test]
    async fn test_forced_backend_with_missing_credentials_errors() {
        let orchestrator = Orchestrator::builder()
            .registry(registry())
            .build()
            .unwrap();

        let error = orchestrator
            .route("hello", RouteOptions::new().with_forced_backend("locked"))
            .await
            .unwrap_err();

        match error {
            OrchestratorError::Credential { provider, env_var } => {
                assert_eq!(provider, "keyless");
                assert_eq!(env_var, "SWITCHBOARD_TEST_MISSING_KEY");
            }
            other => panic!("expected credential error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_adapter_yields_provider_unavailable() {
        // A valid registry but no adapters: the waterfall exhausts at once.
        let orchestrator = Orchestrator::builder()
            .registry(registry())
            .build()
            .unwrap();

        let error = orchestrator
            .route("Write a binary search function in Python", RouteOptions::new())
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            OrchestratorError::ProviderUnavailable { .. }
        ));
    }

    #[test]
    fn test_register_function_is_visible_to_adapters() {
        let orchestrator = Orchestrator::builder()
            .registry(registry())
            .build()
            .unwrap();

        orchestrator.register_function(
            "lookup",
            Arc::new(|args| serde_json::json!({ "echo": args })),
        );
        assert_eq!(orchestrator.functions.names(), vec!["lookup".to_string()]);
    }
}

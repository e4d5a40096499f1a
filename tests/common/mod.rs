//! Shared test infrastructure: a scripted provider adapter and catalog
//! builders, so integration tests exercise the orchestrator without any
//! real LLM calls.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use switchboard::{
    CallResult, CapabilityRecord, CapabilityRegistry, InvokeRequest, ProviderAdapter,
    ProviderError, ProviderSpec, Usage,
};

/// Route tracing through the test harness; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Scripted adapter for the `"mock"` provider.
///
/// Each backend id can be given a queue of outcomes; once the queue drains
/// (or if none was set) the adapter answers successfully. All invocations
/// are logged in order.
pub struct MockAdapter {
    scripts: Mutex<HashMap<String, VecDeque<Result<String, ProviderError>>>>,
    calls: Mutex<Vec<String>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue outcomes for a backend; drained front-first per invocation.
    pub fn script(&self, backend: &str, outcomes: Vec<Result<String, ProviderError>>) {
        self.scripts
            .lock()
            .insert(backend.to_string(), outcomes.into());
    }

    /// Make a backend fail transiently forever.
    pub fn always_transient(&self, backend: &str) {
        // A long queue stands in for "forever" within a test's lifetime.
        self.script(
            backend,
            (0..64)
                .map(|_| Err(ProviderError::transient("503 service unavailable")))
                .collect(),
        );
    }

    /// Invocation order across all backends.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn provider_id(&self) -> &str {
        "mock"
    }

    async fn invoke(
        &self,
        request: &InvokeRequest,
        _cancel: &CancellationToken,
    ) -> Result<CallResult, ProviderError> {
        self.calls.lock().push(request.backend_id.clone());
        let outcome = self
            .scripts
            .lock()
            .get_mut(&request.backend_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(format!("response from {}", request.backend_id)));

        outcome.map(|content| CallResult {
            content,
            backend_id: request.backend_id.clone(),
            usage: Usage::new(100, 50),
            latency_ms: 8,
            error: None,
        })
    }
}

/// A capability record under the `"mock"` provider.
pub fn mock_record(id: &str, reasoning: u8, coding: u8, speed: u8, cost: f64) -> CapabilityRecord {
    CapabilityRecord {
        id: id.to_string(),
        display_name: id.to_string(),
        provider_id: "mock".to_string(),
        context_window: 128_000,
        input_cost_per_mtok: cost,
        output_cost_per_mtok: cost * 4.0,
        reasoning_score: reasoning,
        coding_score: coding,
        speed_rating: speed,
        supports_vision: false,
        supports_function_calling: true,
    }
}

/// Registry over the `"mock"` provider (no credentials required).
pub fn mock_registry(records: Vec<CapabilityRecord>) -> Arc<CapabilityRegistry> {
    let providers = vec![ProviderSpec {
        id: "mock".to_string(),
        display_name: "Mock".to_string(),
        credential_env: None,
    }];
    Arc::new(CapabilityRegistry::from_parts(providers, records).expect("valid test catalog"))
}

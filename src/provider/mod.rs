//! Provider Adapter Contract
//!
//! Trait definitions for provider adapters. An adapter wraps one LLM
//! provider's API behind a normalized call surface so the orchestrator can
//! route across heterogeneous backends without knowing any wire format.
//!
//! # Design Philosophy
//!
//! Adapters are selected by provider id, never by runtime type inspection.
//! Every adapter must:
//! - classify its own failures into [`ErrorKind::Transient`] or
//!   [`ErrorKind::Permanent`] before returning
//! - honor the cancellation token and stop consuming the caller's budget
//!   once it fires
//!
//! Implementations handle provider-specific details (API formats, auth,
//! streaming) outside this crate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// ============================================================================
// Messages
// ============================================================================

/// Role of a message in a normalized conversation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// System instruction
    System,
    /// End-user content
    User,
    /// Model-generated content
    Assistant,
}

/// One message in the normalized conversation format shared by all adapters
#[derive(Clone, Debug)]
pub struct ChatMessage {
    /// Who produced this message
    pub role: Role,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ============================================================================
// Invocation Request/Result
// ============================================================================

/// Per-call options passed to an adapter
#[derive(Clone, Debug)]
pub struct InvokeOptions {
    /// Timeout for this single call (enforced by the coordinator)
    pub timeout: Duration,
    /// Maximum tokens in the response (`None` = provider default)
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0-1.0)
    pub temperature: f32,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_tokens: None,
            temperature: 0.7,
        }
    }
}

impl InvokeOptions {
    /// Set the per-call timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the sampling temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }

    /// Set the response token limit
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A normalized invocation handed to an adapter
#[derive(Clone)]
pub struct InvokeRequest {
    /// Unique id for this call attempt
    pub request_id: Uuid,
    /// Capability-registry id of the backend to call
    pub backend_id: String,
    /// Conversation in normalized form
    pub messages: Vec<ChatMessage>,
    /// Per-call options
    pub options: InvokeOptions,
    /// Registered functions available for function-calling pass-through
    pub functions: Arc<FunctionRegistry>,
}

impl InvokeRequest {
    /// Build a request for a backend from a message list
    pub fn new(
        backend_id: impl Into<String>,
        messages: Vec<ChatMessage>,
        options: InvokeOptions,
        functions: Arc<FunctionRegistry>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            backend_id: backend_id.into(),
            messages,
            options,
            functions,
        }
    }
}

impl std::fmt::Debug for InvokeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvokeRequest")
            .field("request_id", &self.request_id)
            .field("backend_id", &self.backend_id)
            .field("messages", &self.messages.len())
            .field("options", &self.options)
            .finish()
    }
}

/// Token counts reported by an adapter for one call
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Usage {
    /// Tokens consumed from the prompt/context
    pub input_tokens: u64,
    /// Tokens generated in the response
    pub output_tokens: u64,
}

impl Usage {
    /// Create a usage report
    #[must_use]
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens in both directions
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Normalized outcome of one provider invocation
#[derive(Clone, Debug)]
pub struct CallResult {
    /// Response text
    pub content: String,
    /// Backend that produced the response
    pub backend_id: String,
    /// Token usage for the call
    pub usage: Usage,
    /// Wall-clock latency in milliseconds
    pub latency_ms: u64,
    /// Set when this entry records a failed attempt (consensus abstentions)
    pub error: Option<ErrorKind>,
}

impl CallResult {
    /// Record a failed panel seat as an abstention entry
    pub(crate) fn abstention(backend_id: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            content: String::new(),
            backend_id: backend_id.into(),
            usage: Usage::default(),
            latency_ms: 0,
            error: Some(kind),
        }
    }

    /// Whether this entry carries a real response
    #[must_use]
    pub fn is_response(&self) -> bool {
        self.error.is_none()
    }
}

// ============================================================================
// Adapter Errors
// ============================================================================

/// Closed failure classification every adapter must apply before returning
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Timeout, 5xx, rate limit — worth retrying on the same backend
    Transient,
    /// Auth failure, malformed request — retrying the same backend is useless
    Permanent,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// A classified adapter failure
#[derive(Clone, Debug, thiserror::Error)]
#[error("{kind} provider error: {message}")]
pub struct ProviderError {
    /// Retry classification
    pub kind: ErrorKind,
    /// Human-readable failure description
    pub message: String,
    /// Tokens billed before the failure, if the provider charged for the call
    pub usage: Option<Usage>,
}

impl ProviderError {
    /// A retryable failure (timeout, 5xx, rate limit)
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
            usage: None,
        }
    }

    /// A non-retryable failure (auth, malformed request)
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
            usage: None,
        }
    }

    /// Attach billed usage to a failure
    #[must_use]
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

// ============================================================================
// Provider Adapter
// ============================================================================

/// Provider adapter trait
///
/// Implement this trait (outside this crate) to connect one provider's API.
/// One implementation serves every backend of that provider; the registry's
/// `provider_id` tag selects which adapter handles a given backend.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider tag this adapter serves (matches `CapabilityRecord::provider_id`)
    fn provider_id(&self) -> &str;

    /// Execute one normalized call against `request.backend_id`.
    ///
    /// Must classify failures into [`ErrorKind`] and observe `cancel`:
    /// once the token fires, stop the call and return without billing
    /// further usage.
    async fn invoke(
        &self,
        request: &InvokeRequest,
        cancel: &CancellationToken,
    ) -> Result<CallResult, ProviderError>;
}

/// Adapter lookup table keyed by provider id
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty adapter registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its provider id; replaces any previous one
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters
            .insert(adapter.provider_id().to_string(), adapter);
    }

    /// Look up the adapter for a provider
    #[must_use]
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider_id).cloned()
    }

    /// Number of registered adapters
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no adapters are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("providers", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// Function Registry
// ============================================================================

/// A callable exposed to adapters for function-calling pass-through
pub type FunctionHandler = dyn Fn(Value) -> Value + Send + Sync;

/// Named functions adapters may surface to backends that support
/// function calling.
///
/// The orchestrator owns one registry and attaches it to every
/// [`InvokeRequest`]; adapters advertise the names to the backend and call
/// [`FunctionRegistry::call`] when the model requests an invocation.
#[derive(Default)]
pub struct FunctionRegistry {
    handlers: RwLock<HashMap<String, Arc<FunctionHandler>>>,
}

impl FunctionRegistry {
    /// Create an empty function registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under `name`; replaces any previous handler
    pub fn register(&self, name: impl Into<String>, handler: Arc<FunctionHandler>) {
        self.handlers.write().insert(name.into(), handler);
    }

    /// Remove a function; returns whether it existed
    pub fn unregister(&self, name: &str) -> bool {
        self.handlers.write().remove(name).is_some()
    }

    /// Names of all registered functions
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Invoke a registered function with a JSON argument payload
    ///
    /// Returns `None` if no function is registered under `name`.
    #[must_use]
    pub fn call(&self, name: &str, args: Value) -> Option<Value> {
        let handler = self.handlers.read().get(name).cloned()?;
        Some(handler(args))
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invoke_options_builder() {
        let options = InvokeOptions::default()
            .with_timeout(Duration::from_secs(5))
            .with_temperature(1.7)
            .with_max_tokens(256);

        assert_eq!(options.timeout, Duration::from_secs(5));
        assert!((options.temperature - 1.0).abs() < f32::EPSILON); // clamped
        assert_eq!(options.max_tokens, Some(256));
    }

    #[test]
    fn test_provider_error_classification() {
        let transient = ProviderError::transient("rate limited");
        assert_eq!(transient.kind, ErrorKind::Transient);

        let permanent = ProviderError::permanent("bad api key").with_usage(Usage::new(12, 0));
        assert_eq!(permanent.kind, ErrorKind::Permanent);
        assert_eq!(permanent.usage, Some(Usage::new(12, 0)));
    }

    #[test]
    fn test_abstention_entry_is_not_a_response() {
        let entry = CallResult::abstention("gpt-x", ErrorKind::Transient);
        assert!(!entry.is_response());
        assert_eq!(entry.usage.total(), 0);
    }

    #[test]
    fn test_function_registry_round_trip() {
        let registry = FunctionRegistry::new();
        registry.register(
            "add",
            Arc::new(|args: Value| {
                let a = args["a"].as_i64().unwrap_or(0);
                let b = args["b"].as_i64().unwrap_or(0);
                json!(a + b)
            }),
        );

        assert_eq!(registry.names(), vec!["add".to_string()]);
        assert_eq!(registry.call("add", json!({"a": 2, "b": 3})), Some(json!(5)));
        assert_eq!(registry.call("missing", json!({})), None);

        assert!(registry.unregister("add"));
        assert!(!registry.unregister("add"));
    }
}

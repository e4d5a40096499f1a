//! Capability Registry
//!
//! Loads and validates the static catalog of backend capabilities. The
//! catalog is a TOML file (default: `~/.config/switchboard/catalog.toml`)
//! declaring providers and backend capability records.
//!
//! # Snapshot Semantics
//!
//! A load produces an immutable [`RegistrySnapshot`] behind an `Arc`. Every
//! routing operation reads one snapshot for its whole lifetime, so no
//! locking is needed on the read path. [`CapabilityRegistry::reload`] builds
//! a fresh snapshot from the source and swaps it atomically; in-flight
//! operations keep the snapshot they started with.
//!
//! # Validation
//!
//! The registry fails closed: any record with an out-of-range score, a
//! non-positive context window, a negative cost, or an unknown provider
//! reference aborts the whole load with a
//! [`OrchestratorError::Configuration`] naming the field and record id.
//! There is never a partially loaded registry.
//!
//! # Credentials
//!
//! Each provider may declare a credential environment variable. Absence of
//! the variable disables that provider's records in the snapshot (they stay
//! visible but are skipped by candidate selection); it never fails the load.
//!
//! # Example Catalog
//!
//! ```toml
//! [[providers]]
//! id = "anthropic"
//! display_name = "Anthropic"
//! credential_env = "ANTHROPIC_API_KEY"
//!
//! [[backends]]
//! id = "claude-sonnet"
//! display_name = "Claude Sonnet"
//! provider_id = "anthropic"
//! context_window = 200000
//! input_cost_per_mtok = 3.0
//! output_cost_per_mtok = 15.0
//! reasoning_score = 88
//! coding_score = 90
//! speed_rating = 7
//! supports_vision = true
//! supports_function_calling = true
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::OrchestratorError;

/// Reasoning score at or above which a backend counts as reasoning-capable
pub const REASONING_THRESHOLD: u8 = 85;

/// Coding score at or above which a backend counts as code-specialized
pub const CODE_SPECIALIZED_THRESHOLD: u8 = 85;

// ============================================================================
// Capability Record
// ============================================================================

/// One backend's static capability profile
///
/// Constructed once at load time and immutable thereafter; a reload replaces
/// the whole snapshot rather than mutating records in place.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CapabilityRecord {
    /// Registry-unique backend id
    pub id: String,
    /// Human-readable name
    pub display_name: String,
    /// Provider this backend belongs to (selects the adapter)
    pub provider_id: String,
    /// Maximum context window in tokens
    pub context_window: u32,
    /// Input price in USD per million tokens
    pub input_cost_per_mtok: f64,
    /// Output price in USD per million tokens
    pub output_cost_per_mtok: f64,
    /// Reasoning capability, 0-100
    pub reasoning_score: u8,
    /// Coding capability, 0-100
    pub coding_score: u8,
    /// Relative speed, 0-10
    pub speed_rating: u8,
    /// Whether the backend accepts image input
    #[serde(default)]
    pub supports_vision: bool,
    /// Whether the backend supports function calling
    #[serde(default)]
    pub supports_function_calling: bool,
}

impl CapabilityRecord {
    /// Single comparable cost figure assuming a 3:1 input:output token ratio
    #[must_use]
    pub fn blended_cost(&self) -> f64 {
        (3.0 * self.input_cost_per_mtok + self.output_cost_per_mtok) / 4.0
    }

    /// Whether this backend counts as reasoning-capable
    #[must_use]
    pub fn supports_reasoning(&self) -> bool {
        self.reasoning_score >= REASONING_THRESHOLD
    }

    /// Whether this backend counts as code-specialized
    #[must_use]
    pub fn code_specialized(&self) -> bool {
        self.coding_score >= CODE_SPECIALIZED_THRESHOLD
    }

    /// Validate field ranges, naming the offending field on failure
    fn validate(&self) -> Result<(), OrchestratorError> {
        if self.id.is_empty() {
            return Err(OrchestratorError::configuration(
                "<unnamed>",
                "id",
                "must not be empty",
            ));
        }
        if self.context_window == 0 {
            return Err(OrchestratorError::configuration(
                &self.id,
                "context_window",
                "must be greater than zero",
            ));
        }
        if self.input_cost_per_mtok < 0.0 {
            return Err(OrchestratorError::configuration(
                &self.id,
                "input_cost_per_mtok",
                "must not be negative",
            ));
        }
        if self.output_cost_per_mtok < 0.0 {
            return Err(OrchestratorError::configuration(
                &self.id,
                "output_cost_per_mtok",
                "must not be negative",
            ));
        }
        if self.reasoning_score > 100 {
            return Err(OrchestratorError::configuration(
                &self.id,
                "reasoning_score",
                "must be within 0..=100",
            ));
        }
        if self.coding_score > 100 {
            return Err(OrchestratorError::configuration(
                &self.id,
                "coding_score",
                "must be within 0..=100",
            ));
        }
        if self.speed_rating > 10 {
            return Err(OrchestratorError::configuration(
                &self.id,
                "speed_rating",
                "must be within 0..=10",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Providers
// ============================================================================

/// Provider declaration from the catalog
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ProviderSpec {
    /// Provider id referenced by capability records and adapters
    pub id: String,
    /// Human-readable name
    pub display_name: String,
    /// Environment variable holding this provider's credentials.
    /// `None` means the provider needs no credentials (e.g. local models).
    #[serde(default)]
    pub credential_env: Option<String>,
}

/// A provider plus its resolved enablement state
#[derive(Clone, Debug)]
pub struct ProviderEntry {
    /// Catalog declaration
    pub spec: ProviderSpec,
    /// Whether credentials were present at load time
    pub enabled: bool,
}

// ============================================================================
// Snapshot
// ============================================================================

/// Raw catalog file shape
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    providers: Vec<ProviderSpec>,
    #[serde(default)]
    backends: Vec<CapabilityRecord>,
}

/// Immutable, validated view of the catalog
///
/// Safe for concurrent access without locking: nothing in a snapshot is ever
/// mutated after construction.
#[derive(Debug)]
pub struct RegistrySnapshot {
    records: Vec<Arc<CapabilityRecord>>,
    by_id: HashMap<String, usize>,
    providers: HashMap<String, ProviderEntry>,
}

impl RegistrySnapshot {
    /// Snapshot with no providers and no records
    fn empty() -> Self {
        Self {
            records: Vec::new(),
            by_id: HashMap::new(),
            providers: HashMap::new(),
        }
    }

    /// Build and validate a snapshot from catalog parts.
    ///
    /// `has_credential` reports whether a credential variable is present;
    /// production paths use the process environment, tests inject a closure.
    fn build(
        providers: Vec<ProviderSpec>,
        records: Vec<CapabilityRecord>,
        has_credential: impl Fn(&str) -> bool,
    ) -> Result<Self, OrchestratorError> {
        let mut provider_map = HashMap::new();
        for spec in providers {
            let enabled = match &spec.credential_env {
                Some(var) => {
                    let present = has_credential(var);
                    if !present {
                        tracing::warn!(
                            provider = %spec.id,
                            env_var = %var,
                            "provider disabled: credential variable not set"
                        );
                    }
                    present
                }
                None => true,
            };
            provider_map.insert(spec.id.clone(), ProviderEntry { spec, enabled });
        }

        let mut by_id = HashMap::new();
        let mut validated = Vec::with_capacity(records.len());
        for record in records {
            record.validate()?;
            if !provider_map.contains_key(&record.provider_id) {
                return Err(OrchestratorError::configuration(
                    &record.id,
                    "provider_id",
                    format!("references unknown provider `{}`", record.provider_id),
                ));
            }
            if by_id.contains_key(&record.id) {
                return Err(OrchestratorError::configuration(
                    &record.id,
                    "id",
                    "duplicate backend id",
                ));
            }
            by_id.insert(record.id.clone(), validated.len());
            validated.push(Arc::new(record));
        }

        Ok(Self {
            records: validated,
            by_id,
            providers: provider_map,
        })
    }

    /// Look up a record by backend id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<CapabilityRecord>> {
        self.by_id.get(id).map(|&idx| self.records[idx].clone())
    }

    /// All records, in catalog order
    #[must_use]
    pub fn all(&self) -> &[Arc<CapabilityRecord>] {
        &self.records
    }

    /// All records belonging to a provider
    #[must_use]
    pub fn by_provider(&self, provider_id: &str) -> Vec<Arc<CapabilityRecord>> {
        self.records
            .iter()
            .filter(|r| r.provider_id == provider_id)
            .cloned()
            .collect()
    }

    /// Provider entry by id
    #[must_use]
    pub fn provider(&self, provider_id: &str) -> Option<&ProviderEntry> {
        self.providers.get(provider_id)
    }

    /// Whether a provider exists and has credentials
    #[must_use]
    pub fn provider_enabled(&self, provider_id: &str) -> bool {
        self.providers.get(provider_id).is_some_and(|p| p.enabled)
    }

    /// Whether a record's provider is enabled (routable)
    #[must_use]
    pub fn record_routable(&self, record: &CapabilityRecord) -> bool {
        self.provider_enabled(&record.provider_id)
    }

    /// Summary counts for operator surfaces
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let disabled_providers = self.providers.values().filter(|p| !p.enabled).count();
        let disabled_backends = self
            .records
            .iter()
            .filter(|r| !self.provider_enabled(&r.provider_id))
            .count();
        RegistryStats {
            total_backends: self.records.len(),
            total_providers: self.providers.len(),
            disabled_providers,
            disabled_backends,
        }
    }
}

/// Aggregate registry counts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of capability records
    pub total_backends: usize,
    /// Number of declared providers
    pub total_providers: usize,
    /// Providers disabled for missing credentials
    pub disabled_providers: usize,
    /// Records whose provider is disabled
    pub disabled_backends: usize,
}

// ============================================================================
// Registry
// ============================================================================

/// Where the catalog came from, for [`CapabilityRegistry::reload`]
#[derive(Clone, Debug)]
enum CatalogSource {
    /// External TOML file
    File(PathBuf),
    /// Built-in default set (no file found)
    Builtin,
}

/// The capability registry: current snapshot plus its source
pub struct CapabilityRegistry {
    snapshot: RwLock<Arc<RegistrySnapshot>>,
    source: CatalogSource,
}

impl CapabilityRegistry {
    /// Load from an explicit catalog file, failing closed on any invalid record
    pub fn from_catalog_path(path: impl AsRef<Path>) -> Result<Self, OrchestratorError> {
        let path = path.as_ref();
        let snapshot = Self::load_file(path)?;
        Ok(Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            source: CatalogSource::File(path.to_path_buf()),
        })
    }

    /// Load from the XDG default location
    /// (`~/.config/switchboard/catalog.toml`), falling back to the built-in
    /// default set when no file exists
    pub fn from_default_location() -> Result<Self, OrchestratorError> {
        match Self::default_catalog_path() {
            Some(path) if path.exists() => Self::from_catalog_path(path),
            _ => {
                tracing::info!("no capability catalog found, using built-in defaults");
                Ok(Self::builtin())
            }
        }
    }

    /// Build from in-memory catalog parts (programmatic construction, tests)
    pub fn from_parts(
        providers: Vec<ProviderSpec>,
        records: Vec<CapabilityRecord>,
    ) -> Result<Self, OrchestratorError> {
        let snapshot =
            RegistrySnapshot::build(providers, records, |var| std::env::var(var).is_ok())?;
        Ok(Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            source: CatalogSource::Builtin,
        })
    }

    /// Registry with the built-in default set
    ///
    /// The defaults keep the orchestrator usable out of the box; providers
    /// still require their credential variables to be routable.
    #[must_use]
    pub fn builtin() -> Self {
        let (providers, records) = builtin_catalog();
        let snapshot = RegistrySnapshot::build(providers, records, |var| std::env::var(var).is_ok())
            .unwrap_or_else(|_| RegistrySnapshot::empty());
        Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            source: CatalogSource::Builtin,
        }
    }

    /// Default XDG catalog path, if a config directory can be resolved
    #[must_use]
    pub fn default_catalog_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("switchboard").join("catalog.toml"))
    }

    fn load_file(path: &Path) -> Result<RegistrySnapshot, OrchestratorError> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            OrchestratorError::CatalogRead {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let catalog: CatalogFile = toml::from_str(&text)?;
        RegistrySnapshot::build(catalog.providers, catalog.backends, |var| {
            std::env::var(var).is_ok()
        })
    }

    /// Current snapshot; cheap to clone, safe to hold across awaits
    #[must_use]
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.read().clone()
    }

    /// Rebuild the snapshot from the original source and swap it atomically.
    ///
    /// On validation failure the previous snapshot stays in place untouched.
    pub fn reload(&self) -> Result<(), OrchestratorError> {
        let next = match &self.source {
            CatalogSource::File(path) => Self::load_file(path)?,
            CatalogSource::Builtin => {
                let (providers, records) = builtin_catalog();
                RegistrySnapshot::build(providers, records, |var| std::env::var(var).is_ok())?
            }
        };
        *self.snapshot.write() = Arc::new(next);
        tracing::info!("capability registry reloaded");
        Ok(())
    }

    /// Look up a record by backend id in the current snapshot
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<CapabilityRecord>> {
        self.snapshot().get(id)
    }

    /// All records in the current snapshot
    #[must_use]
    pub fn all(&self) -> Vec<Arc<CapabilityRecord>> {
        self.snapshot().all().to_vec()
    }

    /// Records of one provider in the current snapshot
    #[must_use]
    pub fn by_provider(&self, provider_id: &str) -> Vec<Arc<CapabilityRecord>> {
        self.snapshot().by_provider(provider_id)
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("source", &self.source)
            .field("stats", &self.snapshot().stats())
            .finish()
    }
}

// ============================================================================
// Built-in Defaults
// ============================================================================

fn record(
    id: &str,
    display_name: &str,
    provider_id: &str,
    context_window: u32,
    input_cost: f64,
    output_cost: f64,
    reasoning: u8,
    coding: u8,
    speed: u8,
    vision: bool,
    functions: bool,
) -> CapabilityRecord {
    CapabilityRecord {
        id: id.to_string(),
        display_name: display_name.to_string(),
        provider_id: provider_id.to_string(),
        context_window,
        input_cost_per_mtok: input_cost,
        output_cost_per_mtok: output_cost,
        reasoning_score: reasoning,
        coding_score: coding,
        speed_rating: speed,
        supports_vision: vision,
        supports_function_calling: functions,
    }
}

/// Minimal default catalog used when no file is present
fn builtin_catalog() -> (Vec<ProviderSpec>, Vec<CapabilityRecord>) {
    let providers = vec![
        ProviderSpec {
            id: "anthropic".to_string(),
            display_name: "Anthropic".to_string(),
            credential_env: Some("ANTHROPIC_API_KEY".to_string()),
        },
        ProviderSpec {
            id: "openai".to_string(),
            display_name: "OpenAI".to_string(),
            credential_env: Some("OPENAI_API_KEY".to_string()),
        },
        ProviderSpec {
            id: "google".to_string(),
            display_name: "Google".to_string(),
            credential_env: Some("GEMINI_API_KEY".to_string()),
        },
    ];

    let records = vec![
        record(
            "claude-opus",
            "Claude Opus",
            "anthropic",
            200_000,
            15.0,
            75.0,
            96,
            94,
            4,
            true,
            true,
        ),
        record(
            "claude-sonnet",
            "Claude Sonnet",
            "anthropic",
            200_000,
            3.0,
            15.0,
            90,
            92,
            7,
            true,
            true,
        ),
        record(
            "gpt-4o",
            "GPT-4o",
            "openai",
            128_000,
            2.5,
            10.0,
            86,
            85,
            7,
            true,
            true,
        ),
        record(
            "gpt-4o-mini",
            "GPT-4o Mini",
            "openai",
            128_000,
            0.15,
            0.6,
            72,
            74,
            9,
            true,
            true,
        ),
        record(
            "gemini-pro",
            "Gemini Pro",
            "google",
            1_000_000,
            1.25,
            10.0,
            88,
            84,
            6,
            true,
            true,
        ),
        record(
            "gemini-flash",
            "Gemini Flash",
            "google",
            1_000_000,
            0.15,
            0.6,
            74,
            72,
            10,
            true,
            true,
        ),
    ];

    (providers, records)
}

// ============================================================================
// Tests
// ============================================================================

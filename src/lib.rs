//! Switchboard - Model Orchestration Core
//!
//! Routes a unit of work (a natural-language task request) to the best
//! available LLM backend out of a heterogeneous catalog, with graceful
//! degradation when a backend is slow, unavailable, or misconfigured, and
//! with multi-backend consensus for answers that need reconciliation.
//!
//! # Architecture
//!
//! ```text
//!                         ┌──────────────────────┐
//!            request ───> │    Orchestrator      │ ───> CallResult /
//!                         │      (facade)        │      ConsensusOutcome
//!                         └──────────┬───────────┘
//!                                    │
//!        ┌─────────────┬─────────────┼─────────────┬──────────────┐
//!        v             v             v             v              v
//! ┌────────────┐ ┌───────────┐ ┌───────────┐ ┌───────────┐ ┌───────────┐
//! │    Task    │ │ Candidate │ │ Fallback  │ │ Consensus │ │   Usage   │
//! │  Analyzer  │ │  Scorer   │ │Coordinator│ │  Engine   │ │  Ledger   │
//! └─────┬──────┘ └─────┬─────┘ └─────┬─────┘ └─────┬─────┘ └───────────┘
//!       │              │             │             │
//!       v              v             v             v
//! ┌───────────┐ ┌────────────┐ ┌───────────┐ ┌────────────────┐
//! │ Secondary │ │ Capability │ │  Health   │ │   Provider     │
//! │Classifier │ │  Registry  │ │  Tracker  │ │   Adapters     │
//! └───────────┘ └────────────┘ └───────────┘ └────────────────┘
//! ```
//!
//! # Data Flow
//!
//! `route`: prompt → Task Analyzer → Candidate Scorer (reads the immutable
//! registry snapshot) → ranked list → Fallback Coordinator (invokes
//! adapters, updates health) → response → Usage Ledger.
//!
//! `route_with_consensus`: prompt → Task Analyzer → top-K candidates →
//! K concurrent single-backend calls under one deadline → reconciliation
//! (voting, best-of-N, or debate) → outcome → Usage Ledger.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use switchboard::{Orchestrator, RouteOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), switchboard::OrchestratorError> {
//!     let orchestrator = Orchestrator::builder()
//!         .adapter(Arc::new(my_adapters::Anthropic::from_env()))
//!         .adapter(Arc::new(my_adapters::OpenAi::from_env()))
//!         .build()?;
//!
//!     let result = orchestrator
//!         .route("Write a binary search function in Python", RouteOptions::new())
//!         .await?;
//!     println!("{} answered: {}", result.backend_id, result.content);
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`registry`]: static capability catalog, validated and snapshotted
//! - [`analyzer`]: two-stage task classification with a bounded cache
//! - [`scoring`]: hard-minimum filtering and weighted candidate ranking
//! - [`provider`]: the externally-implemented adapter contract
//! - [`routing`]: fallback waterfall, retries, per-backend circuit breaking
//! - [`consensus`]: parallel panel fan-out and answer reconciliation
//! - [`ledger`]: append-only usage and cost accounting
//! - [`orchestrator`]: the facade tying everything together
//!
//! # Concurrency Model
//!
//! Registry snapshots are immutable and shared without locking. Per-backend
//! health entries are the only hot mutable state, each behind its own lock.
//! `route` is strictly sequential internally; `route_with_consensus` fans
//! out under a single cancellation scope with cooperative cancellation
//! propagated to adapters.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod analyzer;
pub mod config;
pub mod consensus;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod routing;
pub mod scoring;

pub use analyzer::{
    Classification, Priority, SecondaryClassifier, TaskAnalyzer, TaskCategory, TaskRequirements,
};
pub use config::{ForcedRoutePolicy, OrchestratorConfig};
pub use consensus::{ConsensusConfig, ConsensusOutcome, ConsensusStrategy};
pub use error::OrchestratorError;
pub use ledger::{UsageFilter, UsageLedger, UsageRecord, UsageReport};
pub use provider::{
    CallResult, ChatMessage, ErrorKind, InvokeOptions, InvokeRequest, ProviderAdapter,
    ProviderError, Role, Usage,
};
pub use registry::{CapabilityRecord, CapabilityRegistry, ProviderSpec, RegistrySnapshot};
pub use routing::{
    AttemptOutcome, AttemptRecord, FallbackCoordinator, HealthConfig, HealthState, HealthTracker,
    RetryConfig,
};
pub use scoring::{CandidateScorer, ScoredCandidate};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, RouteOptions};

//! Orchestrator Error Taxonomy
//!
//! Every failure the orchestrator can surface to a caller is a variant of
//! [`OrchestratorError`]. Adapter-level failures
//! ([`ProviderError`](crate::provider::ProviderError)) are handled inside the
//! fallback coordinator and never leak past it, except folded into the
//! attempt trail of [`OrchestratorError::ProviderUnavailable`].
//!
//! The two terminal request errors (`ProviderUnavailable`,
//! `ConsensusQuorum`) carry enough structured detail for a caller to decide
//! whether to retry, widen the panel, or alert a human.

use std::path::PathBuf;

use thiserror::Error;

use crate::analyzer::TaskCategory;
use crate::routing::AttemptRecord;

/// Errors surfaced by the orchestrator
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The capability catalog is invalid; the registry refuses to load at all
    #[error("invalid capability record `{record}`: field `{field}` {reason}")]
    Configuration {
        /// Id of the offending record (or `catalog` for file-level problems)
        record: String,
        /// Name of the offending field
        field: &'static str,
        /// What is wrong with the value
        reason: String,
    },

    /// The catalog file exists but could not be read
    #[error("failed to read capability catalog at {}: {source}", path.display())]
    CatalogRead {
        /// Path that was attempted
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The catalog file is not valid TOML
    #[error("failed to parse capability catalog: {0}")]
    CatalogParse(#[from] toml::de::Error),

    /// A provider is present in the catalog but its credentials are missing;
    /// the provider is disabled, not fatal to the process
    #[error("provider `{provider}` is disabled: credential variable `{env_var}` is not set")]
    Credential {
        /// Provider id
        provider: String,
        /// Environment variable that was expected
        env_var: String,
    },

    /// A forced backend id does not exist in the registry snapshot
    #[error("unknown backend `{0}`")]
    UnknownBackend(String),

    /// No registry record survived hard-minimum filtering for this category
    #[error("no eligible backends for {0} requirements")]
    NoEligibleCandidates(TaskCategory),

    /// The fallback waterfall exhausted every candidate without a success
    #[error("all candidate backends failed ({} attempted)", attempts.len())]
    ProviderUnavailable {
        /// Full attempt history, in attempt order
        attempts: Vec<AttemptRecord>,
    },

    /// Too few panel members responded to reconcile a consensus answer
    #[error(
        "consensus quorum not reached: {achieved} of {required} required responses \
         ({abstentions} abstained)"
    )]
    ConsensusQuorum {
        /// Number of panel seats that produced a response
        achieved: usize,
        /// Quorum requirement (`ceil(panel_size / 2)`)
        required: usize,
        /// Seats that failed, timed out, or were cancelled
        abstentions: usize,
    },
}

impl OrchestratorError {
    /// Convenience constructor for catalog validation failures
    pub(crate) fn configuration(record: &str, field: &'static str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            record: record.to_string(),
            field,
            reason: reason.into(),
        }
    }
}

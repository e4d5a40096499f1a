//! Orchestrator Configuration
//!
//! Programmatic tunables for routing behavior. The capability catalog has
//! its own file format (see [`crate::registry`]); everything here is wired
//! in by the embedding application through
//! [`OrchestratorBuilder`](crate::orchestrator::OrchestratorBuilder).

use std::time::Duration;

use crate::consensus::ConsensusConfig;
use crate::routing::{HealthConfig, RetryConfig};

/// What happens when a caller-forced backend fails
///
/// The default is fail-hard: an explicit override means explicit
/// responsibility, so the failure surfaces instead of silently routing
/// elsewhere. `FallBack` opts into the normal waterfall after the forced
/// backend fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ForcedRoutePolicy {
    /// Fail the request if the forced backend cannot serve it
    #[default]
    FailHard,
    /// Continue down the ranked candidate list after the forced backend
    FallBack,
}

/// Top-level orchestrator tunables
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Retry behavior for transient failures
    pub retry: RetryConfig,
    /// Circuit-breaker thresholds
    pub health: HealthConfig,
    /// Consensus panel timeouts and judge selection
    pub consensus: ConsensusConfig,
    /// Forced-backend failure policy
    pub forced_route: ForcedRoutePolicy,
    /// Per-call timeout for single-path routing
    pub call_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            health: HealthConfig::default(),
            consensus: ConsensusConfig::default(),
            forced_route: ForcedRoutePolicy::default(),
            call_timeout: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.forced_route, ForcedRoutePolicy::FailHard);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.health.failure_threshold, 5);
        assert_eq!(config.health.cooldown, Duration::from_secs(300));
    }
}

//! End-to-end orchestrator scenarios against the scripted mock adapter:
//! classification-driven selection, waterfall ordering, circuit breaking,
//! forced-backend policies, consensus quorum, and ledger accounting.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{mock_record, mock_registry, MockAdapter};
use switchboard::{
    ConsensusStrategy, ForcedRoutePolicy, HealthConfig, Orchestrator, OrchestratorConfig,
    OrchestratorError, ProviderError, RetryConfig, RouteOptions, UsageFilter,
};

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        retry: RetryConfig {
            max_retries: 2,
            backoff_base: Duration::from_millis(1),
        },
        ..OrchestratorConfig::default()
    }
}

fn orchestrator_with(
    adapter: Arc<MockAdapter>,
    records: Vec<switchboard::CapabilityRecord>,
    config: OrchestratorConfig,
) -> Orchestrator {
    common::init_tracing();
    Orchestrator::builder()
        .registry(mock_registry(records))
        .adapter(adapter)
        .config(config)
        .build()
        .expect("orchestrator builds")
}

// ============================================================================
// Single-path routing
// ============================================================================

#[tokio::test]
async fn code_prompt_routes_to_best_coding_backend() {
    let adapter = Arc::new(MockAdapter::new());
    let orchestrator = orchestrator_with(
        adapter.clone(),
        vec![
            mock_record("generalist", 75, 70, 8, 1.0),
            mock_record("coder", 80, 92, 6, 2.0),
        ],
        fast_config(),
    );

    let result = orchestrator
        .route(
            "Write a binary search function in Python",
            RouteOptions::new(),
        )
        .await
        .unwrap();

    // The code-specialized backend outranks the generalist for this prompt.
    assert_eq!(result.backend_id, "coder");
    assert_eq!(adapter.calls(), vec!["coder"]);
}

#[tokio::test]
async fn degraded_top_candidate_is_passed_over() {
    let adapter = Arc::new(MockAdapter::new());
    let orchestrator = orchestrator_with(
        adapter.clone(),
        vec![
            mock_record("generalist", 75, 70, 8, 1.0),
            mock_record("coder", 80, 92, 6, 2.0),
        ],
        fast_config(),
    );

    // Five failures inside the window trip the default breaker.
    for _ in 0..5 {
        orchestrator.health().record_failure("coder");
    }

    let result = orchestrator
        .route(
            "Write a binary search function in Python",
            RouteOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.backend_id, "generalist");
    // The degraded backend was skipped without being called.
    assert_eq!(adapter.calls(), vec!["generalist"]);
}

#[tokio::test]
async fn waterfall_attempts_in_rank_order_with_retries() {
    let adapter = Arc::new(MockAdapter::new());
    adapter.always_transient("alpha");
    adapter.always_transient("beta");
    let orchestrator = orchestrator_with(
        adapter.clone(),
        vec![
            mock_record("alpha", 90, 95, 8, 1.0),
            mock_record("beta", 85, 88, 7, 1.0),
            mock_record("gamma", 70, 75, 6, 1.0),
        ],
        fast_config(),
    );

    let result = orchestrator
        .route("Implement a parser", RouteOptions::new())
        .await
        .unwrap();

    assert_eq!(result.backend_id, "gamma");
    // alpha first with its two retries, then beta, then gamma.
    assert_eq!(
        adapter.calls(),
        vec!["alpha", "alpha", "alpha", "beta", "beta", "beta", "gamma"]
    );
}

#[tokio::test]
async fn exhausted_waterfall_carries_attempt_trail() {
    let adapter = Arc::new(MockAdapter::new());
    adapter.script(
        "alpha",
        vec![Err(ProviderError::permanent("invalid api key"))],
    );
    adapter.script(
        "beta",
        vec![Err(ProviderError::permanent("invalid api key"))],
    );
    let orchestrator = orchestrator_with(
        adapter,
        vec![
            mock_record("alpha", 90, 95, 8, 1.0),
            mock_record("beta", 85, 88, 7, 1.0),
        ],
        fast_config(),
    );

    let error = orchestrator
        .route("Implement a parser", RouteOptions::new())
        .await
        .unwrap_err();

    match error {
        OrchestratorError::ProviderUnavailable { attempts } => {
            let ids: Vec<&str> = attempts.iter().map(|a| a.backend_id.as_str()).collect();
            assert_eq!(ids, vec!["alpha", "beta"]);
        }
        other => panic!("expected ProviderUnavailable, got {other:?}"),
    }
}

// ============================================================================
// Forced-backend policies
// ============================================================================

#[tokio::test]
async fn forced_backend_fails_hard_by_default() {
    let adapter = Arc::new(MockAdapter::new());
    adapter.script("flaky", vec![Err(ProviderError::permanent("auth"))]);
    let orchestrator = orchestrator_with(
        adapter.clone(),
        vec![
            mock_record("flaky", 80, 80, 5, 1.0),
            mock_record("steady", 80, 80, 5, 1.0),
        ],
        fast_config(),
    );

    let error = orchestrator
        .route(
            "hello",
            RouteOptions::new().with_forced_backend("flaky"),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        OrchestratorError::ProviderUnavailable { .. }
    ));
    // No fallback happened: the healthy backend was never consulted.
    assert_eq!(adapter.calls(), vec!["flaky"]);
}

#[tokio::test]
async fn forced_backend_falls_back_when_policy_allows() {
    let adapter = Arc::new(MockAdapter::new());
    adapter.script("flaky", vec![Err(ProviderError::permanent("auth"))]);
    let config = OrchestratorConfig {
        forced_route: ForcedRoutePolicy::FallBack,
        ..fast_config()
    };
    let orchestrator = orchestrator_with(
        adapter.clone(),
        vec![
            mock_record("flaky", 80, 80, 5, 1.0),
            mock_record("steady", 80, 80, 5, 1.0),
        ],
        config,
    );

    let result = orchestrator
        .route(
            "hello",
            RouteOptions::new().with_forced_backend("flaky"),
        )
        .await
        .unwrap();

    assert_eq!(result.backend_id, "steady");
    assert_eq!(adapter.calls(), vec!["flaky", "steady"]);
}

#[tokio::test]
async fn forced_category_skips_classification() {
    let adapter = Arc::new(MockAdapter::new());
    // "seer" only wins under Vision requirements.
    let mut seer = mock_record("seer", 85, 60, 5, 1.0);
    seer.supports_vision = true;
    let orchestrator = orchestrator_with(
        adapter,
        vec![seer, mock_record("coder", 70, 95, 8, 1.0)],
        fast_config(),
    );

    let result = orchestrator
        .route(
            "Describe what you see",
            RouteOptions::new().with_forced_category(switchboard::TaskCategory::Vision),
        )
        .await
        .unwrap();

    assert_eq!(result.backend_id, "seer");
}

// ============================================================================
// Circuit breaking end to end
// ============================================================================

#[tokio::test]
async fn repeated_route_failures_trip_the_breaker_then_recover() {
    let adapter = Arc::new(MockAdapter::new());
    adapter.always_transient("alpha");
    let config = OrchestratorConfig {
        health: HealthConfig {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            cooldown: Duration::from_millis(80),
        },
        ..fast_config()
    };
    let orchestrator = orchestrator_with(
        adapter.clone(),
        vec![
            mock_record("alpha", 90, 95, 8, 1.0),
            mock_record("omega", 70, 75, 6, 1.0),
        ],
        config,
    );

    // First route: alpha burns 3 attempts (1 + 2 retries), omega serves.
    let first = orchestrator
        .route("Implement a queue", RouteOptions::new())
        .await
        .unwrap();
    assert_eq!(first.backend_id, "omega");

    // Second route: alpha fails twice more, crossing the 5-failure
    // threshold mid-attempt; omega serves again.
    let second = orchestrator
        .route("Implement a stack", RouteOptions::new())
        .await
        .unwrap();
    assert_eq!(second.backend_id, "omega");
    assert_eq!(
        orchestrator.health().state("alpha"),
        switchboard::HealthState::Degraded
    );

    // While degraded, alpha is skipped without any call.
    let calls_before = adapter.calls().len();
    let third = orchestrator
        .route("Implement a deque", RouteOptions::new())
        .await
        .unwrap();
    assert_eq!(third.backend_id, "omega");
    assert_eq!(adapter.calls().len(), calls_before + 1);

    // After the cooldown the backend is eligible again (and now succeeds,
    // its failure script having drained is irrelevant - it is attempted).
    tokio::time::sleep(Duration::from_millis(120)).await;
    adapter.script("alpha", vec![Ok("recovered".to_string())]);
    let fourth = orchestrator
        .route("Implement a heap", RouteOptions::new())
        .await
        .unwrap();
    assert_eq!(fourth.backend_id, "alpha");
}

// ============================================================================
// Consensus
// ============================================================================

#[tokio::test]
async fn consensus_reaches_quorum_despite_failures() {
    let adapter = Arc::new(MockAdapter::new());
    adapter.script("a", vec![Ok("42".to_string())]);
    adapter.script("b", vec![Ok(" 42 ".to_string())]);
    adapter.script("c", vec![Ok("42".to_string())]);
    adapter.script("d", vec![Err(ProviderError::permanent("down"))]);
    adapter.script("e", vec![Err(ProviderError::permanent("down"))]);
    let orchestrator = orchestrator_with(
        adapter,
        vec![
            mock_record("a", 90, 90, 8, 1.0),
            mock_record("b", 88, 88, 8, 1.0),
            mock_record("c", 86, 86, 8, 1.0),
            mock_record("d", 84, 84, 8, 1.0),
            mock_record("e", 82, 82, 8, 1.0),
        ],
        fast_config(),
    );

    let outcome = orchestrator
        .route_with_consensus(
            "What is six times seven?",
            5,
            ConsensusStrategy::Voting,
            RouteOptions::new(),
        )
        .await
        .unwrap();

    // Quorum ceil(5/2)=3 met by the three responders; the two failed seats
    // abstain and agreement counts responders only.
    assert_eq!(outcome.winning_answer.as_deref(), Some("42"));
    assert_eq!(outcome.responders, 3);
    assert_eq!(outcome.abstentions, 2);
    assert!((outcome.agreement_score - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn consensus_below_quorum_raises() {
    let adapter = Arc::new(MockAdapter::new());
    adapter.script("a", vec![Err(ProviderError::permanent("down"))]);
    adapter.script("b", vec![Err(ProviderError::permanent("down"))]);
    adapter.script("c", vec![Ok("alone".to_string())]);
    let orchestrator = orchestrator_with(
        adapter,
        vec![
            mock_record("a", 90, 90, 8, 1.0),
            mock_record("b", 88, 88, 8, 1.0),
            mock_record("c", 86, 86, 8, 1.0),
        ],
        fast_config(),
    );

    let error = orchestrator
        .route_with_consensus(
            "What is six times seven?",
            3,
            ConsensusStrategy::Voting,
            RouteOptions::new(),
        )
        .await
        .unwrap_err();

    match error {
        OrchestratorError::ConsensusQuorum {
            achieved, required, ..
        } => {
            assert_eq!(achieved, 1);
            assert_eq!(required, 2);
        }
        other => panic!("expected quorum error, got {other:?}"),
    }
}

#[tokio::test]
async fn consensus_records_every_responder_in_ledger() {
    let adapter = Arc::new(MockAdapter::new());
    let orchestrator = orchestrator_with(
        adapter,
        vec![
            mock_record("a", 90, 90, 8, 1.0),
            mock_record("b", 88, 88, 8, 1.0),
            mock_record("c", 86, 86, 8, 1.0),
        ],
        fast_config(),
    );

    orchestrator
        .route_with_consensus(
            "Summarize the tradeoffs",
            3,
            ConsensusStrategy::Voting,
            RouteOptions::new().with_session("panel-session"),
        )
        .await
        .unwrap();

    let report = orchestrator.usage_report(&UsageFilter::all().session("panel-session"));
    assert_eq!(report.total_calls, 3);
    assert_eq!(report.by_backend.len(), 3);
}

// ============================================================================
// Ledger accounting
// ============================================================================

#[tokio::test]
async fn ledger_aggregates_match_per_record_sums() {
    let adapter = Arc::new(MockAdapter::new());
    let orchestrator = orchestrator_with(
        adapter,
        vec![mock_record("solo", 80, 80, 6, 2.0)],
        fast_config(),
    );

    for _ in 0..3 {
        orchestrator
            .route(
                "Implement a linked list",
                RouteOptions::new().with_session("s1"),
            )
            .await
            .unwrap();
    }
    orchestrator
        .route(
            "Implement a linked list",
            RouteOptions::new().with_session("s2"),
        )
        .await
        .unwrap();

    let session_filter = UsageFilter::all().session("s1");
    let report = orchestrator.usage_report(&session_filter);
    let manual_cost: f64 = orchestrator
        .ledger()
        .records(&session_filter)
        .iter()
        .map(|r| r.cost_estimate)
        .sum();

    assert_eq!(report.total_calls, 3);
    assert!((report.total_cost - manual_cost).abs() < 1e-12);

    // Every call used 100 input / 50 output tokens of the 2.0/8.0-per-MTok
    // backend: (100 * 2.0 + 50 * 8.0) / 1e6 each.
    let expected_per_call = (100.0 * 2.0 + 50.0 * 8.0) / 1_000_000.0;
    assert!((report.total_cost - 3.0 * expected_per_call).abs() < 1e-12);

    let everything = orchestrator.usage_report(&UsageFilter::all());
    assert_eq!(everything.total_calls, 4);
}

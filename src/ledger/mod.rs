//! Usage Ledger
//!
//! Append-only record of token usage, cost, and latency per completed call
//! (success or billed failure). Aggregation queries are pure reads over the
//! log; historical records are never mutated.
//!
//! The append path is a short critical section under a `parking_lot` mutex
//! and is called only after the response has already been determined, so
//! recording never slows the provider call itself and no record is lost
//! under concurrent consensus writers. Ordering between records from
//! concurrent participants is not guaranteed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::provider::Usage;
use crate::registry::CapabilityRecord;

// ============================================================================
// Records
// ============================================================================

/// One completed (or billed-failed) call
#[derive(Clone, Debug, PartialEq)]
pub struct UsageRecord {
    /// Backend that served (or billed) the call
    pub backend_id: String,
    /// Provider the backend belongs to
    pub provider_id: String,
    /// Caller-supplied session id, if any
    pub session_id: Option<String>,
    /// Tokens consumed from the prompt
    pub input_tokens: u64,
    /// Tokens generated
    pub output_tokens: u64,
    /// Estimated cost in USD
    pub cost_estimate: f64,
    /// Wall-clock latency in milliseconds
    pub latency_ms: u64,
    /// When the record was appended
    pub timestamp: DateTime<Utc>,
}

/// Estimate the USD cost of one call from a record's per-MTok pricing
#[must_use]
pub fn estimate_cost(record: &CapabilityRecord, usage: Usage) -> f64 {
    (usage.input_tokens as f64 / 1_000_000.0) * record.input_cost_per_mtok
        + (usage.output_tokens as f64 / 1_000_000.0) * record.output_cost_per_mtok
}

// ============================================================================
// Filters and Reports
// ============================================================================

/// Predicate for aggregation queries; unset fields match everything
#[derive(Clone, Debug, Default)]
pub struct UsageFilter {
    /// Restrict to one session
    pub session_id: Option<String>,
    /// Restrict to one backend
    pub backend_id: Option<String>,
    /// Restrict to one provider
    pub provider_id: Option<String>,
    /// Inclusive lower time bound
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper time bound
    pub until: Option<DateTime<Utc>>,
}

impl UsageFilter {
    /// Match everything
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to a session
    #[must_use]
    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Restrict to a backend
    #[must_use]
    pub fn backend(mut self, backend_id: impl Into<String>) -> Self {
        self.backend_id = Some(backend_id.into());
        self
    }

    /// Restrict to a provider
    #[must_use]
    pub fn provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    /// Restrict to a time window (`since` inclusive, `until` exclusive)
    #[must_use]
    pub fn window(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    fn matches(&self, record: &UsageRecord) -> bool {
        if let Some(session) = &self.session_id {
            if record.session_id.as_deref() != Some(session.as_str()) {
                return false;
            }
        }
        if let Some(backend) = &self.backend_id {
            if &record.backend_id != backend {
                return false;
            }
        }
        if let Some(provider) = &self.provider_id {
            if &record.provider_id != provider {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if record.timestamp >= until {
                return false;
            }
        }
        true
    }
}

/// Per-backend slice of a usage report
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BackendUsage {
    /// Calls attributed to the backend
    pub calls: u64,
    /// Input tokens
    pub input_tokens: u64,
    /// Output tokens
    pub output_tokens: u64,
    /// Estimated cost in USD
    pub cost: f64,
}

/// Aggregate over all records matching a filter
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UsageReport {
    /// Matching call count
    pub total_calls: u64,
    /// Total input tokens
    pub input_tokens: u64,
    /// Total output tokens
    pub output_tokens: u64,
    /// Total estimated cost in USD
    pub total_cost: f64,
    /// Mean latency across matching calls, in milliseconds
    pub avg_latency_ms: f64,
    /// Breakdown by backend id (sorted)
    pub by_backend: BTreeMap<String, BackendUsage>,
}

// ============================================================================
// Ledger
// ============================================================================

/// The append-only usage ledger
#[derive(Default)]
pub struct UsageLedger {
    records: Mutex<Vec<UsageRecord>>,
}

impl UsageLedger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record; safe under concurrent writers
    pub fn record(&self, record: UsageRecord) {
        tracing::debug!(
            backend = %record.backend_id,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            cost = record.cost_estimate,
            "usage recorded"
        );
        self.records.lock().push(record);
    }

    /// Number of records appended so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the ledger is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Copy of all records matching a filter, in append order
    #[must_use]
    pub fn records(&self, filter: &UsageFilter) -> Vec<UsageRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    /// Aggregate every record matching the filter.
    ///
    /// A pure read: the result depends only on the set of matching records,
    /// never on query order or prior queries.
    #[must_use]
    pub fn report(&self, filter: &UsageFilter) -> UsageReport {
        let records = self.records.lock();
        let mut report = UsageReport::default();
        let mut latency_total: u128 = 0;

        for record in records.iter().filter(|r| filter.matches(r)) {
            report.total_calls += 1;
            report.input_tokens += record.input_tokens;
            report.output_tokens += record.output_tokens;
            report.total_cost += record.cost_estimate;
            latency_total += u128::from(record.latency_ms);

            let backend = report.by_backend.entry(record.backend_id.clone()).or_default();
            backend.calls += 1;
            backend.input_tokens += record.input_tokens;
            backend.output_tokens += record.output_tokens;
            backend.cost += record.cost_estimate;
        }

        if report.total_calls > 0 {
            report.avg_latency_ms = latency_total as f64 / report.total_calls as f64;
        }
        report
    }
}

impl std::fmt::Debug for UsageLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageLedger")
            .field("records", &self.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record_at(
        backend: &str,
        provider: &str,
        session: Option<&str>,
        tokens: (u64, u64),
        cost: f64,
        latency: u64,
        ts: DateTime<Utc>,
    ) -> UsageRecord {
        UsageRecord {
            backend_id: backend.to_string(),
            provider_id: provider.to_string(),
            session_id: session.map(str::to_string),
            input_tokens: tokens.0,
            output_tokens: tokens.1,
            cost_estimate: cost,
            latency_ms: latency,
            timestamp: ts,
        }
    }

    fn ts(seconds: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, seconds).unwrap()
    }

    fn seeded_ledger() -> UsageLedger {
        let ledger = UsageLedger::new();
        ledger.record(record_at("a", "p1", Some("s1"), (100, 50), 0.001, 200, ts(0)));
        ledger.record(record_at("a", "p1", Some("s2"), (200, 80), 0.002, 300, ts(10)));
        ledger.record(record_at("b", "p2", Some("s1"), (50, 20), 0.0005, 100, ts(20)));
        ledger
    }

    #[test]
    fn test_estimate_cost_uses_per_mtok_pricing() {
        let record = CapabilityRecord {
            id: "m".to_string(),
            display_name: "M".to_string(),
            provider_id: "p".to_string(),
            context_window: 1000,
            input_cost_per_mtok: 3.0,
            output_cost_per_mtok: 15.0,
            reasoning_score: 50,
            coding_score: 50,
            speed_rating: 5,
            supports_vision: false,
            supports_function_calling: false,
        };
        let cost = estimate_cost(&record, Usage::new(1_000_000, 200_000));
        assert!((cost - (3.0 + 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_session_aggregate_equals_manual_sum() {
        let ledger = seeded_ledger();
        let filter = UsageFilter::all().session("s1");

        let manual: f64 = ledger
            .records(&filter)
            .iter()
            .map(|r| r.cost_estimate)
            .sum();
        let report = ledger.report(&filter);

        assert_eq!(report.total_calls, 2);
        assert!((report.total_cost - manual).abs() < 1e-12);
        assert_eq!(report.input_tokens, 150);
        assert_eq!(report.output_tokens, 70);
    }

    #[test]
    fn test_report_independent_of_query_order() {
        let ledger = seeded_ledger();
        let by_backend = ledger.report(&UsageFilter::all().backend("a"));
        let _interleaved = ledger.report(&UsageFilter::all().provider("p2"));
        let by_backend_again = ledger.report(&UsageFilter::all().backend("a"));

        assert_eq!(by_backend, by_backend_again);
    }

    #[test]
    fn test_provider_filter() {
        let ledger = seeded_ledger();
        let report = ledger.report(&UsageFilter::all().provider("p1"));
        assert_eq!(report.total_calls, 2);
        assert!(report.by_backend.contains_key("a"));
        assert!(!report.by_backend.contains_key("b"));
    }

    #[test]
    fn test_time_window_bounds() {
        let ledger = seeded_ledger();
        // since inclusive, until exclusive: only the ts(10) record.
        let report = ledger.report(&UsageFilter::all().window(ts(10), ts(20)));
        assert_eq!(report.total_calls, 1);
        assert_eq!(report.input_tokens, 200);
    }

    #[test]
    fn test_avg_latency() {
        let ledger = seeded_ledger();
        let report = ledger.report(&UsageFilter::all());
        assert!((report.avg_latency_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_report() {
        let ledger = UsageLedger::new();
        let report = ledger.report(&UsageFilter::all());
        assert_eq!(report.total_calls, 0);
        assert!(report.avg_latency_ms.abs() < f64::EPSILON);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_concurrent_appends_lose_nothing() {
        use std::sync::Arc;

        let ledger = Arc::new(UsageLedger::new());
        let mut handles = Vec::new();
        for worker in 0u64..8 {
            let ledger = ledger.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0u64..100 {
                    ledger.record(record_at(
                        "shared",
                        "p",
                        None,
                        (1, 1),
                        0.0,
                        worker * 100 + i,
                        Utc::now(),
                    ));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.len(), 800);
        let report = ledger.report(&UsageFilter::all());
        assert_eq!(report.total_calls, 800);
        assert_eq!(report.input_tokens, 800);
    }
}

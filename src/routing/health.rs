//! Backend Health Tracking and Circuit Breaking
//!
//! Tracks per-backend failure history and temporarily excludes backends
//! that keep failing, so the fallback waterfall stops paying for known-bad
//! backends.
//!
//! # State Machine
//!
//! ```text
//! +--------+  5 failures in 60s   +----------+   cooldown elapses   +--------+
//! | ACTIVE | -------------------> | DEGRADED | -------------------> | ACTIVE |
//! +--------+                      +----------+                      +--------+
//!     |                                                    (counters reset)
//!     | missing adapter / unusable configuration
//!     v
//! +---------------+
//! | MISCONFIGURED |   (never routed until the registry reloads)
//! +---------------+
//! ```
//!
//! - **ACTIVE**: routed normally
//! - **DEGRADED**: skipped by every routing decision until the cooldown
//!   elapses, regardless of score
//! - **MISCONFIGURED**: skipped unconditionally; cleared only by an
//!   explicit reset
//!
//! # Thread Safety
//!
//! Entries live in a `DashMap` keyed by backend id, each guarded by its own
//! `parking_lot::Mutex`, so concurrent consensus participants updating the
//! same backend's health never race and updates to different backends never
//! contend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

// ============================================================================
// Configuration
// ============================================================================

/// Tunables for health tracking behavior
#[derive(Clone, Copy, Debug)]
pub struct HealthConfig {
    /// Failures within the window that trip the breaker
    pub failure_threshold: u32,
    /// Rolling window over which failures are counted
    pub failure_window: Duration,
    /// How long a tripped backend stays degraded
    pub cooldown: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            cooldown: Duration::from_secs(300),
        }
    }
}

// ============================================================================
// Per-Backend State
// ============================================================================

/// Routing-visible health state of a backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthState {
    /// Normal operation
    Active,
    /// Circuit tripped; skipped until the cooldown elapses
    Degraded,
    /// Unusable configuration (no adapter, bad credentials)
    Misconfigured,
}

/// Mutable health record for one backend
#[derive(Debug)]
struct BackendHealth {
    state: HealthState,
    consecutive_failures: u32,
    window_start: Instant,
    degraded_until: Option<Instant>,
}

impl BackendHealth {
    fn new(now: Instant) -> Self {
        Self {
            state: HealthState::Active,
            consecutive_failures: 0,
            window_start: now,
            degraded_until: None,
        }
    }

    /// Count a failure; returns `true` if this one tripped the breaker
    fn record_failure(&mut self, config: &HealthConfig, now: Instant) -> bool {
        if self.state == HealthState::Misconfigured {
            return false;
        }

        // Rolling window: failures older than the window no longer count.
        if now.duration_since(self.window_start) > config.failure_window {
            self.window_start = now;
            self.consecutive_failures = 0;
        }
        self.consecutive_failures += 1;

        if self.state == HealthState::Active
            && self.consecutive_failures >= config.failure_threshold
        {
            self.state = HealthState::Degraded;
            self.degraded_until = Some(now + config.cooldown);
            return true;
        }
        false
    }

    fn record_success(&mut self, now: Instant) {
        if self.state == HealthState::Misconfigured {
            return;
        }
        self.consecutive_failures = 0;
        self.window_start = now;
        if self.state == HealthState::Degraded {
            // A success implies the backend was routed, which only happens
            // after the cooldown; restore it fully.
            self.state = HealthState::Active;
            self.degraded_until = None;
        }
    }

    /// Whether routing may use this backend, applying cooldown expiry
    fn is_routable(&mut self, now: Instant) -> bool {
        match self.state {
            HealthState::Active => true,
            HealthState::Misconfigured => false,
            HealthState::Degraded => match self.degraded_until {
                Some(until) if now >= until => {
                    self.state = HealthState::Active;
                    self.degraded_until = None;
                    self.consecutive_failures = 0;
                    self.window_start = now;
                    true
                }
                _ => false,
            },
        }
    }
}

// ============================================================================
// Tracker
// ============================================================================

/// Read-only view of one backend's health
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HealthSnapshot {
    /// Current state
    pub state: HealthState,
    /// Failures in the current window
    pub consecutive_failures: u32,
    /// Remaining cooldown, if degraded
    pub cooldown_remaining: Option<Duration>,
}

/// Aggregate health tracker for all backends
///
/// Entries are created lazily on first failure; a backend with no entry is
/// treated as routable.
pub struct HealthTracker {
    entries: DashMap<String, Arc<Mutex<BackendHealth>>>,
    config: HealthConfig,
}

impl HealthTracker {
    /// Tracker with default thresholds (5 failures / 60s, 5 min cooldown)
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HealthConfig::default())
    }

    /// Tracker with custom thresholds
    #[must_use]
    pub fn with_config(config: HealthConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    fn entry(&self, backend_id: &str) -> Arc<Mutex<BackendHealth>> {
        self.entries
            .entry(backend_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(BackendHealth::new(Instant::now()))))
            .clone()
    }

    /// Record a failed call for a backend
    pub fn record_failure(&self, backend_id: &str) {
        let entry = self.entry(backend_id);
        let tripped = entry.lock().record_failure(&self.config, Instant::now());
        if tripped {
            tracing::warn!(
                backend = backend_id,
                cooldown_secs = self.config.cooldown.as_secs(),
                "backend degraded after repeated failures"
            );
        }
    }

    /// Record a successful call for a backend
    pub fn record_success(&self, backend_id: &str) {
        if let Some(entry) = self.entries.get(backend_id) {
            entry.lock().record_success(Instant::now());
        }
    }

    /// Mark a backend as misconfigured (skipped until reset)
    pub fn mark_misconfigured(&self, backend_id: &str) {
        let entry = self.entry(backend_id);
        let mut health = entry.lock();
        if health.state != HealthState::Misconfigured {
            tracing::warn!(backend = backend_id, "backend marked misconfigured");
            health.state = HealthState::Misconfigured;
            health.degraded_until = None;
        }
    }

    /// Whether routing may currently use a backend
    ///
    /// Unknown backends are routable; a degraded backend becomes routable
    /// again the moment its cooldown elapses.
    #[must_use]
    pub fn is_routable(&self, backend_id: &str) -> bool {
        match self.entries.get(backend_id) {
            Some(entry) => entry.lock().is_routable(Instant::now()),
            None => true,
        }
    }

    /// Current state of a backend (`Active` when untracked)
    #[must_use]
    pub fn state(&self, backend_id: &str) -> HealthState {
        match self.entries.get(backend_id) {
            Some(entry) => entry.lock().state,
            None => HealthState::Active,
        }
    }

    /// Read-only snapshot of one backend, if tracked
    #[must_use]
    pub fn snapshot(&self, backend_id: &str) -> Option<HealthSnapshot> {
        let now = Instant::now();
        self.entries.get(backend_id).map(|entry| {
            let health = entry.lock();
            HealthSnapshot {
                state: health.state,
                consecutive_failures: health.consecutive_failures,
                cooldown_remaining: health
                    .degraded_until
                    .map(|until| until.saturating_duration_since(now)),
            }
        })
    }

    /// Clear all health state (e.g. after a registry reload)
    pub fn reset(&self) {
        self.entries.clear();
    }

    /// Number of tracked backends
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.entries.len()
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HealthTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthTracker")
            .field("tracked", &self.tracked())
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

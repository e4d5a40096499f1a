//! Task Analyzer
//!
//! Two-stage hybrid classifier that assigns exactly one [`TaskCategory`]
//! (with a confidence) to every incoming request.
//!
//! # Pipeline
//!
//! ```text
//! prompt
//!   |
//!   v
//! normalize ── SHA-256 ──> cache hit? ──yes──> cached classification
//!   |
//!   v
//! stage 1: pattern table (deterministic, priority-ordered)
//!   | confidence >= 0.8? ──yes──> done
//!   v
//! stage 2: secondary model call (own timeout)
//!   | success ──> secondary classification
//!   | timeout / error ──> best stage-1 guess
//! ```
//!
//! Stage two is explicitly a network call; it must never block routing
//! indefinitely, so its failure mode is always the stage-1 guess.
//!
//! Results are cached in a bounded LRU keyed by content hash: identical
//! input always yields the identical cached classification within the cache
//! lifetime.

mod cache;
mod patterns;
mod requirements;

pub use cache::DEFAULT_CACHE_CAPACITY;
pub use requirements::{Priority, ScoreWeights, TaskCategory, TaskRequirements};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::provider::ProviderError;
use cache::ClassificationCache;

/// Stage-1 confidence at or above which the secondary classifier is skipped
pub const STAGE_ONE_THRESHOLD: f64 = 0.8;

/// Default timeout for the secondary classifier call
pub const DEFAULT_SECONDARY_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Classification
// ============================================================================

/// A category assignment with its confidence
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Classification {
    /// Assigned task category
    pub category: TaskCategory,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
}

impl Classification {
    /// Create a classification, clamping confidence into `[0, 1]`
    #[must_use]
    pub fn new(category: TaskCategory, confidence: f64) -> Self {
        Self {
            category,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Requirements implied by this classification's category
    #[must_use]
    pub fn requirements(&self) -> TaskRequirements {
        TaskRequirements::for_category(self.category)
    }
}

// ============================================================================
// Secondary Classifier
// ============================================================================

/// Stage-two classifier backed by a lightweight model call
///
/// Implementations make a network call; the analyzer wraps every call in its
/// own timeout and falls back to the stage-1 guess on any failure.
#[async_trait]
pub trait SecondaryClassifier: Send + Sync {
    /// Classify a raw (un-normalized) prompt
    async fn classify(&self, prompt: &str) -> Result<Classification, ProviderError>;
}

// ============================================================================
// Task Analyzer
// ============================================================================

/// The two-stage task analyzer
pub struct TaskAnalyzer {
    cache: Mutex<ClassificationCache>,
    secondary: Option<Arc<dyn SecondaryClassifier>>,
    secondary_timeout: Duration,
}

impl TaskAnalyzer {
    /// Analyzer with the default cache capacity and no secondary classifier
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(ClassificationCache::new(DEFAULT_CACHE_CAPACITY)),
            secondary: None,
            secondary_timeout: DEFAULT_SECONDARY_TIMEOUT,
        }
    }

    /// Attach a stage-two classifier
    #[must_use]
    pub fn with_secondary(mut self, secondary: Arc<dyn SecondaryClassifier>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    /// Override the stage-two timeout
    #[must_use]
    pub fn with_secondary_timeout(mut self, timeout: Duration) -> Self {
        self.secondary_timeout = timeout;
        self
    }

    /// Override the cache capacity
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = Mutex::new(ClassificationCache::new(capacity));
        self
    }

    /// Classify a prompt, consulting the cache first
    pub async fn analyze(&self, prompt: &str) -> Classification {
        let normalized = normalize(prompt);
        let key = content_key(&normalized);

        if let Some(hit) = self.cache.lock().get(&key) {
            tracing::debug!(category = %hit.category, "classification cache hit");
            return hit;
        }

        let stage_one = patterns::classify(&normalized);
        let result = if stage_one.confidence >= STAGE_ONE_THRESHOLD {
            stage_one
        } else {
            self.stage_two(prompt, stage_one).await
        };

        self.cache.lock().insert(key, result);
        result
    }

    /// Run the secondary classifier, falling back to the stage-1 guess
    async fn stage_two(&self, prompt: &str, stage_one: Classification) -> Classification {
        let Some(classifier) = &self.secondary else {
            return stage_one;
        };

        match tokio::time::timeout(self.secondary_timeout, classifier.classify(prompt)).await {
            Ok(Ok(secondary)) => {
                tracing::debug!(
                    category = %secondary.category,
                    confidence = secondary.confidence,
                    "secondary classifier result"
                );
                Classification::new(secondary.category, secondary.confidence)
            }
            Ok(Err(err)) => {
                tracing::warn!(
                    error = %err,
                    fallback = %stage_one.category,
                    "secondary classifier failed, using stage-1 guess"
                );
                stage_one
            }
            Err(_) => {
                tracing::warn!(
                    fallback = %stage_one.category,
                    "secondary classifier timed out, using stage-1 guess"
                );
                stage_one
            }
        }
    }

    /// Number of cached classifications
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }
}

impl Default for TaskAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskAnalyzer")
            .field("cached", &self.cache_len())
            .field("has_secondary", &self.secondary.is_some())
            .finish()
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// Canonical form of a prompt for pattern matching and cache keys:
/// lowercased with whitespace runs collapsed to single spaces.
pub(crate) fn normalize(prompt: &str) -> String {
    prompt
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 digest of the normalized prompt
fn content_key(normalized: &str) -> [u8; 32] {
    let digest = Sha256::digest(normalized.as_bytes());
    digest.into()
}

// ============================================================================
// Tests
// ============================================================================

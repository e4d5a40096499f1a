//! Candidate Scorer
//!
//! Ranks capability records against the requirements implied by a task
//! category. Records failing a hard minimum (context window, vision,
//! function calling, cost ceiling, disabled provider) are excluded
//! entirely, never merely scored lower.
//!
//! # Fitness Formula
//!
//! ```text
//! score = w_affinity * task_affinity
//!       + w_performance * (speed_rating / 10)
//!       + w_accuracy * ((reasoning + coding) / 200)
//!       + w_cost * (1 / (1 + blended_cost))
//! ```
//!
//! The four weights come from the requirements' priority mode and always
//! sum to 1.0, so scores stay in `[0, 1]`.
//!
//! # Ordering
//!
//! Output is sorted by score descending with an explicit total order:
//! ties break by lower blended cost, then by record id. Fallback ordering
//! must be deterministic, so the tie-break is never left to sort stability.

use std::sync::Arc;

use crate::analyzer::{TaskCategory, TaskRequirements};
use crate::registry::{CapabilityRecord, RegistrySnapshot};

// ============================================================================
// Scored Candidate
// ============================================================================

/// A registry record paired with its fitness for one set of requirements
#[derive(Clone, Debug)]
pub struct ScoredCandidate {
    /// The capability record
    pub record: Arc<CapabilityRecord>,
    /// Fitness score in `[0, 1]`
    pub score: f64,
}

impl ScoredCandidate {
    /// Backend id shorthand
    #[must_use]
    pub fn backend_id(&self) -> &str {
        &self.record.id
    }
}

// ============================================================================
// Affinity
// ============================================================================

/// Category-specific blend of a record's coding and reasoning scores,
/// normalized to `[0, 1]`
#[must_use]
pub fn task_affinity(record: &CapabilityRecord, category: TaskCategory) -> f64 {
    let (coding_weight, reasoning_weight) = category.affinity_weights();
    (coding_weight * f64::from(record.coding_score)
        + reasoning_weight * f64::from(record.reasoning_score))
        / 100.0
}

// ============================================================================
// Scorer
// ============================================================================

/// Scores and ranks registry records for a set of task requirements
#[derive(Clone, Copy, Debug, Default)]
pub struct CandidateScorer;

impl CandidateScorer {
    /// Create a scorer
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Whether a record meets every hard minimum
    #[must_use]
    pub fn is_eligible(
        &self,
        snapshot: &RegistrySnapshot,
        record: &CapabilityRecord,
        requirements: &TaskRequirements,
    ) -> bool {
        if !snapshot.record_routable(record) {
            return false;
        }
        if record.context_window < requirements.min_context_window {
            return false;
        }
        if requirements.requires_vision && !record.supports_vision {
            return false;
        }
        if requirements.requires_function_calling && !record.supports_function_calling {
            return false;
        }
        if record.reasoning_score < requirements.min_reasoning {
            return false;
        }
        if record.coding_score < requirements.min_coding {
            return false;
        }
        if let Some(ceiling) = requirements.max_blended_cost {
            if record.blended_cost() > ceiling {
                return false;
            }
        }
        true
    }

    /// Fitness score for one record; assumes eligibility was already checked
    #[must_use]
    pub fn score(&self, record: &CapabilityRecord, requirements: &TaskRequirements) -> f64 {
        let weights = requirements.priority.weights();

        let affinity = task_affinity(record, requirements.category);
        let performance = f64::from(record.speed_rating) / 10.0;
        let accuracy =
            (f64::from(record.reasoning_score) + f64::from(record.coding_score)) / 200.0;
        let cost_efficiency = 1.0 / (1.0 + record.blended_cost());

        weights.affinity * affinity
            + weights.performance * performance
            + weights.accuracy * accuracy
            + weights.cost_efficiency * cost_efficiency
    }

    /// Rank every eligible record, best first.
    ///
    /// Returns an empty list when nothing survives the hard minimums; the
    /// caller decides whether that is an error.
    #[must_use]
    pub fn rank(
        &self,
        snapshot: &RegistrySnapshot,
        requirements: &TaskRequirements,
    ) -> Vec<ScoredCandidate> {
        let mut candidates: Vec<ScoredCandidate> = snapshot
            .all()
            .iter()
            .filter(|record| self.is_eligible(snapshot, record, requirements))
            .map(|record| ScoredCandidate {
                record: record.clone(),
                score: self.score(record, requirements),
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.record.blended_cost().total_cmp(&b.record.blended_cost()))
                .then_with(|| a.record.id.cmp(&b.record.id))
        });

        tracing::debug!(
            category = %requirements.category,
            candidates = candidates.len(),
            top = candidates.first().map(|c| c.backend_id()),
            "ranked candidates"
        );

        candidates
    }
}

// ============================================================================
// Tests
// ============================================================================

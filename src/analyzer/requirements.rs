//! Task Categories and Derived Requirements
//!
//! The closed set of task categories the analyzer can assign, the fixed
//! per-category affinity weights used by scoring, and the mapping from a
//! category to the hard requirements and priority mode that drive candidate
//! selection.

use serde::{Deserialize, Serialize};

// ============================================================================
// Task Category
// ============================================================================

/// Closed enumeration of task categories
///
/// Exactly one category is assigned per request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    /// Writing new code
    CodeGeneration,
    /// Diagnosing and fixing broken code
    Debugging,
    /// System and component design
    ArchitecturalDesign,
    /// Prose documentation of code or systems
    Documentation,
    /// Authoring tests
    Testing,
    /// Working with datasets, queries, statistics
    DataAnalysis,
    /// Multi-step logical reasoning
    Reasoning,
    /// Requests involving image input
    Vision,
    /// Anything else
    General,
}

impl TaskCategory {
    /// All categories, in a fixed order
    pub const ALL: [TaskCategory; 9] = [
        TaskCategory::CodeGeneration,
        TaskCategory::Debugging,
        TaskCategory::ArchitecturalDesign,
        TaskCategory::Documentation,
        TaskCategory::Testing,
        TaskCategory::DataAnalysis,
        TaskCategory::Reasoning,
        TaskCategory::Vision,
        TaskCategory::General,
    ];

    /// Fixed (coding, reasoning) blend weights for this category's affinity
    ///
    /// Weights sum to 1.0; scoring blends a record's `coding_score` and
    /// `reasoning_score` with them to get the category-specific affinity.
    #[must_use]
    pub fn affinity_weights(self) -> (f64, f64) {
        match self {
            Self::CodeGeneration => (0.7, 0.3),
            Self::Debugging => (0.6, 0.4),
            Self::ArchitecturalDesign => (0.3, 0.7),
            Self::Documentation => (0.35, 0.65),
            Self::Testing => (0.65, 0.35),
            Self::DataAnalysis => (0.3, 0.7),
            Self::Reasoning => (0.0, 1.0),
            Self::Vision => (0.2, 0.8),
            Self::General => (0.5, 0.5),
        }
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CodeGeneration => "code_generation",
            Self::Debugging => "debugging",
            Self::ArchitecturalDesign => "architectural_design",
            Self::Documentation => "documentation",
            Self::Testing => "testing",
            Self::DataAnalysis => "data_analysis",
            Self::Reasoning => "reasoning",
            Self::Vision => "vision",
            Self::General => "general",
        };
        write!(f, "{name}")
    }
}

// ============================================================================
// Priority Modes
// ============================================================================

/// Priority mode that reweights the scoring formula
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Default weighting
    #[default]
    Balanced,
    /// Favor capability over speed and cost
    QualityFirst,
    /// Favor cheap backends
    CostOptimize,
    /// Favor fast backends
    SpeedPriority,
}

/// The four scoring weights, normalized to sum to 1.0
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreWeights {
    /// Weight of the category-specific affinity component
    pub affinity: f64,
    /// Weight of the speed-derived performance component
    pub performance: f64,
    /// Weight of the raw capability-score component
    pub accuracy: f64,
    /// Weight of the inverse-cost component
    pub cost_efficiency: f64,
}

impl Priority {
    /// Scoring weights for this priority mode
    #[must_use]
    pub fn weights(self) -> ScoreWeights {
        match self {
            Self::Balanced => ScoreWeights {
                affinity: 0.40,
                performance: 0.30,
                accuracy: 0.20,
                cost_efficiency: 0.10,
            },
            Self::QualityFirst => ScoreWeights {
                affinity: 0.45,
                performance: 0.15,
                accuracy: 0.30,
                cost_efficiency: 0.10,
            },
            Self::CostOptimize => ScoreWeights {
                affinity: 0.30,
                performance: 0.15,
                accuracy: 0.15,
                cost_efficiency: 0.40,
            },
            Self::SpeedPriority => ScoreWeights {
                affinity: 0.25,
                performance: 0.50,
                accuracy: 0.15,
                cost_efficiency: 0.10,
            },
        }
    }
}

// ============================================================================
// Task Requirements
// ============================================================================

/// Hard minimums and priority mode derived from a task category
///
/// Records failing a hard minimum are excluded from candidacy entirely,
/// never merely scored lower.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskRequirements {
    /// Category these requirements were derived from
    pub category: TaskCategory,
    /// Minimum context window in tokens
    pub min_context_window: u32,
    /// Optional ceiling on blended cost (USD per MTok)
    pub max_blended_cost: Option<f64>,
    /// Minimum reasoning score
    pub min_reasoning: u8,
    /// Minimum coding score
    pub min_coding: u8,
    /// Whether vision support is mandatory
    pub requires_vision: bool,
    /// Whether function-calling support is mandatory
    pub requires_function_calling: bool,
    /// Priority mode used to reweight scoring
    pub priority: Priority,
}

impl TaskRequirements {
    /// Fixed per-category requirements mapping
    #[must_use]
    pub fn for_category(category: TaskCategory) -> Self {
        let base = Self {
            category,
            min_context_window: 4_000,
            max_blended_cost: None,
            min_reasoning: 0,
            min_coding: 0,
            requires_vision: false,
            requires_function_calling: false,
            priority: Priority::Balanced,
        };

        match category {
            TaskCategory::CodeGeneration => Self {
                min_context_window: 16_000,
                min_coding: 60,
                ..base
            },
            TaskCategory::Debugging => Self {
                min_context_window: 32_000,
                min_coding: 65,
                min_reasoning: 50,
                ..base
            },
            TaskCategory::ArchitecturalDesign => Self {
                min_context_window: 32_000,
                min_reasoning: 75,
                priority: Priority::QualityFirst,
                ..base
            },
            TaskCategory::Documentation => Self {
                min_context_window: 16_000,
                max_blended_cost: Some(10.0),
                priority: Priority::CostOptimize,
                ..base
            },
            TaskCategory::Testing => Self {
                min_context_window: 16_000,
                min_coding: 60,
                ..base
            },
            TaskCategory::DataAnalysis => Self {
                min_context_window: 32_000,
                min_reasoning: 65,
                ..base
            },
            TaskCategory::Reasoning => Self {
                min_context_window: 8_000,
                min_reasoning: 80,
                priority: Priority::QualityFirst,
                ..base
            },
            TaskCategory::Vision => Self {
                min_context_window: 8_000,
                requires_vision: true,
                ..base
            },
            TaskCategory::General => base,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

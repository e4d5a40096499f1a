//! Stage-One Pattern Classification
//!
//! Deterministic keyword and structure heuristics over the normalized
//! prompt. Patterns are checked in a fixed priority order; the first match
//! wins. Confidence is fixed per pattern group, so classification of the
//! same text is always identical.

use super::requirements::TaskCategory;
use super::Classification;

/// Confidence assigned to structural matches (code fences)
const STRUCTURAL_CONFIDENCE: f64 = 0.95;

/// Confidence assigned to strong keyword matches
const KEYWORD_CONFIDENCE: f64 = 0.85;

/// Confidence of the general fallback guess
const FALLBACK_CONFIDENCE: f64 = 0.5;

const VISION_KEYWORDS: &[&str] = &[
    "image",
    "screenshot",
    "photo",
    "picture",
    "diagram in the attachment",
    "what is in this",
];

const TESTING_KEYWORDS: &[&str] = &[
    "write tests",
    "write a test",
    "unit test",
    "test case",
    "test coverage",
    "regression test",
    "integration test",
];

const DEBUGGING_KEYWORDS: &[&str] = &[
    "stack trace",
    "traceback",
    "debug",
    "fix this bug",
    "fix the bug",
    "segfault",
    "exception",
    "error message",
    "doesn't work",
    "not working",
    "why is this failing",
];

const CODE_KEYWORDS: &[&str] = &[
    "implement",
    "function",
    "refactor",
    "write code",
    "write a program",
    "algorithm",
    "script",
    "class ",
    "struct ",
    "import ",
    "def ",
    "fn ",
    "compile",
];

const ARCHITECTURE_KEYWORDS: &[&str] = &[
    "architecture",
    "system design",
    "design a system",
    "microservice",
    "scalab",
    "tradeoff",
    "high-level design",
    "api design",
];

const DATA_KEYWORDS: &[&str] = &[
    "csv",
    "dataframe",
    "dataset",
    "sql",
    "analyze the data",
    "analyze this data",
    "statistics",
    "correlation",
    "aggregate",
];

const DOCUMENTATION_KEYWORDS: &[&str] = &[
    "documentation",
    "document this",
    "readme",
    "docstring",
    "changelog",
    "api reference",
    "write docs",
];

// Reasoning cues are weaker signals; they intentionally stay below the
// short-circuit threshold so the secondary classifier gets a chance.
const REASONING_KEYWORDS: &[&str] = &[
    "step by step",
    "prove",
    "logic puzzle",
    "riddle",
    "deduce",
    "why does",
];

const REASONING_CONFIDENCE: f64 = 0.7;

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| text.contains(kw))
}

/// Classify a normalized (lowercased, whitespace-collapsed) prompt.
///
/// Always returns a classification; the last resort is
/// (`General`, 0.5), which sits below the stage-two threshold.
pub(super) fn classify(normalized: &str) -> Classification {
    // Structural signal first: a code fence is the strongest cue we have.
    if normalized.contains("```") {
        return Classification::new(TaskCategory::CodeGeneration, STRUCTURAL_CONFIDENCE);
    }

    // Keyword groups in fixed priority order. More specific intents
    // (vision, testing, debugging) come before the broad code keywords so
    // "write tests for this function" lands on Testing, not CodeGeneration.
    let ordered: [(TaskCategory, &[&str], f64); 8] = [
        (TaskCategory::Vision, VISION_KEYWORDS, KEYWORD_CONFIDENCE),
        (TaskCategory::Testing, TESTING_KEYWORDS, KEYWORD_CONFIDENCE),
        (TaskCategory::Debugging, DEBUGGING_KEYWORDS, KEYWORD_CONFIDENCE),
        (TaskCategory::CodeGeneration, CODE_KEYWORDS, KEYWORD_CONFIDENCE),
        (
            TaskCategory::ArchitecturalDesign,
            ARCHITECTURE_KEYWORDS,
            KEYWORD_CONFIDENCE,
        ),
        (TaskCategory::DataAnalysis, DATA_KEYWORDS, KEYWORD_CONFIDENCE),
        (
            TaskCategory::Documentation,
            DOCUMENTATION_KEYWORDS,
            KEYWORD_CONFIDENCE,
        ),
        (
            TaskCategory::Reasoning,
            REASONING_KEYWORDS,
            REASONING_CONFIDENCE,
        ),
    ];

    for (category, keywords, confidence) in ordered {
        if contains_any(normalized, keywords) {
            return Classification::new(category, confidence);
        }
    }

    Classification::new(TaskCategory::General, FALLBACK_CONFIDENCE)
}

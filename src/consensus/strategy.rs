//! Reconciliation Strategies
//!
//! Pure answer-reconciliation logic: vote tallying over normalized answers
//! and judge-score parsing. The strategies themselves are driven by the
//! engine in the parent module; everything here is deterministic and
//! synchronous so it can be tested without any backend.

use std::collections::HashMap;

use crate::provider::CallResult;

/// How a panel's answers are reconciled into one result
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsensusStrategy {
    /// Majority value wins; even top-group splits are reported unresolved
    Voting,
    /// A judge backend scores each answer; the highest score wins
    BestOfN,
    /// Two backends run a bounded propose, critique, revise loop
    Debate,
}

impl std::fmt::Display for ConsensusStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Voting => write!(f, "voting"),
            Self::BestOfN => write!(f, "best_of_n"),
            Self::Debate => write!(f, "debate"),
        }
    }
}

/// Canonical form used to compare answers across backends:
/// trimmed, lowercased, whitespace runs collapsed.
#[must_use]
pub fn normalize_answer(answer: &str) -> String {
    answer
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Voting
// ============================================================================

/// Result of tallying responding backends' answers
#[derive(Clone, Debug, PartialEq)]
pub struct VoteTally {
    /// Original text of the winning answer; `None` on an unresolved tie
    pub winner: Option<String>,
    /// Size of the largest vote group
    pub top_count: usize,
    /// Number of responding backends
    pub responders: usize,
}

impl VoteTally {
    /// Fraction of responders in the largest group
    #[must_use]
    pub fn agreement(&self) -> f64 {
        if self.responders == 0 {
            0.0
        } else {
            self.top_count as f64 / self.responders as f64
        }
    }
}

/// Tally normalized answers from the responding entries.
///
/// When the largest vote count is shared by more than one answer group, the
/// tie is reported as unresolved (`winner == None`) rather than broken
/// arbitrarily.
#[must_use]
pub fn tally_votes(responses: &[CallResult]) -> VoteTally {
    // normalized answer -> (count, first original text)
    let mut groups: HashMap<String, (usize, String)> = HashMap::new();
    let mut responders = 0;

    for response in responses {
        if !response.is_response() {
            continue;
        }
        responders += 1;
        let normalized = normalize_answer(&response.content);
        groups
            .entry(normalized)
            .and_modify(|(count, _)| *count += 1)
            .or_insert((1, response.content.clone()));
    }

    let Some(top_count) = groups.values().map(|(count, _)| *count).max() else {
        return VoteTally {
            winner: None,
            top_count: 0,
            responders: 0,
        };
    };

    let leaders: Vec<&(usize, String)> = groups
        .values()
        .filter(|(count, _)| *count == top_count)
        .collect();

    if leaders.len() > 1 {
        return VoteTally {
            winner: None,
            top_count,
            responders,
        };
    }

    // Exactly one group holds the maximum, so map iteration order is moot.
    VoteTally {
        winner: Some(leaders[0].1.clone()),
        top_count,
        responders,
    }
}

// ============================================================================
// Judge Scores
// ============================================================================

/// Extract a judge's numeric score (0-100) from free-form response text.
///
/// Takes the first run of ASCII digits; values above 100 clamp to 100.
#[must_use]
pub fn parse_judge_score(content: &str) -> Option<u32> {
    let digits: String = content
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    let value: u64 = digits.parse().ok()?;
    Some(value.min(100) as u32)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ErrorKind, Usage};

    fn response(backend: &str, content: &str) -> CallResult {
        CallResult {
            content: content.to_string(),
            backend_id: backend.to_string(),
            usage: Usage::new(5, 5),
            latency_ms: 10,
            error: None,
        }
    }

    fn abstention(backend: &str) -> CallResult {
        CallResult::abstention(backend, ErrorKind::Transient)
    }

    #[test]
    fn test_normalize_answer() {
        assert_eq!(normalize_answer("  Yes,\n  it IS. "), "yes, it is.");
    }

    #[test]
    fn test_majority_wins() {
        let responses = vec![
            response("a", "Paris"),
            response("b", " paris "),
            response("c", "Lyon"),
        ];
        let tally = tally_votes(&responses);
        assert_eq!(tally.winner.as_deref(), Some("Paris"));
        assert_eq!(tally.top_count, 2);
        assert_eq!(tally.responders, 3);
        assert!((tally.agreement() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_abstentions_are_not_counted() {
        let responses = vec![
            response("a", "A"),
            abstention("b"),
            response("c", "A"),
            abstention("d"),
        ];
        let tally = tally_votes(&responses);
        assert_eq!(tally.responders, 2);
        assert_eq!(tally.winner.as_deref(), Some("A"));
        assert!((tally.agreement() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_even_split_is_unresolved() {
        let responses = vec![
            response("a", "A"),
            response("b", "A"),
            response("c", "B"),
            response("d", "B"),
            response("e", "C"),
        ];
        let tally = tally_votes(&responses);
        assert!(tally.winner.is_none());
        assert_eq!(tally.top_count, 2);
        assert_eq!(tally.responders, 5);
    }

    #[test]
    fn test_no_responses_tallies_empty() {
        let tally = tally_votes(&[abstention("a"), abstention("b")]);
        assert!(tally.winner.is_none());
        assert_eq!(tally.responders, 0);
        assert!(tally.agreement().abs() < f64::EPSILON);
    }

    #[test]
    fn test_winner_keeps_first_original_text() {
        let responses = vec![response("a", "YES"), response("b", "yes")];
        let tally = tally_votes(&responses);
        assert_eq!(tally.winner.as_deref(), Some("YES"));
    }

    #[test]
    fn test_parse_judge_score() {
        assert_eq!(parse_judge_score("87"), Some(87));
        assert_eq!(parse_judge_score("Score: 42/100"), Some(42));
        assert_eq!(parse_judge_score("I'd give it 250"), Some(100)); // clamped
        assert_eq!(parse_judge_score("no number here"), None);
    }
}

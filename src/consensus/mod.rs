//! Consensus Engine
//!
//! Fans one request out to a panel of backends in parallel and reconciles
//! their answers into a single trusted result.
//!
//! # Panel Semantics
//!
//! Each panel seat is a single-backend call (transient retries allowed,
//! waterfall disabled): a backend that fails simply abstains, and consensus
//! never falls back within a seat. Every seat has its own per-call timeout;
//! the panel as a whole runs under one deadline. When the deadline elapses,
//! all outstanding seats are cancelled and count as abstentions, not
//! failures, against the quorum.
//!
//! A panel requires `ceil(K/2)` successful responses; below quorum the
//! engine raises [`OrchestratorError::ConsensusQuorum`] rather than
//! returning a low-confidence guess.

pub mod strategy;

pub use strategy::{normalize_answer, ConsensusStrategy, VoteTally};

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::OrchestratorError;
use crate::provider::{CallResult, ChatMessage, ErrorKind, FunctionRegistry, InvokeOptions};
use crate::registry::CapabilityRecord;
use crate::routing::FallbackCoordinator;
use strategy::{parse_judge_score, tally_votes};

// ============================================================================
// Configuration
// ============================================================================

/// Tunables for consensus execution
#[derive(Clone, Debug)]
pub struct ConsensusConfig {
    /// Timeout for each individual panel call
    pub per_call_timeout: Duration,
    /// Deadline for the panel as a whole; outstanding seats are cancelled
    pub panel_deadline: Duration,
    /// Explicit judge backend id for [`ConsensusStrategy::BestOfN`];
    /// `None` picks the best-ranked candidate outside the panel
    pub judge_backend: Option<String>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            per_call_timeout: Duration::from_secs(30),
            panel_deadline: Duration::from_secs(120),
            judge_backend: None,
        }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Reconciled result of one consensus request
#[derive(Clone, Debug)]
pub struct ConsensusOutcome {
    /// The winning answer; `None` when voting ended in an unresolved tie
    pub winning_answer: Option<String>,
    /// Fraction of responding backends that agree with the winning answer
    pub agreement_score: f64,
    /// Per-seat results, in panel order; abstaining seats carry an error kind
    pub responses: Vec<CallResult>,
    /// Seats that produced a response
    pub responders: usize,
    /// Seats that failed, timed out, or were cancelled
    pub abstentions: usize,
    /// Strategy that reconciled the answers
    pub strategy: ConsensusStrategy,
}

/// Quorum requirement for a panel of `panel_size` seats
#[must_use]
pub fn quorum_for(panel_size: usize) -> usize {
    panel_size.div_ceil(2)
}

// ============================================================================
// Engine
// ============================================================================

/// Drives panel fan-out and reconciliation
pub struct ConsensusEngine {
    coordinator: Arc<FallbackCoordinator>,
    config: ConsensusConfig,
}

impl ConsensusEngine {
    /// Create an engine over a fallback coordinator
    #[must_use]
    pub fn new(coordinator: Arc<FallbackCoordinator>, config: ConsensusConfig) -> Self {
        Self {
            coordinator,
            config,
        }
    }

    /// Run one consensus request over a ranked panel.
    ///
    /// `judge` is consulted only by [`ConsensusStrategy::BestOfN`]; when
    /// absent, the top panel member judges.
    pub async fn run(
        &self,
        prompt: &str,
        panel: &[Arc<CapabilityRecord>],
        judge: Option<Arc<CapabilityRecord>>,
        strategy: ConsensusStrategy,
        functions: &Arc<FunctionRegistry>,
        cancel: &CancellationToken,
    ) -> Result<ConsensusOutcome, OrchestratorError> {
        if strategy == ConsensusStrategy::Debate {
            return self.run_debate(prompt, panel, functions, cancel).await;
        }

        let responses = self.fan_out(prompt, panel, functions, cancel).await;
        let responders = responses.iter().filter(|r| r.is_response()).count();
        let abstentions = responses.len() - responders;
        let required = quorum_for(panel.len());

        if responders < required {
            return Err(OrchestratorError::ConsensusQuorum {
                achieved: responders,
                required,
                abstentions,
            });
        }

        let (winning_answer, agreement_score) = match strategy {
            ConsensusStrategy::Voting => {
                let tally = tally_votes(&responses);
                if tally.winner.is_none() {
                    tracing::info!(
                        top_count = tally.top_count,
                        responders = tally.responders,
                        "voting ended in an unresolved tie"
                    );
                }
                let agreement = tally.agreement();
                (tally.winner, agreement)
            }
            ConsensusStrategy::BestOfN => {
                self.judge_answers(prompt, &responses, judge, functions, cancel)
                    .await
            }
            ConsensusStrategy::Debate => unreachable!("handled above"),
        };

        Ok(ConsensusOutcome {
            winning_answer,
            agreement_score,
            responses,
            responders,
            abstentions,
            strategy,
        })
    }

    /// Issue one call per panel seat concurrently under the panel deadline.
    ///
    /// Returns one entry per seat in panel order; seats that failed or were
    /// cancelled become abstention entries.
    async fn fan_out(
        &self,
        prompt: &str,
        panel: &[Arc<CapabilityRecord>],
        functions: &Arc<FunctionRegistry>,
        cancel: &CancellationToken,
    ) -> Vec<CallResult> {
        let seat_token = cancel.child_token();
        let options = InvokeOptions::default().with_timeout(self.config.per_call_timeout);
        let mut set = JoinSet::new();

        for (seat, record) in panel.iter().enumerate() {
            let coordinator = self.coordinator.clone();
            let record = record.clone();
            let messages = vec![ChatMessage::user(prompt)];
            let options = options.clone();
            let functions = functions.clone();
            let token = seat_token.clone();
            set.spawn(async move {
                let outcome = coordinator
                    .execute_single(&record, &messages, &options, &functions, &token)
                    .await;
                (seat, record.id.clone(), outcome)
            });
        }

        let mut seats: Vec<Option<CallResult>> = vec![None; panel.len()];
        let deadline = tokio::time::sleep(self.config.panel_deadline);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = &mut deadline => {
                    tracing::warn!(
                        outstanding = set.len(),
                        "panel deadline elapsed, cancelling outstanding seats"
                    );
                    seat_token.cancel();
                    set.abort_all();
                    break;
                }
                joined = set.join_next() => {
                    match joined {
                        None => break,
                        Some(Ok((seat, backend_id, outcome))) => {
                            seats[seat] = Some(match outcome {
                                Ok(result) => result,
                                Err(error) => {
                                    tracing::debug!(
                                        backend = %backend_id,
                                        error = %error,
                                        "panel seat abstained"
                                    );
                                    CallResult::abstention(backend_id, error.kind)
                                }
                            });
                        }
                        Some(Err(_)) => {
                            // Aborted or panicked seat: stays an abstention.
                        }
                    }
                }
            }
        }

        seats
            .into_iter()
            .enumerate()
            .map(|(seat, entry)| {
                entry.unwrap_or_else(|| {
                    CallResult::abstention(panel[seat].id.clone(), ErrorKind::Transient)
                })
            })
            .collect()
    }

    /// Best-of-N: a judge backend scores each responding answer 0-100.
    ///
    /// All judge calls run concurrently. Answers the judge cannot score are
    /// dropped from contention; if nothing gets a score at all, the engine
    /// degrades to a plain vote.
    async fn judge_answers(
        &self,
        prompt: &str,
        responses: &[CallResult],
        judge: Option<Arc<CapabilityRecord>>,
        functions: &Arc<FunctionRegistry>,
        cancel: &CancellationToken,
    ) -> (Option<String>, f64) {
        let Some(judge) = judge else {
            tracing::warn!("no judge backend available, degrading to a plain vote");
            let tally = tally_votes(responses);
            let agreement = tally.agreement();
            return (tally.winner, agreement);
        };

        let options = InvokeOptions::default().with_timeout(self.config.per_call_timeout);
        let answers: Vec<&CallResult> = responses.iter().filter(|r| r.is_response()).collect();

        let verdicts = join_all(answers.iter().map(|response| {
            let judge = judge.clone();
            let options = options.clone();
            let messages = vec![
                ChatMessage::system(
                    "You are judging candidate answers. Respond with only an integer \
                     score from 0 to 100.",
                ),
                ChatMessage::user(format!(
                    "Question:\n{prompt}\n\nCandidate answer:\n{}",
                    response.content
                )),
            ];
            async move {
                match self
                    .coordinator
                    .execute_single(&judge, &messages, &options, functions, cancel)
                    .await
                {
                    Ok(verdict) => parse_judge_score(&verdict.content),
                    Err(error) => {
                        tracing::warn!(
                            judge = %judge.id,
                            error = %error,
                            "judge call failed for candidate answer"
                        );
                        None
                    }
                }
            }
        }))
        .await;

        // Strictly-greater keeps the earlier (higher-ranked) seat on ties.
        let mut best: Option<(u32, &CallResult)> = None;
        for (response, verdict) in answers.iter().copied().zip(verdicts) {
            if let Some(score) = verdict {
                if best.is_none() || score > best.as_ref().map_or(0, |(s, _)| *s) {
                    best = Some((score, response));
                }
            }
        }

        let Some((_, winner)) = best else {
            tracing::warn!("no judge scores available, degrading to a plain vote");
            let tally = tally_votes(responses);
            let agreement = tally.agreement();
            return (tally.winner, agreement);
        };

        let winner = Some(winner.content.clone());
        let agreement = agreement_with(responses, winner.as_deref());
        (winner, agreement)
    }

    /// Debate: a bounded propose -> critique -> revise loop between the top
    /// two panel members.
    ///
    /// The revised answer wins. Agreement is 1.0 when the full loop
    /// completed (the answer survived its challenge) and 0.5 when the
    /// critique or revision round was cut short.
    async fn run_debate(
        &self,
        prompt: &str,
        panel: &[Arc<CapabilityRecord>],
        functions: &Arc<FunctionRegistry>,
        cancel: &CancellationToken,
    ) -> Result<ConsensusOutcome, OrchestratorError> {
        let options = InvokeOptions::default().with_timeout(self.config.per_call_timeout);

        // Proposer is the top candidate; swap roles if it cannot answer.
        let (proposer, critic) = match panel {
            [] => {
                return Err(OrchestratorError::ConsensusQuorum {
                    achieved: 0,
                    required: 1,
                    abstentions: 0,
                })
            }
            [only] => (only.clone(), None),
            [first, second, ..] => (first.clone(), Some(second.clone())),
        };

        let propose = |record: Arc<CapabilityRecord>| {
            let messages = vec![ChatMessage::user(prompt.to_string())];
            let options = options.clone();
            let functions = functions.clone();
            async move {
                self.coordinator
                    .execute_single(&record, &messages, &options, &functions, cancel)
                    .await
            }
        };

        let (proposer, critic, proposal) = match propose(proposer.clone()).await {
            Ok(result) => (proposer, critic, result),
            Err(error) => {
                // Proposer abstained; the critic (if any) takes over.
                tracing::info!(error = %error, "debate proposer abstained, swapping roles");
                let Some(second) = critic else {
                    return Err(OrchestratorError::ConsensusQuorum {
                        achieved: 0,
                        required: 1,
                        abstentions: 1,
                    });
                };
                match propose(second.clone()).await {
                    Ok(result) => (second, None, result),
                    Err(_) => {
                        return Err(OrchestratorError::ConsensusQuorum {
                            achieved: 0,
                            required: 1,
                            abstentions: 2,
                        })
                    }
                }
            }
        };

        let mut responses = vec![proposal.clone()];
        let mut final_answer = proposal.content.clone();
        let mut loop_completed = false;

        if let Some(critic) = critic {
            let critique_messages = vec![
                ChatMessage::system(
                    "You are reviewing another model's answer. Point out mistakes, gaps, \
                     and improvements concisely.",
                ),
                ChatMessage::user(format!(
                    "Question:\n{prompt}\n\nProposed answer:\n{}",
                    proposal.content
                )),
            ];

            match self
                .coordinator
                .execute_single(&critic, &critique_messages, &options, functions, cancel)
                .await
            {
                Ok(critique) => {
                    let revise_messages = vec![
                        ChatMessage::user(prompt.to_string()),
                        ChatMessage::assistant(proposal.content.clone()),
                        ChatMessage::user(format!(
                            "A reviewer raised the following critique. Produce your revised \
                             final answer.\n\nCritique:\n{}",
                            critique.content
                        )),
                    ];
                    responses.push(critique);

                    match self
                        .coordinator
                        .execute_single(&proposer, &revise_messages, &options, functions, cancel)
                        .await
                    {
                        Ok(revision) => {
                            final_answer = revision.content.clone();
                            // The revision supersedes the proposal as the
                            // proposer's contribution.
                            responses[0] = revision;
                            loop_completed = true;
                        }
                        Err(error) => {
                            tracing::info!(error = %error, "revision round failed, keeping proposal");
                        }
                    }
                }
                Err(error) => {
                    tracing::info!(error = %error, "critique round failed, answer unchallenged");
                    responses.push(CallResult::abstention(critic.id.clone(), error.kind));
                }
            }
        }

        let responders = responses.iter().filter(|r| r.is_response()).count();
        let abstentions = responses.len() - responders;
        let agreement_score = if loop_completed { 1.0 } else { 0.5 };

        Ok(ConsensusOutcome {
            winning_answer: Some(final_answer),
            agreement_score,
            responses,
            responders,
            abstentions,
            strategy: ConsensusStrategy::Debate,
        })
    }
}

impl std::fmt::Debug for ConsensusEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusEngine")
            .field("config", &self.config)
            .finish()
    }
}

/// Fraction of responding entries whose normalized answer matches `winner`
fn agreement_with(responses: &[CallResult], winner: Option<&str>) -> f64 {
    let Some(winner) = winner else { return 0.0 };
    let normalized = normalize_answer(winner);
    let responders: Vec<&CallResult> = responses.iter().filter(|r| r.is_response()).collect();
    if responders.is_empty() {
        return 0.0;
    }
    let agreeing = responders
        .iter()
        .filter(|r| normalize_answer(&r.content) == normalized)
        .count();
    agreeing as f64 / responders.len() as f64
}

// ============================================================================
// Tests
// ============================================================================

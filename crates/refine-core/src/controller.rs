//! Bounded generate → review → decide loop.
//!
//! The controller owns the latest artifact set for the duration of a run and
//! drives the project's [`MemoryStore`]: it absorbs every generated set, asks
//! the store for the next generation context, records one iteration per
//! finished cycle and feeds review output back as feedback. Generation and
//! review failures degrade the cycle to `needs_improvement`; persistence
//! failures end the run with an error.

use crate::analyzer::IssueAnalyzer;
use crate::artifact::ArtifactSet;
use crate::config::Config;
use crate::error::{RefineError, Result};
use crate::memory::{IterationDraft, IterationRecord, MemoryStore};
use crate::oracle::{Generator, Review, Reviewer};
use crate::types::IterationStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// CancelToken
// ---------------------------------------------------------------------------

/// Cooperative cancellation shared between a run and whoever wants to stop
/// it. Checked between collaborator calls, never during one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// ControllerState / Termination
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Idle,
    Generating,
    Reviewing,
    Deciding,
    Accepted,
    Exhausted,
}

impl ControllerState {
    pub fn as_str(self) -> &'static str {
        match self {
            ControllerState::Idle => "idle",
            ControllerState::Generating => "generating",
            ControllerState::Reviewing => "reviewing",
            ControllerState::Deciding => "deciding",
            ControllerState::Accepted => "accepted",
            ControllerState::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Accepted,
    Exhausted,
    /// Stopped on request between calls. The project stays resumable.
    Cancelled,
}

// ---------------------------------------------------------------------------
// IterationOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct IterationOutcome {
    /// The last artifact set produced. `None` means no generation attempt
    /// ever succeeded: no artifacts are available.
    pub artifacts: Option<ArtifactSet>,
    pub termination: Termination,
    /// The store's counter when the run ended.
    pub iterations: u32,
    /// Every iteration record of the project, including earlier runs.
    pub history: Vec<IterationRecord>,
    /// States entered during this run, in order.
    pub states: Vec<ControllerState>,
}

impl IterationOutcome {
    pub fn accepted(&self) -> bool {
        self.termination == Termination::Accepted
    }

    pub fn final_record(&self) -> Option<&IterationRecord> {
        self.history.last()
    }

    /// The outcome of a project whose iteration budget is already spent,
    /// read back from its memory without running a cycle. The last record
    /// decides between accepted and exhausted.
    pub fn from_store(store: &MemoryStore) -> Self {
        let history = store.iterations().to_vec();
        let termination = match history.last() {
            Some(last) if last.status == IterationStatus::Completed => Termination::Accepted,
            _ => Termination::Exhausted,
        };
        IterationOutcome {
            artifacts: store.last_artifacts(),
            termination,
            iterations: store.current_iteration(),
            history,
            states: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// IterationController
// ---------------------------------------------------------------------------

/// What the decision step sees for one cycle.
enum CycleResult {
    Reviewed(Review),
    Failed(RefineError),
}

pub struct IterationController<'a> {
    store: &'a mut MemoryStore,
    analyzer: IssueAnalyzer,
    context_query: String,
    cancel: CancelToken,
    states: Vec<ControllerState>,
}

impl<'a> IterationController<'a> {
    pub fn new(store: &'a mut MemoryStore, config: &Config) -> Self {
        Self {
            store,
            analyzer: IssueAnalyzer::new(&config.analyzer),
            context_query: config.iteration.context_query.clone(),
            cancel: CancelToken::new(),
            states: Vec::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn enter(&mut self, state: ControllerState) {
        tracing::info!(
            project = %self.store.project_id(),
            iteration = self.store.current_iteration() + 1,
            state = %state,
            "controller state"
        );
        self.states.push(state);
    }

    fn finish(&mut self, artifacts: Option<ArtifactSet>, termination: Termination) -> IterationOutcome {
        IterationOutcome {
            artifacts,
            termination,
            iterations: self.store.current_iteration(),
            history: self.store.iterations().to_vec(),
            states: std::mem::take(&mut self.states),
        }
    }

    /// Run cycles until a go decision, the iteration budget is spent, or the
    /// cancel token fires. Starts from the store's persisted counter and the
    /// last absorbed artifact set, so a pending project resumes where it
    /// stopped.
    pub fn run(
        &mut self,
        generator: &mut dyn Generator,
        reviewer: &mut dyn Reviewer,
    ) -> Result<IterationOutcome> {
        if !self.store.can_continue() {
            return Err(RefineError::IterationLimit {
                current: self.store.current_iteration(),
                max: self.store.max_iterations(),
            });
        }

        self.states.clear();
        self.enter(ControllerState::Idle);
        let mut latest: Option<ArtifactSet> = self.store.last_artifacts();

        loop {
            if self.cancel.is_cancelled() {
                return Ok(self.finish(latest, Termination::Cancelled));
            }
            let iteration = self.store.current_iteration() + 1;

            self.enter(ControllerState::Generating);
            let context = self.store.build_context(&self.context_query);
            let generated = generator
                .generate(&context)
                .and_then(|set| set.validate().map(|_| set).map_err(anyhow::Error::from));
            if self.cancel.is_cancelled() {
                return Ok(self.finish(latest, Termination::Cancelled));
            }

            let cycle = match generated {
                Err(e) => {
                    tracing::warn!(project = %self.store.project_id(), iteration, error = %format!("{e:#}"), "generation failed");
                    CycleResult::Failed(RefineError::Generation(format!("{e:#}")))
                }
                Ok(set) => {
                    self.store.absorb_artifacts(&set, iteration, &self.analyzer)?;
                    let set = latest.insert(set);

                    self.enter(ControllerState::Reviewing);
                    let reviewed = reviewer.review(set);
                    if self.cancel.is_cancelled() {
                        return Ok(self.finish(latest, Termination::Cancelled));
                    }
                    match reviewed {
                        Ok(review) => CycleResult::Reviewed(review),
                        Err(e) => {
                            tracing::warn!(project = %self.store.project_id(), iteration, error = %format!("{e:#}"), "review failed");
                            CycleResult::Failed(RefineError::Review(format!("{e:#}")))
                        }
                    }
                }
            };

            self.enter(ControllerState::Deciding);
            let accepted = matches!(&cycle, CycleResult::Reviewed(r) if r.accepts());
            let draft = match &cycle {
                CycleResult::Reviewed(review) => IterationDraft {
                    score: review.score,
                    issue_count: review.issues.len(),
                    status: if accepted {
                        IterationStatus::Completed
                    } else {
                        IterationStatus::NeedsImprovement
                    },
                    recommendations: review.recommendations.clone(),
                },
                CycleResult::Failed(err) => IterationDraft {
                    score: 0,
                    issue_count: 0,
                    status: IterationStatus::NeedsImprovement,
                    recommendations: vec![err.to_string()],
                },
            };
            let record = self.store.append_iteration_record(draft)?;
            self.store.increment_iteration()?;
            tracing::info!(
                project = %self.store.project_id(),
                iteration = record.iteration,
                score = record.score,
                issues = record.issue_count,
                accepted,
                "iteration recorded"
            );

            if accepted {
                self.enter(ControllerState::Accepted);
                return Ok(self.finish(latest, Termination::Accepted));
            }
            if !self.store.can_continue() {
                self.enter(ControllerState::Exhausted);
                return Ok(self.finish(latest, Termination::Exhausted));
            }

            match cycle {
                CycleResult::Reviewed(review) => {
                    for issue in review.issues {
                        self.store.append_feedback(issue)?;
                    }
                    for rec in review.recommendations {
                        self.store.append_instruction(rec)?;
                    }
                }
                CycleResult::Failed(err) => self.store.append_feedback(err.to_string())?,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

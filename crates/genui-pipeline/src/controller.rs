// ABOUTME: Iterative refinement controller: requirements, blueprint, candidates, scoring, validation
// ABOUTME: Current best is an immutable RefinementState replaced by a reducer after every comparison

use crate::error::{Result, Stage};
use crate::progress::{ProgressEvent, ProgressObserver};
use crate::schemas::{Candidate, EvaluationResult, Requirements, Rubric, UiBlueprint};
use crate::stages::{PriorAttempt, Stages};
use genui_core::{RefinementConfig, StoppingRuleKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

const INITIAL_ID: &str = "v1";
const PREVIOUS_ID: &str = "prev";

/// When the refinement loop may stop before its iteration ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoppingRule {
    /// Stop only when the target score is reached
    TargetOnly,
    /// Also stop when an iteration improves the best score by less than `min_improvement`
    TargetOrDiminishingReturns { min_improvement: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefinementPolicy {
    pub max_iterations: u32,
    pub target_score: f64,
    pub stopping_rule: StoppingRule,
    pub candidates_per_iteration: usize,
}

impl Default for RefinementPolicy {
    fn default() -> Self {
        Self::from(&RefinementConfig::default())
    }
}

impl From<&RefinementConfig> for RefinementPolicy {
    fn from(config: &RefinementConfig) -> Self {
        let stopping_rule = match config.stopping_rule {
            StoppingRuleKind::TargetOnly => StoppingRule::TargetOnly,
            StoppingRuleKind::TargetOrDiminishingReturns => {
                StoppingRule::TargetOrDiminishingReturns {
                    min_improvement: config.min_improvement,
                }
            }
        };
        Self {
            max_iterations: config.max_iterations,
            target_score: config.target_score,
            stopping_rule,
            candidates_per_iteration: config.candidates_per_iteration.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TargetReached,
    DiminishingReturns,
    MaxIterations,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::TargetReached => "target score reached",
            StopReason::DiminishingReturns => "improvement below threshold",
            StopReason::MaxIterations => "iteration limit reached",
        };
        f.write_str(text)
    }
}

impl RefinementPolicy {
    pub fn target_reached(&self, score: f64) -> bool {
        score >= self.target_score
    }

    /// Stopping decision after `iteration` moved the best score from `before` to `after`.
    pub fn should_stop(&self, iteration: u32, before: f64, after: f64) -> Option<StopReason> {
        if self.target_reached(after) {
            return Some(StopReason::TargetReached);
        }
        if let StoppingRule::TargetOrDiminishingReturns { min_improvement } = self.stopping_rule {
            if after - before < min_improvement {
                return Some(StopReason::DiminishingReturns);
            }
        }
        if iteration >= self.max_iterations {
            return Some(StopReason::MaxIterations);
        }
        None
    }
}

/// Result of comparing one refinement candidate against the current best.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub candidate_id: String,
    pub artifact: String,
    pub evaluation: EvaluationResult,
    /// The candidate's comparative score, if the judge produced one
    pub candidate_score: Option<f64>,
}

impl Comparison {
    pub fn candidate_won(&self) -> bool {
        self.evaluation.winner_id() == self.candidate_id
    }
}

/// Best artifact so far, its score and the latest critique.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementState {
    pub artifact: String,
    pub score: f64,
    pub evaluation: EvaluationResult,
}

impl RefinementState {
    pub fn initial(artifact: String, evaluation: EvaluationResult, rubric: &Rubric) -> Self {
        let score = evaluation
            .score_of(INITIAL_ID, rubric)
            .unwrap_or_else(|| evaluation.resolved_score(rubric));
        Self {
            artifact,
            score,
            evaluation,
        }
    }

    /// Fold one comparison into the state.
    ///
    /// The candidate replaces the current best only if the judge picked it and
    /// its score is strictly higher. The latest evaluation is always kept.
    pub fn step(self, comparison: Comparison) -> RefinementState {
        let replaces = comparison.candidate_won()
            && comparison
                .candidate_score
                .is_some_and(|score| score > self.score);

        match (replaces, comparison.candidate_score) {
            (true, Some(score)) => RefinementState {
                artifact: comparison.artifact,
                score,
                evaluation: comparison.evaluation,
            },
            _ => RefinementState {
                evaluation: comparison.evaluation,
                ..self
            },
        }
    }

    fn as_prior(&self) -> PriorAttempt<'_> {
        PriorAttempt {
            artifact: &self.artifact,
            evaluation: &self.evaluation,
        }
    }
}

/// Terminal output of a successful run.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub artifact: String,
    pub score: f64,
    pub evaluation: EvaluationResult,
    pub requirements: Requirements,
    pub blueprint: UiBlueprint,
    pub rubric: Rubric,
    /// Refinement iterations actually run
    pub iterations: u32,
    pub stop_reason: StopReason,
}

pub struct RefinementController {
    stages: Stages,
    policy: RefinementPolicy,
}

impl RefinementController {
    pub fn new(stages: Stages, policy: RefinementPolicy) -> Self {
        Self { stages, policy }
    }

    pub fn policy(&self) -> &RefinementPolicy {
        &self.policy
    }

    /// Run the whole pipeline for `prompt`.
    ///
    /// Any stage failure aborts the run and is returned as is; nothing partial
    /// is produced.
    pub async fn run(
        &self,
        prompt: &str,
        observer: &dyn ProgressObserver,
    ) -> Result<GenerationOutcome> {
        let started = Instant::now();

        observer.on_event(&ProgressEvent::StageStarted {
            stage: Stage::Requirements,
            iteration: 0,
        });
        let requirements = self.stages.analyze_requirements(prompt, None).await?;
        info!(main_goal = %requirements.main_goal, "Requirements analysis completed");

        observer.on_event(&ProgressEvent::StageStarted {
            stage: Stage::Blueprint,
            iteration: 0,
        });
        let blueprint = self.stages.synthesize_blueprint(&requirements, None).await?;
        info!(elements = blueprint.elements.len(), "Blueprint synthesized");

        observer.on_event(&ProgressEvent::StageStarted {
            stage: Stage::Candidate,
            iteration: 0,
        });
        let (mut initial, rubric) = tokio::try_join!(
            self.stages
                .generate_candidates(&requirements, &blueprint, None, 1),
            self.stages.build_rubric(&requirements),
        )?;
        let initial_artifact = initial.pop().unwrap_or_default();

        observer.on_event(&ProgressEvent::StageStarted {
            stage: Stage::Evaluation,
            iteration: 0,
        });
        let evaluation = self
            .stages
            .score_candidates(
                &requirements,
                &rubric,
                &[Candidate::new(INITIAL_ID, "Candidate v1", initial_artifact.as_str())],
            )
            .await?;
        let state = RefinementState::initial(initial_artifact, evaluation, &rubric);
        observer.on_event(&ProgressEvent::InitialScored { score: state.score });
        info!(score = state.score, "Initial candidate scored");

        let (state, iterations, stop_reason) = self
            .refine(state, &requirements, &blueprint, &rubric, observer)
            .await?;
        observer.on_event(&ProgressEvent::RefinementStopped {
            iterations,
            best_score: state.score,
            reason: stop_reason,
        });
        info!(
            iterations,
            score = state.score,
            reason = %stop_reason,
            "Refinement finished"
        );

        observer.on_event(&ProgressEvent::StageStarted {
            stage: Stage::Validation,
            iteration: iterations,
        });
        let artifact = self.stages.validate_artifact(&state.artifact).await?;
        info!(
            chars = artifact.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generation pipeline completed"
        );

        Ok(GenerationOutcome {
            artifact,
            score: state.score,
            evaluation: state.evaluation,
            requirements,
            blueprint,
            rubric,
            iterations,
            stop_reason,
        })
    }

    async fn refine(
        &self,
        mut state: RefinementState,
        requirements: &Requirements,
        blueprint: &UiBlueprint,
        rubric: &Rubric,
        observer: &dyn ProgressObserver,
    ) -> Result<(RefinementState, u32, StopReason)> {
        if self.policy.target_reached(state.score) {
            return Ok((state, 0, StopReason::TargetReached));
        }
        if self.policy.max_iterations == 0 {
            return Ok((state, 0, StopReason::MaxIterations));
        }

        let n = self.policy.candidates_per_iteration.max(1);
        let mut iteration = 0;

        loop {
            iteration += 1;
            let before = state.score;

            observer.on_event(&ProgressEvent::StageStarted {
                stage: Stage::Candidate,
                iteration,
            });
            let generated = self
                .stages
                .generate_candidates(requirements, blueprint, Some(state.as_prior()), n)
                .await?;

            for (k, artifact) in generated.into_iter().enumerate() {
                let candidate_id = if n == 1 {
                    "new".to_string()
                } else {
                    format!("new-{}", k + 1)
                };

                observer.on_event(&ProgressEvent::StageStarted {
                    stage: Stage::Evaluation,
                    iteration,
                });
                let evaluation = self
                    .stages
                    .score_candidates(
                        requirements,
                        rubric,
                        &[
                            Candidate::new(
                                PREVIOUS_ID,
                                format!("Best so far (iter {})", iteration - 1),
                                state.artifact.as_str(),
                            ),
                            Candidate::new(
                                candidate_id.as_str(),
                                format!("Refined (iter {})", iteration),
                                artifact.as_str(),
                            ),
                        ],
                    )
                    .await?;

                let candidate_score = evaluation.score_of(&candidate_id, rubric);
                let comparison = Comparison {
                    candidate_id,
                    artifact,
                    evaluation,
                    candidate_score,
                };
                let candidate_won = comparison.candidate_won();
                let candidate_id = comparison.candidate_id.clone();
                let previous = state.score;
                state = state.step(comparison);
                let replaced = state.score > previous;

                debug!(
                    iteration,
                    candidate = %candidate_id,
                    candidate_won,
                    candidate_score,
                    best_score = state.score,
                    replaced,
                    "Candidate compared"
                );
                observer.on_event(&ProgressEvent::CandidateCompared {
                    iteration,
                    candidate_id,
                    candidate_score,
                    best_score: state.score,
                    replaced,
                });
            }

            if let Some(reason) = self.policy.should_stop(iteration, before, state.score) {
                return Ok((state, iteration, reason));
            }
        }
    }
}

use crate::controller::StopReason;
use crate::error::Stage;

/// Progress notifications emitted by the refinement controller during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A stage is about to call the model. `iteration` is 0 before refinement starts.
    StageStarted { stage: Stage, iteration: u32 },
    /// The initial candidate received its absolute score.
    InitialScored { score: f64 },
    /// One refinement candidate was compared against the current best.
    CandidateCompared {
        iteration: u32,
        candidate_id: String,
        candidate_score: Option<f64>,
        best_score: f64,
        replaced: bool,
    },
    /// The refinement loop ended.
    RefinementStopped {
        iterations: u32,
        best_score: f64,
        reason: StopReason,
    },
}

impl ProgressEvent {
    /// Best score known at the time of the event, if any
    pub fn best_score(&self) -> Option<f64> {
        match self {
            ProgressEvent::StageStarted { .. } => None,
            ProgressEvent::InitialScored { score } => Some(*score),
            ProgressEvent::CandidateCompared { best_score, .. }
            | ProgressEvent::RefinementStopped { best_score, .. } => Some(*best_score),
        }
    }
}

/// Receives progress events. Called inline on the run's task, so it must not block.
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// Observer that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_event(&self, _event: &ProgressEvent) {}
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) {
        self(event)
    }
}

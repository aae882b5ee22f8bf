use genui_ai::GatewayError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The pipeline step a failure or progress report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Requirements,
    Blueprint,
    Candidate,
    Rubric,
    Evaluation,
    Validation,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Requirements => "requirements",
            Stage::Blueprint => "blueprint",
            Stage::Candidate => "candidate",
            Stage::Rubric => "rubric",
            Stage::Evaluation => "evaluation",
            Stage::Validation => "validation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: GatewayError,
    },

    #[error("Failed to encode {what} for a prompt: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to load prompt template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

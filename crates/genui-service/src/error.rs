use crate::blob::BlobError;
use genui_core::{ConfigError, GenUiError, GenerationId, GenerationStatus};
use genui_pipeline::PipelineError;
use genui_queue::SchedulerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Generation not found: {0}")]
    NotFound(GenerationId),

    #[error("Generation {id} has no artifact yet (status: {status})")]
    ArtifactNotReady {
        id: GenerationId,
        status: GenerationStatus,
    },

    #[error("Artifact for generation {0} is missing from storage")]
    ArtifactMissing(GenerationId),

    #[error("Invalid prompt: {0}")]
    InvalidPrompt(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Record(#[from] GenUiError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("Storage error: {0}")]
    Blob(#[from] BlobError),

    #[error("Provider error: {0}")]
    Provider(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

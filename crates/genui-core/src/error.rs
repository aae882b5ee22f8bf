use crate::types::{GenerationId, GenerationStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenUiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Generation not found: {0}")]
    GenerationNotFound(GenerationId),

    #[error("Invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: GenerationId,
        from: GenerationStatus,
        to: GenerationStatus,
    },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

pub type Result<T> = std::result::Result<T, GenUiError>;

use std::time::Duration;
use thiserror::Error;

/// Failure of a gateway call, either one attempt or the whole retried operation.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Model output is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Model output does not match the expected shape: {0}")]
    InvalidStructuredOutput(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{operation} with model '{model}' failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: &'static str,
        model: String,
        attempts: u32,
        #[source]
        last: Box<GatewayError>,
    },
}

impl GatewayError {
    /// The error of the final attempt, looking through `RetriesExhausted`.
    pub fn last_attempt(&self) -> &GatewayError {
        match self {
            GatewayError::RetriesExhausted { last, .. } => last.last_attempt(),
            other => other,
        }
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

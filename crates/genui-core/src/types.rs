use crate::error::{GenUiError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type GenerationId = Uuid;

/// Lifecycle of a generation request.
///
/// The only legal paths are `pending -> generating -> completed` and
/// `pending -> generating -> failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(self, next: GenerationStatus) -> bool {
        use GenerationStatus::*;
        matches!(
            (self, next),
            (Pending, Generating) | (Generating, Completed) | (Generating, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last reported position of a running generation inside the refinement pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationProgress {
    pub stage: String,
    pub iteration: u32,
    pub best_score: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// Durable record of one generation request.
///
/// The record never holds the artifact body, only `output_ref`, the blob-storage
/// key under which the final artifact was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRecord {
    pub id: GenerationId,
    pub prompt: String,
    pub status: GenerationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<GenerationProgress>,
}

impl GenerationRecord {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            status: GenerationStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
            output_ref: None,
            progress: None,
        }
    }

    fn transition(&mut self, next: GenerationStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(GenUiError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.transition(GenerationStatus::Generating)
    }

    pub fn complete(&mut self, output_ref: impl Into<String>) -> Result<()> {
        self.transition(GenerationStatus::Completed)?;
        self.output_ref = Some(output_ref.into());
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(GenerationStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Record progress; ignored once the record is terminal.
    pub fn report_progress(&mut self, stage: &str, iteration: u32, best_score: Option<f64>) {
        if self.status.is_terminal() {
            return;
        }
        self.progress = Some(GenerationProgress {
            stage: stage.to_string(),
            iteration,
            best_score,
            updated_at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_lifecycle() {
        let mut record = GenerationRecord::new("Build a pricing page");
        assert_eq!(record.status, GenerationStatus::Pending);
        assert!(record.completed_at.is_none());

        record.start().unwrap();
        assert_eq!(record.status, GenerationStatus::Generating);
        assert!(record.completed_at.is_none());

        record.complete("genui/generations/x.html").unwrap();
        assert_eq!(record.status, GenerationStatus::Completed);
        assert!(record.completed_at.is_some());
        assert_eq!(record.output_ref.as_deref(), Some("genui/generations/x.html"));
    }

    #[test]
    fn test_only_one_terminal_transition() {
        let mut record = GenerationRecord::new("prompt");
        record.start().unwrap();
        record.fail("boom").unwrap();

        let err = record.complete("key").unwrap_err();
        assert!(matches!(err, GenUiError::InvalidTransition { .. }));
        assert_eq!(record.status, GenerationStatus::Failed);
        assert!(record.output_ref.is_none());
        assert!(record.fail("again").is_err());
        assert_eq!(record.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_cannot_complete_without_starting() {
        let mut record = GenerationRecord::new("prompt");
        assert!(record.complete("key").is_err());
        assert!(record.fail("never started").is_err());
        assert_eq!(record.status, GenerationStatus::Pending);
    }

    #[test]
    fn test_progress_ignored_after_terminal() {
        let mut record = GenerationRecord::new("prompt");
        record.start().unwrap();
        record.report_progress("requirements", 0, None);
        assert_eq!(record.progress.as_ref().unwrap().stage, "requirements");

        record.complete("key").unwrap();
        record.report_progress("refine", 3, Some(80.0));
        assert_eq!(record.progress.as_ref().unwrap().stage, "requirements");
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let mut record = GenerationRecord::new("prompt");
        record.start().unwrap();
        record.complete("a/b.html").unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "completed");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("completedAt").is_some());
        assert_eq!(json["outputRef"], "a/b.html");
        assert!(json.get("error").is_none());
    }
}

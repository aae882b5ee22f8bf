// ABOUTME: Prompt templates for every pipeline stage
// ABOUTME: Built-in defaults, optionally overridden per file from a prompts directory

use crate::error::{PipelineError, Result};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Requirements,
    Blueprint,
    Candidate,
    Rubric,
    Evaluation,
    Validation,
}

impl PromptKind {
    pub const ALL: [PromptKind; 6] = [
        PromptKind::Requirements,
        PromptKind::Blueprint,
        PromptKind::Candidate,
        PromptKind::Rubric,
        PromptKind::Evaluation,
        PromptKind::Validation,
    ];

    /// File name looked up in a prompts directory
    pub fn file_name(self) -> &'static str {
        match self {
            PromptKind::Requirements => "requirements.md",
            PromptKind::Blueprint => "blueprint.md",
            PromptKind::Candidate => "candidate.md",
            PromptKind::Rubric => "rubric.md",
            PromptKind::Evaluation => "evaluation.md",
            PromptKind::Validation => "validation.md",
        }
    }

    fn builtin(self) -> &'static str {
        match self {
            PromptKind::Requirements => include_str!("../prompts/requirements.md"),
            PromptKind::Blueprint => include_str!("../prompts/blueprint.md"),
            PromptKind::Candidate => include_str!("../prompts/candidate.md"),
            PromptKind::Rubric => include_str!("../prompts/rubric.md"),
            PromptKind::Evaluation => include_str!("../prompts/evaluation.md"),
            PromptKind::Validation => include_str!("../prompts/validation.md"),
        }
    }
}

/// The six stage templates. Treated as opaque text by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    requirements: String,
    blueprint: String,
    candidate: String,
    rubric: String,
    evaluation: String,
    validation: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            requirements: PromptKind::Requirements.builtin().to_string(),
            blueprint: PromptKind::Blueprint.builtin().to_string(),
            candidate: PromptKind::Candidate.builtin().to_string(),
            rubric: PromptKind::Rubric.builtin().to_string(),
            evaluation: PromptKind::Evaluation.builtin().to_string(),
            validation: PromptKind::Validation.builtin().to_string(),
        }
    }
}

impl PromptTemplates {
    /// Built-in templates, with any file present in `dir` replacing its default.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut templates = Self::default();
        let Some(dir) = dir else {
            return Ok(templates);
        };

        for kind in PromptKind::ALL {
            let path = dir.join(kind.file_name());
            if !path.is_file() {
                continue;
            }
            let text = std::fs::read_to_string(&path).map_err(|source| PipelineError::Template {
                path: path.clone(),
                source,
            })?;
            info!("Using prompt override {}", path.display());
            *templates.slot_mut(kind) = text;
        }

        Ok(templates)
    }

    pub fn with_template(mut self, kind: PromptKind, text: impl Into<String>) -> Self {
        *self.slot_mut(kind) = text.into();
        self
    }

    pub fn get(&self, kind: PromptKind) -> &str {
        match kind {
            PromptKind::Requirements => &self.requirements,
            PromptKind::Blueprint => &self.blueprint,
            PromptKind::Candidate => &self.candidate,
            PromptKind::Rubric => &self.rubric,
            PromptKind::Evaluation => &self.evaluation,
            PromptKind::Validation => &self.validation,
        }
    }

    fn slot_mut(&mut self, kind: PromptKind) -> &mut String {
        match kind {
            PromptKind::Requirements => &mut self.requirements,
            PromptKind::Blueprint => &mut self.blueprint,
            PromptKind::Candidate => &mut self.candidate,
            PromptKind::Rubric => &mut self.rubric,
            PromptKind::Evaluation => &mut self.evaluation,
            PromptKind::Validation => &mut self.validation,
        }
    }
}

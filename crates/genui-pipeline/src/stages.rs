// ABOUTME: The six pipeline stages, each exactly one model gateway call
// ABOUTME: Stage failures are returned unchanged; nothing here retries or falls back

use crate::error::{PipelineError, Result, Stage};
use crate::fences::strip_code_fences;
use crate::interpolate::{interpolate, TemplateVars};
use crate::prompts::{PromptKind, PromptTemplates};
use crate::schemas::{Candidate, EvaluationResult, Requirements, Rubric, UiBlueprint};
use genui_ai::{CallOptions, Message, ModelGateway, OutputShape};
use genui_core::ModelsConfig;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

const REQUIREMENTS_TEMPERATURE: f32 = 0.2;
const BLUEPRINT_TEMPERATURE: f32 = 0.15;
const BLUEPRINT_MAX_TOKENS: usize = 32_000;
const ARTIFACT_MAX_TOKENS: usize = 20_000;
const JUDGE_MAX_TOKENS: usize = 5_000;

const REQUIREMENTS_SCHEMA: &str = "requirements_analysis";
const BLUEPRINT_SCHEMA: &str = "web_dsl";
pub const RUBRIC_SCHEMA: &str = "evaluation_metrics";
pub const EVALUATION_SCHEMA: &str = "ui_evaluation";

/// The best artifact so far and the critique it received, fed back into generation.
#[derive(Debug, Clone, Copy)]
pub struct PriorAttempt<'a> {
    pub artifact: &'a str,
    pub evaluation: &'a EvaluationResult,
}

/// Pipeline stages bound to one model snapshot.
#[derive(Clone)]
pub struct Stages {
    gateway: ModelGateway,
    models: ModelsConfig,
    templates: Arc<PromptTemplates>,
}

impl Stages {
    pub fn new(gateway: ModelGateway, models: ModelsConfig, templates: Arc<PromptTemplates>) -> Self {
        Self {
            gateway,
            models,
            templates,
        }
    }

    pub fn models(&self) -> &ModelsConfig {
        &self.models
    }

    /// Distill the user prompt into a requirements object.
    pub async fn analyze_requirements(
        &self,
        prompt: &str,
        recent_artifact: Option<&str>,
    ) -> Result<Requirements> {
        let vars = TemplateVars::new()
            .text("reflections", "")
            .text("recentArtifact", recent_artifact.unwrap_or(""));
        let messages = vec![
            Message::system(self.render(PromptKind::Requirements, &vars)),
            Message::user(prompt),
        ];

        self.gateway
            .complete_structured_checked(
                &self.models.requirement_analysis,
                &messages,
                &OutputShape::strict::<Requirements>(REQUIREMENTS_SCHEMA),
                CallOptions::default().temperature(REQUIREMENTS_TEMPERATURE),
                Requirements::check,
            )
            .await
            .map_err(|source| stage_error(Stage::Requirements, source))
    }

    /// Turn requirements into a UI blueprint. The schema is advisory; only the
    /// envelope is checked.
    pub async fn synthesize_blueprint(
        &self,
        requirements: &Requirements,
        existing_artifact: Option<&str>,
    ) -> Result<UiBlueprint> {
        let vars = TemplateVars::new()
            .text("reflections", "")
            .text("artifactContent", existing_artifact.unwrap_or(""));
        let vars = with_json(vars, "requirementsAnalysis", requirements, "requirements")?;
        let messages = vec![Message::system(self.render(PromptKind::Blueprint, &vars))];

        self.gateway
            .complete_structured_checked(
                &self.models.ui_spec_synthesis,
                &messages,
                &OutputShape::advisory::<UiBlueprint>(BLUEPRINT_SCHEMA),
                CallOptions::default()
                    .temperature(BLUEPRINT_TEMPERATURE)
                    .max_completion_tokens(BLUEPRINT_MAX_TOKENS),
                UiBlueprint::check,
            )
            .await
            .map_err(|source| stage_error(Stage::Blueprint, source))
    }

    /// Generate `n` candidate pages, fences stripped, in request order.
    pub async fn generate_candidates(
        &self,
        requirements: &Requirements,
        blueprint: &UiBlueprint,
        prior: Option<PriorAttempt<'_>>,
        n: usize,
    ) -> Result<Vec<String>> {
        let vars = TemplateVars::new()
            .text("reflections", "")
            .text("webSearchResults", "")
            .text("updateMetaPrompt", "")
            .text("artifactContent", prior.map(|p| p.artifact).unwrap_or(""));
        let vars = with_json(vars, "requirementsAnalysis", requirements, "requirements")?;
        let vars = with_json(vars, "webDSL", blueprint, "blueprint")?;
        let vars = match prior {
            Some(prior) => with_json(vars, "evaluationResults", prior.evaluation, "evaluation")?,
            None => vars.text("evaluationResults", ""),
        };
        let messages = vec![Message::user(self.render(PromptKind::Candidate, &vars))];

        let samples = self
            .gateway
            .complete_text_samples(
                &self.models.coding,
                &messages,
                n,
                CallOptions::default().max_completion_tokens(ARTIFACT_MAX_TOKENS),
            )
            .await
            .map_err(|source| stage_error(Stage::Candidate, source))?;

        Ok(samples.iter().map(|raw| strip_code_fences(raw)).collect())
    }

    /// Build the weighted rubric for this request.
    pub async fn build_rubric(&self, requirements: &Requirements) -> Result<Rubric> {
        let vars = with_json(
            TemplateVars::new(),
            "requirementsContext",
            requirements,
            "requirements",
        )?;
        let messages = vec![Message::system(self.render(PromptKind::Rubric, &vars))];

        let rubric: Rubric = self
            .gateway
            .complete_structured_checked(
                &self.models.evaluation,
                &messages,
                &OutputShape::strict::<Rubric>(RUBRIC_SCHEMA),
                CallOptions::default().max_completion_tokens(JUDGE_MAX_TOKENS),
                Rubric::check,
            )
            .await
            .map_err(|source| stage_error(Stage::Rubric, source))?;

        debug!(
            metrics = rubric.metrics.len(),
            weight_sum = rubric.weight_sum(),
            "Rubric built"
        );
        Ok(rubric)
    }

    /// Score one candidate absolutely, or several comparatively.
    pub async fn score_candidates(
        &self,
        requirements: &Requirements,
        rubric: &Rubric,
        candidates: &[Candidate],
    ) -> Result<EvaluationResult> {
        let vars = TemplateVars::new().text("reflectionsContext", "");
        let vars = with_json(vars, "requirementsContext", requirements, "requirements")?;
        let vars = with_json(vars, "evaluationMetrics", rubric, "rubric")?;
        let vars = with_json(vars, "articlesContent", candidates, "candidates")?;
        let messages = vec![Message::system(self.render(PromptKind::Evaluation, &vars))];

        let submitted: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();

        self.gateway
            .complete_structured_checked(
                &self.models.evaluation,
                &messages,
                &OutputShape::strict::<EvaluationResult>(EVALUATION_SCHEMA),
                CallOptions::default().max_completion_tokens(JUDGE_MAX_TOKENS),
                |evaluation: &EvaluationResult| evaluation.check(&submitted),
            )
            .await
            .map_err(|source| stage_error(Stage::Evaluation, source))
    }

    /// Final clean-up pass; empty output falls back to `artifact`.
    pub async fn validate_artifact(&self, artifact: &str) -> Result<String> {
        let vars = TemplateVars::new().text("reflections", "");
        let messages = vec![
            Message::system(self.render(PromptKind::Validation, &vars)),
            Message::user(artifact),
        ];

        let validated = self
            .gateway
            .complete_text(
                &self.models.validation,
                &messages,
                CallOptions::default().max_completion_tokens(ARTIFACT_MAX_TOKENS),
            )
            .await
            .map_err(|source| stage_error(Stage::Validation, source))?;

        let cleaned = strip_code_fences(&validated);
        if cleaned.is_empty() {
            debug!("Validation returned nothing, keeping the pre-validation artifact");
            return Ok(artifact.to_string());
        }
        Ok(cleaned)
    }

    fn render(&self, kind: PromptKind, vars: &TemplateVars) -> String {
        interpolate(self.templates.get(kind), vars)
    }
}

fn with_json<T: Serialize + ?Sized>(
    vars: TemplateVars,
    name: &str,
    value: &T,
    what: &'static str,
) -> Result<TemplateVars> {
    vars.json(name, value)
        .map_err(|source| PipelineError::Encode { what, source })
}

fn stage_error(stage: Stage, source: genui_ai::GatewayError) -> PipelineError {
    PipelineError::Stage { stage, source }
}

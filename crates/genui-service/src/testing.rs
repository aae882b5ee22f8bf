// ABOUTME: Scripted model landscape and configuration for service and API tests
// ABOUTME: Every stage answers with canned output routed by model id and schema

use genui_ai::testing::{ScriptedCall, ScriptedProvider, ScriptedReply};
use genui_core::{GenUiConfig, ModelsConfig, StoppingRuleKind};
use genui_pipeline::{EVALUATION_SCHEMA, RUBRIC_SCHEMA};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const REQUIREMENTS_MODEL: &str = "test/requirements";
pub const BLUEPRINT_MODEL: &str = "test/blueprint";
pub const CODER_MODEL: &str = "test/coder";
pub const JUDGE_MODEL: &str = "test/judge";
pub const VALIDATOR_MODEL: &str = "test/validator";

pub fn test_models() -> ModelsConfig {
    ModelsConfig {
        requirement_analysis: REQUIREMENTS_MODEL.to_string(),
        ui_spec_synthesis: BLUEPRINT_MODEL.to_string(),
        coding: CODER_MODEL.to_string(),
        evaluation: JUDGE_MODEL.to_string(),
        validation: VALIDATOR_MODEL.to_string(),
    }
}

/// In-memory configuration with one refinement iteration and no retry backoff.
pub fn test_config() -> GenUiConfig {
    let mut config = GenUiConfig::default();
    config.models = test_models();
    config.gateway.max_attempts = 2;
    config.gateway.call_timeout_secs = 5;
    config.gateway.retry_backoff_ms = 0;
    config.refinement.max_iterations = 1;
    config.refinement.target_score = 90.0;
    config.refinement.stopping_rule = StoppingRuleKind::TargetOnly;
    config.scheduler.max_concurrent_runs = 2;
    config
}

#[derive(Debug, Clone)]
pub struct PipelineScript {
    pub initial_score: f64,
    pub refined_score: f64,
    /// Delay before every coder reply
    pub coder_delay: Duration,
    pub coder_fails: bool,
    pub coder_panics: bool,
}

impl Default for PipelineScript {
    fn default() -> Self {
        Self {
            initial_score: 80.0,
            refined_score: 88.0,
            coder_delay: Duration::ZERO,
            coder_fails: false,
            coder_panics: false,
        }
    }
}

fn evaluation(winner: &str, score: f64) -> serde_json::Value {
    json!({
        "articleComparison": [{
            "articleId": winner,
            "scores": [{"score": score, "comment": "ok"}],
            "overall": {"totalScore": score, "strengths": ["layout"], "weaknesses": ["contrast"]}
        }],
        "bestArticle": {"articleId": winner, "totalScore": score, "justification": "best"}
    })
}

fn reply(script: &PipelineScript, call: &ScriptedCall) -> ScriptedReply {
    let model = call.model.as_str();
    if model.contains("requirements") {
        return ScriptedReply::json(json!({
            "mainGoal": "Deliver the requested page",
            "keyFeatures": ["hero", "call to action"]
        }));
    }
    if model.contains("blueprint") {
        return ScriptedReply::json(json!({
            "description": "Single page",
            "elements": [
                {"id": "root", "elementType": "main"},
                {"id": "hero", "parentId": "root", "elementType": "section"}
            ]
        }));
    }
    if model.contains("coder") {
        if script.coder_panics {
            panic!("coder exploded");
        }
        let reply = if script.coder_fails {
            ScriptedReply::fail("coder unavailable")
        } else if call.user_prompt().contains("<html>initial</html>") {
            ScriptedReply::content("```html\n<html>refined</html>\n```")
        } else {
            ScriptedReply::content("```html\n<html>initial</html>\n```")
        };
        return if script.coder_delay.is_zero() {
            reply
        } else {
            reply.after(script.coder_delay)
        };
    }
    if model.contains("judge") {
        return match call.schema_name() {
            Some(RUBRIC_SCHEMA) => ScriptedReply::json(json!({"metrics": [
                {"name": "Fit", "description": "Matches the prompt", "weight": 1.0, "criteria": ["hero present"]}
            ]})),
            Some(EVALUATION_SCHEMA) if call.system_prompt().contains("Candidate v1") => {
                ScriptedReply::json(evaluation("v1", script.initial_score))
            }
            Some(EVALUATION_SCHEMA) => ScriptedReply::json(evaluation("new", script.refined_score)),
            other => ScriptedReply::fail(format!("unexpected schema {:?}", other)),
        };
    }
    if model.contains("validator") {
        return ScriptedReply::content(format!("```html\n{}\n```", call.user_prompt()));
    }
    ScriptedReply::fail(format!("unknown model {}", model))
}

/// Provider answering every pipeline stage according to `script`.
pub fn scripted_pipeline(script: PipelineScript) -> Arc<ScriptedProvider> {
    Arc::new(ScriptedProvider::new(move |call| reply(&script, call)))
}

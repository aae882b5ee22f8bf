// ABOUTME: Typed outputs of the structured pipeline stages
// ABOUTME: Field docs double as schema descriptions sent to the model

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Structured distillation of what the user asked for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Requirements {
    /// The main goal or objective of the page to be created
    pub main_goal: String,
    /// Key features and content areas, including layout structure and navigation
    #[serde(default)]
    pub key_features: Vec<String>,
    /// HTML structure, styling, scripting and any required libraries
    #[serde(default)]
    pub technical_requirements: Vec<String>,
    /// Design preferences: colours, typography, spacing, motion, overall style
    #[serde(default)]
    pub preferences: Vec<String>,
    /// Performance, compatibility and other technical considerations
    #[serde(default)]
    pub considerations: Vec<String>,
    /// Concrete UI components such as buttons, forms, cards and dialogs
    #[serde(default)]
    pub ui_components: Vec<String>,
    /// User interactions: hovers, clicks, validation, transitions
    #[serde(default)]
    pub interactions: Vec<String>,
    /// Charts, graphs or tables the page should display, if any
    #[serde(default)]
    pub data_visualization: Vec<String>,
    /// Behaviour across screen sizes and devices
    #[serde(default)]
    pub responsive_layouts: Vec<String>,
    /// ARIA usage, keyboard navigation, screen reader support and contrast
    #[serde(default)]
    pub accessibility_features: Vec<String>,
    /// How the page solves the user's problem, step by step, with success criteria
    #[serde(default)]
    pub problem_solution_approach: Vec<String>,
}

impl Requirements {
    pub fn check(&self) -> Result<(), String> {
        if self.main_goal.trim().is_empty() {
            return Err("mainGoal must not be empty".to_string());
        }
        Ok(())
    }
}

/// Semi-structured UI blueprint.
///
/// Only the envelope is typed: element ids and parent references. States,
/// flows, metadata and any other keys stay as the model wrote them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UiBlueprint {
    /// Brief summary of the page's purpose and main functionality
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Page metadata, e.g. `{"title": "..."}` for the browser tab
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Page-level state variables: `name`, `initialValue` and an optional `description`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub states: Option<Value>,
    /// Flat element list; nesting is expressed through `parentId`
    #[serde(default, deserialize_with = "null_as_default")]
    pub elements: Vec<BlueprintElement>,
    /// User journeys through the page: `name`, `description` and ordered `steps`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flows: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintElement {
    /// Unique element identifier, referenced by `parentId`
    pub id: String,
    /// Id of the containing element; omitted for root elements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// HTML tag or component name, e.g. `button` or `pricingCard`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<Value>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl BlueprintElement {
    pub fn element_type(&self) -> Option<&str> {
        self.element_type.as_ref().and_then(Value::as_str)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl UiBlueprint {
    /// Envelope check: element ids are non-empty and unique.
    pub fn check(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for element in &self.elements {
            if element.id.trim().is_empty() {
                return Err("element with empty id".to_string());
            }
            if !seen.insert(element.id.as_str()) {
                return Err(format!("duplicate element id '{}'", element.id));
            }
        }
        Ok(())
    }

    pub fn element(&self, id: &str) -> Option<&BlueprintElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    /// Elements without a parent, or whose parent id names no element.
    pub fn roots(&self) -> Vec<&BlueprintElement> {
        self.elements
            .iter()
            .filter(|e| match e.parent_id.as_deref() {
                None | Some("") => true,
                Some(parent) => self.element(parent).is_none(),
            })
            .collect()
    }

    pub fn children(&self, id: &str) -> Vec<&BlueprintElement> {
        self.elements
            .iter()
            .filter(|e| e.parent_id.as_deref() == Some(id))
            .collect()
    }
}

/// Weighted scoring rubric built for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Rubric {
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Metric {
    /// Name of the evaluation metric
    pub name: String,
    /// What this metric evaluates
    #[serde(default)]
    pub description: String,
    /// Share of the overall score, between 0 and 1
    pub weight: f64,
    /// Specific checks a reviewer performs for this metric
    #[serde(default)]
    pub criteria: Vec<String>,
}

impl Rubric {
    pub fn check(&self) -> Result<(), String> {
        if self.metrics.is_empty() {
            return Err("rubric has no metrics".to_string());
        }
        Ok(())
    }

    pub fn weight_sum(&self) -> f64 {
        self.metrics.iter().map(|m| m.weight.max(0.0)).sum()
    }

    /// Combine per-metric scores (in rubric order) into one 0-100 total.
    ///
    /// Weights are relative: they are normalised by their sum. Without usable
    /// weights the plain mean is used. Extra scores beyond the rubric are ignored.
    pub fn weighted_score(&self, scores: &[f64]) -> f64 {
        let pairs: Vec<(f64, f64)> = self
            .metrics
            .iter()
            .map(|m| if m.weight.is_finite() { m.weight.max(0.0) } else { 0.0 })
            .zip(scores.iter().copied())
            .filter(|(_, score)| score.is_finite())
            .collect();

        if pairs.is_empty() {
            return 0.0;
        }

        let weight_sum: f64 = pairs.iter().map(|(w, _)| w).sum();
        let total = if weight_sum > 0.0 {
            pairs.iter().map(|(w, s)| w * s).sum::<f64>() / weight_sum
        } else {
            pairs.iter().map(|(_, s)| s).sum::<f64>() / pairs.len() as f64
        };

        clamp_score(total)
    }
}

/// One page submitted for scoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub title: String,
    pub html: String,
}

impl Candidate {
    pub fn new(id: impl Into<String>, title: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            html: html.into(),
        }
    }
}

/// Judge output for a set of candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    /// One entry per submitted article
    pub article_comparison: Vec<ArticleEvaluation>,
    /// The single best article
    pub best_article: BestArticle,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArticleEvaluation {
    /// Id of the article as submitted
    pub article_id: String,
    /// One score per rubric metric, in rubric order
    #[serde(default)]
    pub scores: Vec<CommentedScore>,
    /// How well the article matches the user's content preferences
    #[serde(default)]
    pub content_preferences: Option<CommentedScore>,
    /// How well the article matches the user's style preferences
    #[serde(default)]
    pub style_preferences: Option<CommentedScore>,
    pub overall: OverallAssessment,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CommentedScore {
    /// Score between 0 and 100
    pub score: f64,
    /// One-sentence comment
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OverallAssessment {
    /// Final score for this article, between 0 and 100
    #[serde(default)]
    pub total_score: Option<f64>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BestArticle {
    /// Id of the best article; must be one of the submitted ids
    pub article_id: String,
    /// Total score of the best article, between 0 and 100
    #[serde(default)]
    pub total_score: Option<f64>,
    /// One-sentence justification
    #[serde(default)]
    pub justification: String,
}

impl EvaluationResult {
    /// Every id in the breakdown, and the winner, must be a submitted id.
    pub fn check(&self, submitted: &[&str]) -> Result<(), String> {
        for entry in &self.article_comparison {
            if !submitted.contains(&entry.article_id.as_str()) {
                return Err(format!(
                    "evaluation mentions unknown article '{}'",
                    entry.article_id
                ));
            }
        }
        if !submitted.contains(&self.best_article.article_id.as_str()) {
            return Err(format!(
                "best article '{}' was not submitted",
                self.best_article.article_id
            ));
        }
        Ok(())
    }

    pub fn winner_id(&self) -> &str {
        &self.best_article.article_id
    }

    pub fn breakdown(&self, id: &str) -> Option<&ArticleEvaluation> {
        self.article_comparison.iter().find(|a| a.article_id == id)
    }

    /// Score of candidate `id` in this evaluation, clamped to 0-100.
    ///
    /// The winner's headline total is preferred, then the candidate's own overall
    /// total, then the rubric-weighted mean of its metric scores.
    pub fn score_of(&self, id: &str, rubric: &Rubric) -> Option<f64> {
        let headline = if self.best_article.article_id == id {
            self.best_article.total_score.filter(|s| s.is_finite())
        } else {
            None
        };

        headline
            .or_else(|| {
                let entry = self.breakdown(id)?;
                entry.overall.total_score.filter(|s| s.is_finite()).or_else(|| {
                    if entry.scores.is_empty() {
                        return None;
                    }
                    let scores: Vec<f64> = entry.scores.iter().map(|s| s.score).collect();
                    Some(rubric.weighted_score(&scores))
                })
            })
            .map(clamp_score)
    }

    /// Score of the designated winner, falling back to the first breakdown entry, then 0.
    pub fn resolved_score(&self, rubric: &Rubric) -> f64 {
        self.score_of(self.winner_id(), rubric)
            .or_else(|| {
                let first = self.article_comparison.first()?;
                self.score_of(&first.article_id, rubric)
            })
            .unwrap_or(0.0)
    }
}

pub(crate) fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rubric(weights: &[f64]) -> Rubric {
        Rubric {
            metrics: weights
                .iter()
                .enumerate()
                .map(|(i, w)| Metric {
                    name: format!("m{}", i),
                    weight: *w,
                    ..Default::default()
                })
                .collect(),
        }
    }

    fn evaluation(value: serde_json::Value) -> EvaluationResult {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_requirements_need_main_goal() {
        let empty = Requirements::default();
        assert!(empty.check().is_err());

        let parsed: Requirements = serde_json::from_value(json!({
            "mainGoal": "Sell three plans",
            "keyFeatures": ["plan cards"]
        }))
        .unwrap();
        assert!(parsed.check().is_ok());
        assert!(parsed.interactions.is_empty());
    }

    #[test]
    fn test_blueprint_keeps_open_attributes() {
        let blueprint: UiBlueprint = serde_json::from_value(json!({
            "description": "Pricing page",
            "metadata": {"title": "Pricing"},
            "states": null,
            "elements": [
                {"id": "root", "elementType": "main", "className": ["p-4"]},
                {"id": "card", "parentId": "root", "elementType": "pricingCard", "content": "Pro"},
                {"id": "orphan", "parentId": "missing", "elementType": "div"}
            ],
            "theme": {"accent": "indigo"}
        }))
        .unwrap();

        assert!(blueprint.check().is_ok());
        assert_eq!(blueprint.extra["theme"]["accent"], "indigo");
        assert_eq!(blueprint.elements[1].attributes["content"], "Pro");

        let roots: Vec<&str> = blueprint.roots().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(roots, vec!["root", "orphan"]);
        assert_eq!(blueprint.children("root")[0].id, "card");

        let round_trip = serde_json::to_value(&blueprint).unwrap();
        assert_eq!(round_trip["elements"][0]["className"][0], "p-4");
    }

    #[test]
    fn test_blueprint_tolerates_loose_sections() {
        let blueprint: UiBlueprint = serde_json::from_value(json!({
            "description": null,
            "metadata": {"title": 42},
            "states": [{"name": "yearly", "initialValue": false}],
            "elements": [{"id": "root", "elementType": "main"}, {"id": "n", "elementType": 3}],
            "flows": [{"name": "buy", "steps": [{"action": "click", "target": "cta"}]}]
        }))
        .unwrap();

        assert!(blueprint.check().is_ok());
        assert!(blueprint.description.is_none());
        assert_eq!(blueprint.states.as_ref().unwrap()[0]["initialValue"], false);
        assert_eq!(blueprint.elements[0].element_type(), Some("main"));
        assert_eq!(blueprint.elements[1].element_type(), None);

        let empty: UiBlueprint = serde_json::from_value(json!({"elements": null})).unwrap();
        assert!(empty.elements.is_empty());
    }

    #[test]
    fn test_blueprint_rejects_duplicate_ids() {
        let blueprint: UiBlueprint = serde_json::from_value(json!({
            "elements": [{"id": "a"}, {"id": "a"}]
        }))
        .unwrap();
        assert!(blueprint.check().unwrap_err().contains("duplicate"));
    }

    #[test]
    fn test_weighted_score_normalises_relative_weights() {
        let score = rubric(&[2.0, 1.0, 1.0]).weighted_score(&[100.0, 50.0, 50.0]);
        assert!((score - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_score_is_bounded_for_synthetic_rubrics() {
        let score = rubric(&[3.0, -1.0]).weighted_score(&[250.0, -40.0]);
        assert!((0.0..=100.0).contains(&score));

        let zero = rubric(&[0.0, 0.0]).weighted_score(&[60.0, 80.0]);
        assert!((zero - 70.0).abs() < 1e-9);

        assert_eq!(rubric(&[]).weighted_score(&[90.0]), 0.0);
    }

    #[test]
    fn test_non_finite_score_drops_only_its_metric() {
        let score = rubric(&[0.5, 0.25, 0.25]).weighted_score(&[f64::NAN, 40.0, 80.0]);
        assert!((score - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_evaluation_check_rejects_unknown_ids() {
        let eval = evaluation(json!({
            "articleComparison": [{"articleId": "prev", "overall": {"totalScore": 80}}],
            "bestArticle": {"articleId": "other", "totalScore": 80, "justification": ""}
        }));
        assert!(eval.check(&["prev", "new"]).is_err());
        assert!(eval.check(&["prev", "other"]).is_ok());
    }

    #[test]
    fn test_score_resolution_chain() {
        let rubric = rubric(&[0.5, 0.5]);
        let eval = evaluation(json!({
            "articleComparison": [
                {"articleId": "prev", "scores": [{"score": 70}, {"score": 90}], "overall": {}},
                {"articleId": "new", "overall": {"totalScore": 88}}
            ],
            "bestArticle": {"articleId": "new", "totalScore": 120}
        }));

        assert_eq!(eval.score_of("new", &rubric), Some(100.0));
        assert_eq!(eval.score_of("prev", &rubric), Some(80.0));
        assert_eq!(eval.score_of("absent", &rubric), None);
        assert_eq!(eval.resolved_score(&rubric), 100.0);
    }

    #[test]
    fn test_resolved_score_defaults_to_zero() {
        let eval = evaluation(json!({
            "articleComparison": [],
            "bestArticle": {"articleId": "v1"}
        }));
        assert_eq!(eval.resolved_score(&Rubric::default()), 0.0);
    }
}

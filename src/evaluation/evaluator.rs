//! The poem evaluator.
//!
//! Runs the four validation dimensions, combines them into a [`Quality`]
//! under the configured weights and thresholds, and attaches the result to
//! the poem. Also exposes partial re-evaluation so the refiner chain can
//! refresh only the dimensions a refiner claims to affect.

use async_trait::async_trait;

use super::dimensions;
use super::scoring;
use crate::capture::CallType;
use crate::config::{EvaluationThresholds, NodeSpec, PipelineConfig, ScoringWeights};
use crate::constraints::Constraints;
use crate::pipeline::context::{keys, PipelineContext};
use crate::pipeline::node::{NodeEnv, NodeError, NodeOutput, PipelineNode};
use crate::poem::{Dimension, DimensionResult, Poem, Quality};
use serde_json::json;

/// Four-dimension quality evaluator.
pub struct PoemEvaluator {
    name: String,
    weights: ScoringWeights,
    thresholds: EvaluationThresholds,
}

impl PoemEvaluator {
    #[must_use]
    pub fn from_spec(spec: &NodeSpec, config: &PipelineConfig) -> Self {
        Self {
            name: spec.display_name().to_string(),
            weights: config.evaluation.weights,
            thresholds: config.evaluation.thresholds,
        }
    }

    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            name: "evaluator".to_string(),
            weights: config.evaluation.weights,
            thresholds: config.evaluation.thresholds,
        }
    }

    /// Full evaluation across all four dimensions.
    pub async fn evaluate(
        &self,
        poem: &Poem,
        constraints: &Constraints,
        env: &NodeEnv,
    ) -> Result<Quality, NodeError> {
        let line_count = dimensions::validate_line_count(poem, constraints);
        let diacritics = dimensions::validate_diacritics(poem, env).await?;
        let prosody = dimensions::validate_prosody(poem, constraints, env).await?;
        let rhyme = dimensions::validate_rhyme(poem, constraints, env).await?;
        Ok(self.assemble(poem, prosody, rhyme, line_count, diacritics))
    }

    /// Re-run only `dims`, keeping the other dimensions from `stale`.
    pub async fn evaluate_dimensions(
        &self,
        poem: &Poem,
        constraints: &Constraints,
        dims: &[Dimension],
        stale: &Quality,
        env: &NodeEnv,
    ) -> Result<Quality, NodeError> {
        let mut prosody = stale.prosody.clone();
        let mut rhyme = stale.rhyme.clone();
        let mut line_count = stale.line_count.clone();
        let mut diacritics = stale.diacritics.clone();

        for dim in dims {
            match dim {
                Dimension::Prosody => {
                    prosody = dimensions::validate_prosody(poem, constraints, env).await?;
                }
                Dimension::Rhyme => {
                    rhyme = dimensions::validate_rhyme(poem, constraints, env).await?;
                }
                Dimension::LineCount => {
                    line_count = dimensions::validate_line_count(poem, constraints);
                }
                Dimension::Diacritics => {
                    diacritics = dimensions::validate_diacritics(poem, env).await?;
                }
            }
        }
        Ok(self.assemble(poem, prosody, rhyme, line_count, diacritics))
    }

    fn assemble(
        &self,
        poem: &Poem,
        prosody: DimensionResult,
        rhyme: DimensionResult,
        line_count: DimensionResult,
        diacritics: DimensionResult,
    ) -> Quality {
        let overall =
            scoring::overall_score(&self.weights, &prosody, &rhyme, &line_count, &diacritics);
        let acceptable = scoring::is_acceptable(&self.thresholds, overall, &prosody, &rhyme);

        let mut issues = Vec::new();
        let mut recommendations = Vec::new();
        let pairs: [(Dimension, &DimensionResult, &str); 4] = [
            (
                Dimension::Prosody,
                &prosody,
                "أعد صياغة الأبيات المكسورة على تفعيلات البحر",
            ),
            (
                Dimension::Rhyme,
                &rhyme,
                "وحد حرف الروي وحركته في أواخر الأعجاز",
            ),
            (
                Dimension::LineCount,
                &line_count,
                "اضبط عدد الأبيات على المطلوب",
            ),
            (
                Dimension::Diacritics,
                &diacritics,
                "أكمل تشكيل الكلمات الناقصة",
            ),
        ];
        for (dim, result, advice) in pairs {
            if let Some(defect) = result.defect {
                issues.push(format!(
                    "{}: {} ({})",
                    dim.key(),
                    result.summary,
                    serde_json::to_string(&defect).unwrap_or_default()
                ));
            } else if !result.is_valid {
                issues.push(format!("{}: {}", dim.key(), result.summary));
                recommendations.push(advice.to_string());
            }
        }

        Quality {
            overall_score: overall,
            total_baits: poem.bait_count(),
            prosody,
            rhyme,
            line_count,
            diacritics,
            issues,
            recommendations,
            is_acceptable: acceptable,
        }
    }
}

#[async_trait]
impl PipelineNode for PoemEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    fn call_type(&self) -> CallType {
        CallType::Evaluate
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        &[keys::CONSTRAINTS, keys::POEM]
    }

    fn produced_outputs(&self) -> &'static [&'static str] {
        &[keys::POEM, keys::EVALUATION]
    }

    async fn run(&self, ctx: &PipelineContext, env: &NodeEnv) -> Result<NodeOutput, NodeError> {
        let poem = ctx.poem()?;
        let constraints = ctx.constraints()?;
        let quality = self.evaluate(&poem, &constraints, env).await?;
        let poem = poem.with_quality(quality.clone());
        NodeOutput::new()
            .with_poem(&poem)?
            .with_quality(&quality)
            .map(|out| out.with_value(keys::EVALUATION_DIRTY, json!(false)))
    }
}

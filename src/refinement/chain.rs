//! The refiner chain: iterative, ordered refinement with quality tracking.
//!
//! Each iteration re-checks acceptability, then gives every applicable
//! refiner one turn. After a refiner rewrites the poem, only the dimensions
//! it claims to affect are re-evaluated and merged with the stale results.
//! Two rails hold throughout: a refiner may never degrade the overall score
//! (its output is discarded instead), and a refiner failure is contained as a
//! failed step rather than aborting the chain. The chain always returns the
//! best poem seen.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::refiner::{CapturedRefiner, Refiner};
use super::specialists::{DiacriticsRefiner, LineCountRefiner, ProsodyRefiner, RhymeRefiner};
use crate::capture::CallType;
use crate::config::{NodeSpec, PipelineConfig};
use crate::constraints::Constraints;
use crate::evaluation::PoemEvaluator;
use crate::pipeline::context::{keys, PipelineContext};
use crate::pipeline::node::{NodeEnv, NodeError, NodeOutput, PipelineNode};
use crate::pipeline::registry::ConfigError;
use crate::poem::{Poem, Quality};

/// One recorded refinement step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefineStep {
    /// 1-based iteration this step belongs to.
    pub iteration: u32,
    pub refiner_name: String,
    pub score_before: f64,
    pub score_after: f64,
    pub delta: f64,
    #[serde(default)]
    pub no_change: bool,
    /// The refiner degraded quality and its output was thrown away.
    #[serde(default)]
    pub discarded: bool,
    /// The refiner (or its re-evaluation) failed internally.
    #[serde(default)]
    pub failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Summary returned under the `refinement` context key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefinementReport {
    pub iterations: u32,
    pub stalled: bool,
    pub refiners_ran: Vec<String>,
    pub history: Vec<RefineStep>,
}

#[derive(Debug, Default, Deserialize)]
struct ChainParams {
    #[serde(default)]
    refiners: Option<Vec<String>>,
    #[serde(default)]
    max_iterations: Option<u32>,
    #[serde(default)]
    target_quality: Option<f64>,
}

/// Ordered chain of specialist refiners with an iteration budget.
pub struct RefinerChain {
    name: String,
    refiners: Vec<Arc<dyn Refiner>>,
    evaluator: PoemEvaluator,
    max_iterations: u32,
    target_quality: f64,
    epsilon: f64,
}

impl RefinerChain {
    /// Build from a spec; params may restrict the refiner set or override
    /// the refinement budget.
    pub fn from_spec(spec: &NodeSpec, config: &PipelineConfig) -> Result<Self, ConfigError> {
        let params: ChainParams = if spec.params.is_null() {
            ChainParams::default()
        } else {
            serde_json::from_value(spec.params.clone()).map_err(|e| ConfigError::BadParams {
                node: spec.display_name().to_string(),
                reason: e.to_string(),
            })?
        };

        let names = params.refiners.unwrap_or_else(|| {
            vec![
                "line_count_refiner".to_string(),
                "prosody_refiner".to_string(),
                "rhyme_refiner".to_string(),
                "diacritics_refiner".to_string(),
            ]
        });
        let mut refiners: Vec<Arc<dyn Refiner>> = Vec::with_capacity(names.len());
        for name in &names {
            let refiner: Arc<dyn Refiner> = match name.as_str() {
                "line_count_refiner" => Arc::new(LineCountRefiner),
                "prosody_refiner" => Arc::new(ProsodyRefiner),
                "rhyme_refiner" => Arc::new(RhymeRefiner),
                "diacritics_refiner" => Arc::new(DiacriticsRefiner),
                other => {
                    return Err(ConfigError::BadParams {
                        node: spec.display_name().to_string(),
                        reason: format!("unknown refiner `{other}`"),
                    })
                }
            };
            refiners.push(Arc::new(CapturedRefiner::wrap(refiner)));
        }

        Ok(Self {
            name: spec.display_name().to_string(),
            refiners,
            evaluator: PoemEvaluator::from_config(config),
            max_iterations: params
                .max_iterations
                .unwrap_or(config.refinement.max_iterations),
            target_quality: params
                .target_quality
                .unwrap_or(config.refinement.target_quality),
            epsilon: config.refinement.epsilon,
        })
    }

    /// Direct constructor for programmatic wiring and tests.
    #[must_use]
    pub fn with_refiners(
        refiners: Vec<Arc<dyn Refiner>>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            name: "refiner_chain".to_string(),
            refiners: refiners
                .into_iter()
                .map(|r| Arc::new(CapturedRefiner::wrap(r)) as Arc<dyn Refiner>)
                .collect(),
            evaluator: PoemEvaluator::from_config(config),
            max_iterations: config.refinement.max_iterations,
            target_quality: config.refinement.target_quality,
            epsilon: config.refinement.epsilon,
        }
    }

    fn done(&self, quality: &Quality) -> bool {
        quality.is_acceptable || quality.overall_score >= self.target_quality
    }

    /// Full evaluation, recorded as its own captured call.
    async fn evaluate_captured(
        &self,
        poem: &Poem,
        constraints: &Constraints,
        env: &NodeEnv,
    ) -> Result<Quality, NodeError> {
        let guard = env.capture.begin(
            "evaluator",
            "evaluate",
            CallType::Evaluate,
            json!({"verses": poem.verses}),
        );
        match self.evaluator.evaluate(poem, constraints, env).await {
            Ok(quality) => {
                guard.finish(&json!({
                    "overall_score": quality.overall_score,
                    "is_acceptable": quality.is_acceptable,
                    "issues": quality.issues,
                }));
                Ok(quality)
            }
            Err(err) => {
                guard.fail(&err.to_string());
                Err(err)
            }
        }
    }
}

#[async_trait]
impl PipelineNode for RefinerChain {
    fn name(&self) -> &str {
        &self.name
    }

    fn call_type(&self) -> CallType {
        CallType::Refine
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        &[keys::CONSTRAINTS, keys::POEM]
    }

    fn produced_outputs(&self) -> &'static [&'static str] {
        &[keys::POEM, keys::EVALUATION, keys::REFINEMENT]
    }

    #[instrument(skip_all, fields(chain = %self.name))]
    async fn run(&self, ctx: &PipelineContext, env: &NodeEnv) -> Result<NodeOutput, NodeError> {
        let constraints = ctx.constraints()?;
        let mut poem = ctx.poem()?;

        // Reuse a clean attached quality; evaluate on entry otherwise.
        let mut quality = match poem.quality.clone() {
            Some(quality) if !ctx.evaluation_dirty() => quality,
            _ => match ctx.quality() {
                Ok(quality) if !ctx.evaluation_dirty() => quality,
                _ => self.evaluate_captured(&poem, &constraints, env).await?,
            },
        };

        let mut best_score = quality.overall_score;
        let mut best_poem = poem.clone().with_quality(quality.clone());
        let mut history: Vec<RefineStep> = Vec::new();
        let mut refiners_ran: Vec<String> = Vec::new();
        let mut iterations = 0u32;
        let mut stalled = false;

        for iteration in 1..=self.max_iterations {
            if self.done(&quality) {
                break;
            }
            env.cancel.ensure_active()?;

            let mut changed = false;
            for refiner in &self.refiners {
                env.cancel.ensure_active()?;
                if !refiner.applies(&poem, &quality) {
                    debug!(refiner = refiner.name(), "not applicable; skipping");
                    continue;
                }
                if !refiners_ran.iter().any(|n| n == refiner.name()) {
                    refiners_ran.push(refiner.name().to_string());
                }

                let score_before = quality.overall_score;
                let step_result = async {
                    let outcome = refiner.refine(&poem, &constraints, &quality, env).await?;
                    if outcome.no_change {
                        return Ok::<_, NodeError>((None, outcome.details));
                    }
                    let candidate = outcome.poem;
                    let after = self
                        .evaluator
                        .evaluate_dimensions(
                            &candidate,
                            &constraints,
                            refiner.affects(),
                            &quality,
                            env,
                        )
                        .await?;
                    Ok((Some((candidate, after)), outcome.details))
                }
                .await;

                match step_result {
                    Err(err) if err.is_cancellation() => return Err(err),
                    Err(err) => {
                        warn!(refiner = refiner.name(), error = %err, "refiner failed; keeping prior poem");
                        history.push(RefineStep {
                            iteration,
                            refiner_name: refiner.name().to_string(),
                            score_before,
                            score_after: score_before,
                            delta: 0.0,
                            no_change: false,
                            discarded: false,
                            failed: true,
                            details: Some(err.to_string()),
                        });
                    }
                    Ok((None, details)) => {
                        history.push(RefineStep {
                            iteration,
                            refiner_name: refiner.name().to_string(),
                            score_before,
                            score_after: score_before,
                            delta: 0.0,
                            no_change: true,
                            discarded: false,
                            failed: false,
                            details,
                        });
                    }
                    Ok((Some((candidate, after)), details)) => {
                        let score_after = after.overall_score;
                        let degraded = score_after < score_before - self.epsilon;
                        history.push(RefineStep {
                            iteration,
                            refiner_name: refiner.name().to_string(),
                            score_before,
                            score_after,
                            delta: score_after - score_before,
                            no_change: false,
                            discarded: degraded,
                            failed: false,
                            details,
                        });
                        if degraded {
                            // Hard rail: a refiner never degrades quality.
                            warn!(
                                refiner = refiner.name(),
                                before = score_before,
                                after = score_after,
                                "refiner degraded quality; output discarded"
                            );
                            continue;
                        }
                        poem = candidate.with_quality(after.clone());
                        quality = after;
                        changed = true;
                        if quality.overall_score > best_score {
                            best_score = quality.overall_score;
                            best_poem = poem.clone();
                        }
                    }
                }
            }

            iterations = iteration;
            if self.done(&quality) {
                break;
            }
            if !changed {
                stalled = true;
                info!(iteration, "no refiner produced a change; stalling");
                break;
            }
        }

        let report = RefinementReport {
            iterations,
            stalled,
            refiners_ran,
            history,
        };
        let final_quality = best_poem
            .quality
            .clone()
            .unwrap_or(quality);

        NodeOutput::new()
            .with_poem(&best_poem)?
            .with_quality(&final_quality)
            .map(|out| {
                out.with_value(keys::REFINEMENT, serde_json::to_value(&report).unwrap_or_default())
                    .with_value(keys::EVALUATION_DIRTY, json!(false))
            })
    }
}

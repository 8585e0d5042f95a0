//! Best-of-N wrapper node.
//!
//! Runs an inner node N times with a temperature schedule, gathers the
//! successful candidates, and asks a judge LLM to pick the winner. The parent
//! context stays read-only for candidates; exactly one winner's output is
//! merged back, tagged with selection metadata. Candidate executions are
//! independent tokio tasks — the only source of in-pipeline parallelism.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::task::JoinSet;
use tracing::warn;

use super::context::{keys, PipelineContext};
use super::node::{NodeEnv, NodeError, NodeOutput, PipelineNode};
use super::registry::{BuildContext, ConfigError, NodeRegistry};
use crate::capture::CallType;
use crate::config::NodeSpec;
use crate::prompts::PromptParams;
use crate::utils::json_ext;

#[derive(Debug, Deserialize)]
struct BestOfNParams {
    inner: NodeSpec,
    #[serde(default)]
    n_candidates: Option<usize>,
    #[serde(default)]
    temperature_range: Option<Vec<f64>>,
    #[serde(default)]
    selection_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SelectionReply {
    selected_candidate: usize,
    #[serde(default)]
    reasoning: Option<String>,
}

struct Candidate {
    index: usize,
    temperature: f64,
    output: NodeOutput,
}

/// Fan-out/select wrapper around any [`PipelineNode`].
pub struct BestOfN {
    name: String,
    inner: Arc<dyn PipelineNode>,
    n: usize,
    temperatures: Vec<f64>,
    selection_prompt: String,
}

impl BestOfN {
    /// Build from a spec whose params carry the inner node spec and optional
    /// overrides of the `best_of_n` config section.
    pub fn from_spec(
        spec: &NodeSpec,
        build: &BuildContext,
        registry: &NodeRegistry,
    ) -> Result<Self, ConfigError> {
        let params: BestOfNParams =
            serde_json::from_value(spec.params.clone()).map_err(|e| ConfigError::BadParams {
                node: spec.display_name().to_string(),
                reason: format!("expected {{inner, n_candidates?, temperature_range?, selection_prompt?}}: {e}"),
            })?;
        let defaults = &build.config.best_of_n;
        let inner = registry.create(&params.inner, build)?;
        let temperatures = params
            .temperature_range
            .unwrap_or_else(|| defaults.temperature_range.clone());
        if temperatures.is_empty() {
            return Err(ConfigError::BadParams {
                node: spec.display_name().to_string(),
                reason: "temperature_range must not be empty".to_string(),
            });
        }
        Ok(Self {
            name: spec.name.clone().unwrap_or_else(|| "best_of_n".to_string()),
            inner,
            n: params.n_candidates.unwrap_or(defaults.n_candidates).max(1),
            temperatures,
            selection_prompt: params
                .selection_prompt
                .unwrap_or_else(|| defaults.selection_prompt.clone()),
        })
    }

    /// Direct constructor for programmatic wiring and tests.
    #[must_use]
    pub fn wrap(
        name: impl Into<String>,
        inner: Arc<dyn PipelineNode>,
        n: usize,
        temperatures: Vec<f64>,
        selection_prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            inner,
            n: n.max(1),
            temperatures,
            selection_prompt: selection_prompt.into(),
        }
    }

    /// Render candidate artifacts for the judge prompt.
    fn render_candidates(&self, candidates: &[Candidate]) -> String {
        candidates
            .iter()
            .map(|c| {
                let artifact = c
                    .output
                    .get(keys::POEM)
                    .and_then(|p| p.get("verses"))
                    .and_then(Value::as_array)
                    .map(|verses| {
                        verses
                            .iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join("\n")
                    })
                    .unwrap_or_else(|| c.output.to_value().to_string());
                format!(
                    "### المسودة {} (درجة الحرارة {}):\n{}",
                    c.index, c.temperature, artifact
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn selection_params(&self, ctx: &PipelineContext, candidates: &[Candidate]) -> PromptParams {
        let constraints = ctx.constraints().unwrap_or_default();
        let unspecified = || "غير محدد".to_string();
        let mut params = PromptParams::default();
        params.insert(
            "meter".into(),
            constraints.meter.clone().unwrap_or_else(unspecified),
        );
        params.insert(
            "qafiya".into(),
            constraints
                .rhyme_letter
                .map(|c| c.to_string())
                .unwrap_or_else(unspecified),
        );
        params.insert(
            "line_count".into(),
            constraints
                .line_count
                .map(|n| n.to_string())
                .unwrap_or_else(unspecified),
        );
        params.insert(
            "theme".into(),
            constraints.theme.clone().unwrap_or_else(unspecified),
        );
        params.insert(
            "tone".into(),
            constraints.tone.clone().unwrap_or_else(unspecified),
        );
        params.insert(
            "original_poem".into(),
            ctx.poem().map(|p| p.text()).unwrap_or_default(),
        );
        params.insert("n_candidates".into(), candidates.len().to_string());
        params.insert("candidates".into(), self.render_candidates(candidates));
        params
    }

    /// Ask the judge which candidate wins; fall back to candidate 0 on an
    /// unusable or out-of-range reply.
    async fn select(
        &self,
        ctx: &PipelineContext,
        env: &NodeEnv,
        candidates: &[Candidate],
    ) -> Result<(usize, Value), NodeError> {
        let prompt = env
            .prompts
            .format(&self.selection_prompt, &self.selection_params(ctx, candidates))?;

        let guard = env.capture.begin(
            &self.name,
            "select_best",
            CallType::Process,
            json!({
                "n_candidates": candidates.len(),
                "temperatures": candidates.iter().map(|c| c.temperature).collect::<Vec<_>>(),
            }),
        );

        let reply = match env.generate(&prompt).await {
            Ok(reply) => reply,
            Err(err) => {
                guard.fail(&err.to_string());
                return Err(err.into());
            }
        };

        let (selected, metadata) = match json_ext::parse_reply::<SelectionReply>(&reply.text) {
            Ok(selection) if selection.selected_candidate < candidates.len() => {
                let meta = json!({
                    "selected_candidate": selection.selected_candidate,
                    "reasoning": selection.reasoning,
                });
                (selection.selected_candidate, meta)
            }
            Ok(selection) => {
                warn!(
                    selected = selection.selected_candidate,
                    available = candidates.len(),
                    "judge selected an out-of-range candidate; falling back to 0"
                );
                (0, json!({"selected_candidate": 0, "fallback": "out_of_range"}))
            }
            Err(err) => {
                warn!(error = %err, "judge reply unparseable; falling back to candidate 0");
                (0, json!({"selected_candidate": 0, "fallback": "parse_error"}))
            }
        };

        guard.finish(&metadata);
        Ok((selected, metadata))
    }
}

#[async_trait]
impl PipelineNode for BestOfN {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        self.inner.required_inputs()
    }

    fn produced_outputs(&self) -> &'static [&'static str] {
        self.inner.produced_outputs()
    }

    fn validate_output(&self, output: &NodeOutput) -> bool {
        // The all-failed escape hatch leaves the parent context unchanged.
        output.contains_key(keys::ALL_FAILED)
            || self
                .produced_outputs()
                .iter()
                .all(|k| output.contains_key(k))
    }

    async fn run(&self, ctx: &PipelineContext, env: &NodeEnv) -> Result<NodeOutput, NodeError> {
        env.cancel.ensure_active()?;

        let shared_ctx = Arc::new(ctx.clone());
        let mut tasks = JoinSet::new();
        for index in 0..self.n {
            let temperature = self.temperatures[index % self.temperatures.len()];
            let inner = Arc::clone(&self.inner);
            let candidate_ctx = Arc::clone(&shared_ctx);
            let candidate_env = env.for_candidate(index, temperature);
            tasks.spawn(async move {
                // Each candidate runs under its own captured call so LLM
                // annotations land on the right record.
                let guard = candidate_env.capture.begin(
                    inner.name(),
                    "run",
                    inner.call_type(),
                    json!({
                        "candidate_index": index,
                        "candidate_temperature": temperature,
                    }),
                );
                let result = inner.run(&candidate_ctx, &candidate_env).await;
                match &result {
                    Ok(output) => guard.finish(&output.to_value()),
                    Err(err) => guard.fail(&err.to_string()),
                }
                (index, temperature, result)
            });
        }

        let mut slots: Vec<Option<Candidate>> = (0..self.n).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, temperature, Ok(output))) => {
                    slots[index] = Some(Candidate {
                        index,
                        temperature,
                        output,
                    });
                }
                Ok((index, _, Err(err))) => {
                    warn!(candidate = index, error = %err, "candidate failed; skipping");
                }
                Err(join_err) => {
                    warn!(error = %join_err, "candidate task panicked; skipping");
                }
            }
        }
        env.cancel.ensure_active()?;

        let candidates: Vec<Candidate> = slots.into_iter().flatten().collect();
        if candidates.is_empty() {
            warn!("all candidates failed; returning parent context unchanged");
            return Ok(NodeOutput::new().with_value(keys::ALL_FAILED, json!(true)));
        }

        let (winner_index, metadata) = if candidates.len() == 1 {
            (0, json!({"selected_candidate": 0, "sole_survivor": true}))
        } else {
            self.select(ctx, env, &candidates).await?
        };

        let winner = &candidates[winner_index];
        let mut output = NodeOutput::new();
        for key in winner.output.key_names() {
            if let Some(value) = winner.output.get(key) {
                output = output.with_value(key, value.clone());
            }
        }
        Ok(output
            .with_value(keys::CANDIDATE_INDEX, json!(winner.index))
            .with_value(keys::CANDIDATE_TEMPERATURE, json!(winner.temperature))
            .with_value(keys::SELECTION, metadata))
    }
}

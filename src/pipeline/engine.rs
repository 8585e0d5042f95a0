//! The pipeline engine: ordered node execution against a shared context.
//!
//! The engine owns the context. For each node in order it validates input,
//! runs the node, merges the returned keys, and validates output — all under
//! capture instrumentation. Any node failure terminates the run; the partial
//! context rides in the error so front-ends can report how far the run got.
//! The engine never retries a node: retries live inside the components that
//! own the recovery policy.

use std::sync::Arc;
use std::time::Instant;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::builder::PipelineBuilder;
use super::context::{keys, PipelineContext};
use super::node::{NodeEnv, NodeError, PipelineNode};
use super::registry::{BuildContext, ConfigError, NodeRegistry};
use crate::capture::ExecutionCapture;
use crate::config::PipelineConfig;
use crate::control::CancelToken;
use crate::llm::retry::RetryPolicy;
use crate::llm::{InstrumentedLlm, LlmClient};
use crate::meters::MeterCatalog;
use crate::poem::Poem;
use crate::prompts::PromptFormatter;

/// Which validation hook a node failed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Input,
    Run,
    Output,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Input => write!(f, "input validation"),
            Stage::Run => write!(f, "execution"),
            Stage::Output => write!(f, "output validation"),
        }
    }
}

/// A terminated pipeline run.
#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    /// A node failed; the run stopped at that node.
    #[error("node `{node}` failed during {stage}: {message}")]
    #[diagnostic(code(qasida::pipeline::node_failed))]
    Node {
        node: String,
        stage: Stage,
        message: String,
        #[source]
        source: Option<NodeError>,
        /// Context as it stood when the run stopped.
        partial_context: Box<PipelineContext>,
    },

    /// The run observed its cancellation signal.
    #[error("pipeline cancelled")]
    #[diagnostic(code(qasida::pipeline::cancelled))]
    Cancelled {
        partial_context: Box<PipelineContext>,
        /// Best poem seen before cancellation, when one exists.
        best_poem: Option<Box<Poem>>,
    },
}

impl PipelineError {
    /// Short error-kind tag for front-end error records.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Node { source, .. } => match source {
                Some(NodeError::Parse(_)) => "parse_error",
                Some(NodeError::Meter(_)) => "meter_error",
                Some(NodeError::Rhyme(_)) => "rhyme_error",
                Some(NodeError::Llm(_)) => "llm_error",
                Some(NodeError::Validation { .. }) | Some(NodeError::Context(_)) => {
                    "validation_error"
                }
                _ => "pipeline_error",
            },
            PipelineError::Cancelled { .. } => "cancelled",
        }
    }

    /// The structured error record front-ends receive instead of exceptions.
    #[must_use]
    pub fn failure_record(&self) -> Value {
        match self {
            PipelineError::Node {
                node,
                stage,
                message,
                partial_context,
                ..
            } => json!({
                "kind": self.kind(),
                "message": message,
                "node": node,
                "stage": stage.to_string(),
                "partial_context": partial_context.to_value(),
            }),
            PipelineError::Cancelled {
                partial_context,
                best_poem,
            } => json!({
                "kind": "cancelled",
                "message": "pipeline cancelled",
                "partial_context": partial_context.to_value(),
                "best_poem": best_poem.as_ref().map(|p| p.verses.clone()),
            }),
        }
    }
}

/// Per-node timing and contribution summary.
#[derive(Clone, Debug)]
pub struct NodeReport {
    pub name: String,
    pub duration_ms: u64,
    pub produced_keys: Vec<String>,
}

/// Result of a completed run: final context, per-node metadata, and the
/// captured execution record.
#[derive(Debug)]
pub struct RunOutcome {
    pub context: PipelineContext,
    pub nodes: Vec<NodeReport>,
    pub execution: Arc<ExecutionCapture>,
}

impl RunOutcome {
    /// The final poem, when the pipeline produced one.
    #[must_use]
    pub fn poem(&self) -> Option<Poem> {
        self.context.poem().ok()
    }
}

/// Configuration-driven executor for one pipeline shape.
///
/// Engines are cheap to keep around and reusable: each [`run`](Self::run)
/// gets its own context and capture record, so concurrent runs do not share
/// mutable state.
pub struct PipelineEngine {
    nodes: Vec<Arc<dyn PipelineNode>>,
    llm: Arc<dyn LlmClient>,
    prompts: Arc<dyn PromptFormatter>,
    meters: Arc<MeterCatalog>,
    config: Arc<PipelineConfig>,
}

impl PipelineEngine {
    /// Build an engine from configuration using the standard node registry.
    pub fn from_config(
        config: Arc<PipelineConfig>,
        llm: Arc<dyn LlmClient>,
        prompts: Arc<dyn PromptFormatter>,
        meters: Arc<MeterCatalog>,
    ) -> Result<Self, ConfigError> {
        Self::with_registry(NodeRegistry::standard(), config, llm, prompts, meters)
    }

    /// Build an engine with a caller-extended registry.
    pub fn with_registry(
        registry: NodeRegistry,
        config: Arc<PipelineConfig>,
        llm: Arc<dyn LlmClient>,
        prompts: Arc<dyn PromptFormatter>,
        meters: Arc<MeterCatalog>,
    ) -> Result<Self, ConfigError> {
        let build = BuildContext {
            prompts: Arc::clone(&prompts),
            meters: Arc::clone(&meters),
            config: Arc::clone(&config),
        };
        let nodes = PipelineBuilder::new(registry, build).build(&config.pipeline)?;
        Ok(Self {
            nodes,
            llm,
            prompts,
            meters,
            config,
        })
    }

    /// Node names in execution order.
    #[must_use]
    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name()).collect()
    }

    /// Run the pipeline from a bare user prompt.
    pub async fn run_prompt(
        &self,
        user_prompt: &str,
        cancel: CancelToken,
    ) -> Result<RunOutcome, PipelineError> {
        let mut initial = FxHashMap::default();
        initial.insert(
            keys::USER_PROMPT.to_string(),
            Value::String(user_prompt.to_string()),
        );
        self.run(initial, cancel).await
    }

    /// Run the pipeline from an initial context map.
    ///
    /// The map must contain at least `user_prompt`; anything else it carries
    /// (initial constraints, a pre-made poem for refinement-only pipelines)
    /// is seeded into the context as-is.
    #[instrument(skip_all, fields(nodes = self.nodes.len()))]
    pub async fn run(
        &self,
        initial: FxHashMap<String, Value>,
        cancel: CancelToken,
    ) -> Result<RunOutcome, PipelineError> {
        let user_prompt = initial
            .get(keys::USER_PROMPT)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let initial_constraints = initial
            .get(keys::CONSTRAINTS)
            .and_then(|v| serde_json::from_value(v.clone()).ok());

        let mut ctx = PipelineContext::from_initial(initial);
        let execution = ExecutionCapture::start(&user_prompt, initial_constraints.as_ref());
        let scope = execution.root_scope();
        let env = NodeEnv {
            llm: Arc::new(InstrumentedLlm::new(Arc::clone(&self.llm), scope.clone())),
            prompts: Arc::clone(&self.prompts),
            meters: Arc::clone(&self.meters),
            config: Arc::clone(&self.config),
            capture: scope,
            cancel: cancel.clone(),
            temperature: None,
            retry: RetryPolicy::default(),
        };

        let mut reports = Vec::with_capacity(self.nodes.len());

        for node in &self.nodes {
            if cancel.is_cancelled() {
                return Err(self.cancelled(&execution, ctx));
            }

            if !node.validate_input(&ctx) {
                execution.fail();
                return Err(PipelineError::Node {
                    node: node.name().to_string(),
                    stage: Stage::Input,
                    message: format!(
                        "required inputs missing: expected {:?}",
                        node.required_inputs()
                    ),
                    source: None,
                    partial_context: Box::new(ctx),
                });
            }

            let started = Instant::now();
            let guard = env.capture.begin(
                node.name(),
                "run",
                node.call_type(),
                ctx.project(node.required_inputs()),
            );

            let output = match node.run(&ctx, &env).await {
                Ok(output) => output,
                Err(err) if err.is_cancellation() => {
                    guard.fail("cancelled");
                    return Err(self.cancelled(&execution, ctx));
                }
                Err(err) => {
                    warn!(node = node.name(), error = %err, "node failed");
                    guard.fail(&err.to_string());
                    execution.fail();
                    return Err(PipelineError::Node {
                        node: node.name().to_string(),
                        stage: Stage::Run,
                        message: err.to_string(),
                        source: Some(err),
                        partial_context: Box::new(ctx),
                    });
                }
            };

            if !node.validate_output(&output) {
                guard.fail("output validation failed");
                execution.fail();
                return Err(PipelineError::Node {
                    node: node.name().to_string(),
                    stage: Stage::Output,
                    message: format!(
                        "produced outputs incomplete: expected {:?}",
                        node.produced_outputs()
                    ),
                    source: None,
                    partial_context: Box::new(ctx),
                });
            }

            guard.finish(&output.to_value());
            let produced_keys: Vec<String> =
                output.key_names().map(str::to_string).collect();
            info!(
                node = node.name(),
                keys = ?produced_keys,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "node completed"
            );
            reports.push(NodeReport {
                name: node.name().to_string(),
                duration_ms: started.elapsed().as_millis() as u64,
                produced_keys,
            });
            ctx.merge(output.into_values());
        }

        let final_poem = ctx.poem().ok();
        let final_quality = ctx.quality().ok();
        execution.complete(final_poem.as_ref(), final_quality.as_ref());

        Ok(RunOutcome {
            context: ctx,
            nodes: reports,
            execution,
        })
    }

    fn cancelled(&self, execution: &Arc<ExecutionCapture>, ctx: PipelineContext) -> PipelineError {
        let best_poem = ctx.poem().ok();
        execution.cancel(best_poem.as_ref());
        PipelineError::Cancelled {
            partial_context: Box::new(ctx),
            best_poem: best_poem.map(Box::new),
        }
    }
}

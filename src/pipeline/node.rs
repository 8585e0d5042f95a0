//! The node contract and execution environment.
//!
//! A [`PipelineNode`] is one typed unit of work. Nodes declare the context
//! keys they require and produce so the builder can validate wiring before
//! anything runs, carry a static [`CallType`] annotation for capture, and
//! return their results as a [`NodeOutput`] that the engine merges into the
//! shared context.

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;

use super::context::{ContextError, PipelineContext};
use crate::capture::{CallType, CaptureScope};
use crate::config::PipelineConfig;
use crate::constraints::Constraints;
use crate::control::{CancelToken, CancelledError};
use crate::llm::retry::{generate_with_retry, RetryPolicy};
use crate::llm::{InstrumentedLlm, LlmError, LlmReply};
use crate::meters::{MeterCatalog, MeterError};
use crate::poem::{Poem, Quality};
use crate::prompts::{PromptError, PromptFormatter};
use crate::utils::arabic::RhymeError;
use crate::utils::json_ext::ParseError;

/// Fatal errors from node execution.
///
/// Recoverable conditions (a refiner that cannot improve, an evaluator
/// dimension whose judge reply is garbage) are handled inside the owning
/// component; whatever reaches this type terminates the pipeline.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    /// Expected context data is missing or malformed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Context(#[from] ContextError),

    /// An LLM reply could not be parsed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    /// Knowledge-base rejection of a meter name.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Meter(#[from] MeterError),

    /// Knowledge-base rejection of a rhyme letter.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Rhyme(#[from] RhymeError),

    /// Transport failure after the retry budget.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Llm(#[from] LlmError),

    /// Prompt formatting failure (missing template or parameter).
    #[error(transparent)]
    #[diagnostic(transparent)]
    Prompt(#[from] PromptError),

    /// A computed artifact violates its schema.
    #[error("validation failed: {message}")]
    #[diagnostic(code(qasida::node::validation))]
    Validation { message: String },

    /// JSON (de)serialization failure while shaping outputs.
    #[error(transparent)]
    #[diagnostic(code(qasida::node::serde))]
    Serde(#[from] serde_json::Error),

    /// The run was cancelled.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cancelled(#[from] CancelledError),
}

impl NodeError {
    /// `true` when the root cause is cancellation rather than failure.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            NodeError::Cancelled(_) | NodeError::Llm(LlmError::Cancelled(_))
        )
    }
}

/// Partial context updates returned by a node.
///
/// Only the keys present are merged; everything else in the context is left
/// untouched.
#[derive(Clone, Debug, Default)]
pub struct NodeOutput {
    values: FxHashMap<String, Value>,
}

impl NodeOutput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn with_constraints(self, constraints: &Constraints) -> Result<Self, NodeError> {
        let value = serde_json::to_value(constraints)?;
        Ok(self.with_value(super::context::keys::CONSTRAINTS, value))
    }

    pub fn with_poem(self, poem: &Poem) -> Result<Self, NodeError> {
        let value = serde_json::to_value(poem)?;
        Ok(self.with_value(super::context::keys::POEM, value))
    }

    pub fn with_quality(self, quality: &Quality) -> Result<Self, NodeError> {
        let value = serde_json::to_value(quality)?;
        Ok(self.with_value(super::context::keys::EVALUATION, value))
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The output as a JSON object (capture payload).
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (key, value) in &self.values {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }

    #[must_use]
    pub fn into_values(self) -> FxHashMap<String, Value> {
        self.values
    }

    /// Keys present in this output.
    pub fn key_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Execution environment handed to every node run.
///
/// Shared read-only services plus per-run capture and cancellation. Cloning
/// is cheap; Best-of-N derives per-candidate environments via
/// [`for_candidate`](Self::for_candidate).
#[derive(Clone)]
pub struct NodeEnv {
    /// Capture-reporting LLM client.
    pub llm: Arc<InstrumentedLlm>,
    pub prompts: Arc<dyn PromptFormatter>,
    pub meters: Arc<MeterCatalog>,
    pub config: Arc<PipelineConfig>,
    pub capture: CaptureScope,
    pub cancel: CancelToken,
    /// Sampling temperature override (set inside Best-of-N candidates).
    pub temperature: Option<f64>,
    pub retry: RetryPolicy,
}

impl NodeEnv {
    /// One LLM call under the standard retry policy, honoring any temperature
    /// override and the cancellation token.
    pub async fn generate(&self, prompt: &str) -> Result<LlmReply, LlmError> {
        generate_with_retry(
            self.llm.as_ref(),
            prompt,
            self.temperature,
            self.retry,
            &self.cancel,
        )
        .await
    }

    /// Environment for Best-of-N candidate `index`: fresh capture scope,
    /// candidate-tagged calls, explicit temperature.
    #[must_use]
    pub fn for_candidate(&self, index: usize, temperature: f64) -> NodeEnv {
        let scope = self.capture.candidate_scope(index);
        NodeEnv {
            llm: Arc::new(self.llm.with_scope(scope.clone())),
            prompts: Arc::clone(&self.prompts),
            meters: Arc::clone(&self.meters),
            config: Arc::clone(&self.config),
            capture: scope,
            cancel: self.cancel.clone(),
            temperature: Some(temperature),
            retry: self.retry,
        }
    }
}

/// One typed unit of work in the pipeline.
#[async_trait]
pub trait PipelineNode: Send + Sync {
    /// Instance name (spec name if given, else the type string).
    fn name(&self) -> &str;

    /// Static capture annotation.
    fn call_type(&self) -> CallType {
        CallType::Process
    }

    /// Context keys that must exist before this node runs.
    fn required_inputs(&self) -> &'static [&'static str];

    /// Context keys this node contributes.
    fn produced_outputs(&self) -> &'static [&'static str];

    /// Pre-run check; the default verifies all required keys are present.
    fn validate_input(&self, ctx: &PipelineContext) -> bool {
        self.required_inputs().iter().all(|k| ctx.contains_key(k))
    }

    /// Post-run check; the default verifies all produced keys are present.
    fn validate_output(&self, output: &NodeOutput) -> bool {
        self.produced_outputs()
            .iter()
            .all(|k| output.contains_key(k))
    }

    /// Execute against the shared context.
    async fn run(&self, ctx: &PipelineContext, env: &NodeEnv) -> Result<NodeOutput, NodeError>;
}

impl std::fmt::Debug for dyn PipelineNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineNode").field("name", &self.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_builder_round_trips() {
        let constraints = Constraints::builder("p").meter("بحر الرمل").build();
        let output = NodeOutput::new()
            .with_value("flag", json!(true))
            .with_constraints(&constraints)
            .unwrap();
        assert!(output.contains_key("flag"));
        assert!(output.contains_key(super::super::context::keys::CONSTRAINTS));
        let as_value = output.to_value();
        assert_eq!(as_value["constraints"]["meter"], json!("بحر الرمل"));
    }
}

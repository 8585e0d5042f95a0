//! Typed configuration for the pipeline and its components.
//!
//! The crate consumes an already-deserialized [`PipelineConfig`]; loading it
//! from YAML (and substituting environment variables) is a front-end concern.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::LlmConfig;

/// One entry in the declarative pipeline list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Registered node type, e.g. `generator` or `refiner_chain`.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Optional instance name; disambiguates duplicate types.
    #[serde(default)]
    pub name: Option<String>,
    /// Free-form parameters interpreted by the node factory.
    #[serde(default)]
    pub params: Value,
}

impl NodeSpec {
    #[must_use]
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            name: None,
            params: Value::Null,
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// The display name: explicit name if given, else the type.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.node_type)
    }
}

/// Acceptance thresholds for the evaluator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationThresholds {
    #[serde(default = "default_min_overall")]
    pub min_overall: f64,
    #[serde(default = "default_min_dimension")]
    pub min_prosody: f64,
    #[serde(default = "default_min_dimension")]
    pub min_rhyme: f64,
    /// Budget for evaluator-driven loops; mirrored by `refinement`.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_min_overall() -> f64 {
    0.85
}
fn default_min_dimension() -> f64 {
    0.5
}
fn default_max_iterations() -> u32 {
    3
}

impl Default for EvaluationThresholds {
    fn default() -> Self {
        Self {
            min_overall: default_min_overall(),
            min_prosody: default_min_dimension(),
            min_rhyme: default_min_dimension(),
            max_iterations: default_max_iterations(),
        }
    }
}

/// Weights for the four scoring dimensions; normalized at use.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_w_prosody")]
    pub prosody: f64,
    #[serde(default = "default_w_rhyme")]
    pub rhyme: f64,
    #[serde(default = "default_w_line_count")]
    pub line_count: f64,
    #[serde(default = "default_w_diacritics")]
    pub diacritics: f64,
}

fn default_w_prosody() -> f64 {
    0.4
}
fn default_w_rhyme() -> f64 {
    0.3
}
fn default_w_line_count() -> f64 {
    0.2
}
fn default_w_diacritics() -> f64 {
    0.1
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            prosody: default_w_prosody(),
            rhyme: default_w_rhyme(),
            line_count: default_w_line_count(),
            diacritics: default_w_diacritics(),
        }
    }
}

/// The `evaluation` config section.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default)]
    pub thresholds: EvaluationThresholds,
    #[serde(default)]
    pub weights: ScoringWeights,
}

/// The `refinement` config section.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefinementConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_target_quality")]
    pub target_quality: f64,
    /// Tolerated score regression before a refiner's output is discarded.
    #[serde(default)]
    pub epsilon: f64,
}

fn default_target_quality() -> f64 {
    0.9
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            target_quality: default_target_quality(),
            epsilon: 0.0,
        }
    }
}

/// The `best_of_n` config section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BestOfNConfig {
    #[serde(default = "default_n_candidates")]
    pub n_candidates: usize,
    #[serde(default = "default_temperature_range")]
    pub temperature_range: Vec<f64>,
    #[serde(default = "default_selection_prompt")]
    pub selection_prompt: String,
}

fn default_n_candidates() -> usize {
    3
}
fn default_temperature_range() -> Vec<f64> {
    vec![0.5, 0.7, 0.9, 1.1, 1.3]
}
fn default_selection_prompt() -> String {
    crate::prompts::template_ids::GENERATION_SELECTION.to_string()
}

impl Default for BestOfNConfig {
    fn default() -> Self {
        Self {
            n_candidates: default_n_candidates(),
            temperature_range: default_temperature_range(),
            selection_prompt: default_selection_prompt(),
        }
    }
}

/// The full declarative configuration surface.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Ordered node specs; the pipeline builder materializes them.
    #[serde(default)]
    pub pipeline: Vec<NodeSpec>,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub refinement: RefinementConfig,
    #[serde(default)]
    pub best_of_n: BestOfNConfig,
    /// Per-adapter LLM settings, keyed by adapter name.
    #[serde(default)]
    pub llm: FxHashMap<String, LlmConfig>,
}

//! Pipeline materialization and build-time wiring validation.
//!
//! Building happens in two passes: instantiate every node through the
//! registry, then statically check that each node's declared required keys
//! are produced by some earlier node (or seeded by the initial context).
//! Misdeclared pipelines fail here, before any LLM call is made.

use std::sync::Arc;

use super::node::PipelineNode;
use super::registry::{BuildContext, ConfigError, NodeRegistry};
use crate::config::NodeSpec;
use crate::pipeline::context::keys;

/// Context keys available before the first node runs.
const SEED_KEYS: [&str; 1] = [keys::USER_PROMPT];

/// Builder that turns a declarative spec list into an ordered node sequence.
pub struct PipelineBuilder {
    registry: NodeRegistry,
    build: BuildContext,
}

impl PipelineBuilder {
    #[must_use]
    pub fn new(registry: NodeRegistry, build: BuildContext) -> Self {
        Self { registry, build }
    }

    /// Instantiate and validate the pipeline.
    pub fn build(&self, specs: &[NodeSpec]) -> Result<Vec<Arc<dyn PipelineNode>>, ConfigError> {
        if specs.is_empty() {
            return Err(ConfigError::EmptyPipeline);
        }

        let mut nodes = Vec::with_capacity(specs.len());
        for spec in specs {
            nodes.push(self.registry.create(spec, &self.build)?);
        }

        validate_wiring(&nodes)?;
        Ok(nodes)
    }
}

/// Check declared-required against declared-produced keys across the order.
fn validate_wiring(nodes: &[Arc<dyn PipelineNode>]) -> Result<(), ConfigError> {
    let mut available: Vec<&str> = SEED_KEYS.to_vec();
    for node in nodes {
        for required in node.required_inputs() {
            if !available.contains(required) {
                return Err(ConfigError::MissingProducer {
                    node: node.name().to_string(),
                    key: (*required).to_string(),
                });
            }
        }
        for produced in node.produced_outputs() {
            if !available.contains(produced) {
                available.push(produced);
            }
        }
    }
    Ok(())
}

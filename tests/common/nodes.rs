//! Stub nodes for wrapper and engine tests.

use async_trait::async_trait;
use qasida::pipeline::context::keys;
use qasida::pipeline::{NodeEnv, NodeError, NodeOutput, PipelineContext, PipelineNode};
use serde_json::json;

/// A node that always fails, for all-candidates-failed paths.
pub struct AlwaysFailingNode;

#[async_trait]
impl PipelineNode for AlwaysFailingNode {
    fn name(&self) -> &str {
        "always_failing"
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        &[keys::CONSTRAINTS]
    }

    fn produced_outputs(&self) -> &'static [&'static str] {
        &[keys::POEM]
    }

    async fn run(&self, _ctx: &PipelineContext, _env: &NodeEnv) -> Result<NodeOutput, NodeError> {
        Err(NodeError::Validation {
            message: "this node always fails".to_string(),
        })
    }
}

/// A node that echoes a marker value, for merge-order tests.
pub struct MarkerNode {
    pub key: &'static str,
    pub value: i64,
}

#[async_trait]
impl PipelineNode for MarkerNode {
    fn name(&self) -> &str {
        "marker"
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        &[keys::USER_PROMPT]
    }

    fn produced_outputs(&self) -> &'static [&'static str] {
        &[]
    }

    async fn run(&self, _ctx: &PipelineContext, _env: &NodeEnv) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::new().with_value(self.key, json!(self.value)))
    }
}

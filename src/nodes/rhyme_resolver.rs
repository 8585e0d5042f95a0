//! Rhyme resolver node.
//!
//! Normalizes any user-specified rhyme letter to base form and fills the
//! missing qafiya components (letter, harakah, classical type) through one
//! LLM call. A fully-specified rhyme passes through untouched.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::capture::CallType;
use crate::config::NodeSpec;
use crate::constraints::{Constraints, Harakah, RhymeType};
use crate::pipeline::context::{keys, PipelineContext};
use crate::pipeline::node::{NodeEnv, NodeError, NodeOutput, PipelineNode};
use crate::prompts::{params, template_ids};
use crate::utils::arabic::validate_rhyme_letter;
use crate::utils::json_ext;

#[derive(Debug, Deserialize)]
struct RhymeReply {
    #[serde(default)]
    qafiya_letter: Option<String>,
    #[serde(default)]
    qafiya_harakah: Option<String>,
    #[serde(default)]
    qafiya_type: Option<String>,
}

/// Resolves the qafiya specification.
pub struct RhymeResolver {
    name: String,
}

impl RhymeResolver {
    #[must_use]
    pub fn from_spec(spec: &NodeSpec) -> Self {
        Self {
            name: spec.display_name().to_string(),
        }
    }

    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "rhyme_resolver".to_string(),
        }
    }

    fn missing_components(constraints: &Constraints) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if constraints.rhyme_letter.is_none() {
            missing.push("حرف الروي");
        }
        if constraints.rhyme_harakah.is_none() {
            missing.push("حركة الروي");
        }
        if constraints.rhyme_type.is_none() {
            missing.push("نوع القافية");
        }
        missing
    }
}

impl Default for RhymeResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineNode for RhymeResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn call_type(&self) -> CallType {
        CallType::Enrich
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        &[keys::CONSTRAINTS]
    }

    fn produced_outputs(&self) -> &'static [&'static str] {
        &[keys::CONSTRAINTS]
    }

    async fn run(&self, ctx: &PipelineContext, env: &NodeEnv) -> Result<NodeOutput, NodeError> {
        let mut constraints = ctx.constraints()?;

        // Normalize a user-specified letter; an unusable one is a RhymeError
        // carrying suggestions.
        if let Some(letter) = constraints.rhyme_letter {
            constraints.rhyme_letter = Some(validate_rhyme_letter(&letter.to_string())?);
        }

        let missing = Self::missing_components(&constraints);
        if missing.is_empty() {
            debug!("qafiya fully specified; no enrichment needed");
            return NodeOutput::new().with_constraints(&constraints);
        }

        let unspecified = || "غير محدد".to_string();
        let prompt = env.prompts.format(
            template_ids::RHYME_SELECTION,
            &params([
                (
                    "original_prompt",
                    if constraints.original_prompt.is_empty() {
                        ctx.user_prompt().unwrap_or_default()
                    } else {
                        constraints.original_prompt.clone()
                    },
                ),
                ("theme", constraints.theme.clone().unwrap_or_else(unspecified)),
                ("missing_components", missing.join("، ")),
            ]),
        )?;

        let reply = env.generate(&prompt).await?;
        let selection: RhymeReply = json_ext::parse_reply(&reply.text)?;

        if constraints.rhyme_letter.is_none()
            && let Some(letter) = selection.qafiya_letter
        {
            constraints.rhyme_letter = Some(validate_rhyme_letter(&letter)?);
        }
        if constraints.rhyme_harakah.is_none()
            && let Some(harakah) = selection.qafiya_harakah
        {
            match Harakah::parse(&harakah) {
                Some(parsed) => constraints.rhyme_harakah = Some(parsed),
                None => constraints
                    .ambiguities
                    .push(format!("حركة مقترحة غير معروفة: {harakah}")),
            }
        }
        if constraints.rhyme_type.is_none()
            && let Some(rhyme_type) = selection.qafiya_type
        {
            constraints.rhyme_type = RhymeType::parse(&rhyme_type);
        }

        NodeOutput::new().with_constraints(&constraints)
    }
}

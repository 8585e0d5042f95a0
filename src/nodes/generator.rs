//! Poem generator node.
//!
//! One LLM call against the `poem_generation` template. The reply is split
//! into trimmed non-empty lines, one hemistich each. The generator does not
//! verify prosody or rhyme — that is the evaluator's job.

use async_trait::async_trait;

use crate::capture::CallType;
use crate::config::NodeSpec;
use crate::constraints::Constraints;
use crate::llm::LlmClient;
use crate::pipeline::context::{keys, PipelineContext};
use crate::pipeline::node::{NodeEnv, NodeError, NodeOutput, PipelineNode};
use crate::poem::Poem;
use crate::prompts::{params, template_ids};

/// Default bait count when the request leaves it open.
const DEFAULT_BAIT_COUNT: u32 = 2;

/// Produces a candidate poem from resolved constraints.
pub struct PoemGenerator {
    name: String,
}

impl PoemGenerator {
    #[must_use]
    pub fn from_spec(spec: &NodeSpec) -> Self {
        Self {
            name: spec.display_name().to_string(),
        }
    }

    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "generator".to_string(),
        }
    }

    /// Split an LLM reply into hemistich lines.
    fn parse_verses(reply: &str) -> Vec<String> {
        reply
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Default for PoemGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineNode for PoemGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn call_type(&self) -> CallType {
        CallType::Generate
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        &[keys::CONSTRAINTS]
    }

    fn produced_outputs(&self) -> &'static [&'static str] {
        &[keys::POEM]
    }

    async fn run(&self, ctx: &PipelineContext, env: &NodeEnv) -> Result<NodeOutput, NodeError> {
        let mut constraints: Constraints = ctx.constraints()?;
        if constraints.line_count.is_none() {
            constraints.line_count = Some(DEFAULT_BAIT_COUNT);
        }
        if !constraints.ready_for_generation() {
            return Err(NodeError::Validation {
                message: "generation requires meter, meter_feet, rhyme_letter and line_count"
                    .to_string(),
            });
        }

        let line_count = constraints.line_count.unwrap_or(DEFAULT_BAIT_COUNT);
        let total_hemistichs = line_count * 2;
        let unspecified = || "غير محدد".to_string();

        let prompt = env.prompts.format(
            template_ids::POEM_GENERATION,
            &params([
                ("meter", constraints.meter.clone().unwrap_or_else(unspecified)),
                ("meter_feet", constraints.meter_feet.join(" ")),
                (
                    "qafiya_letter",
                    constraints
                        .rhyme_letter
                        .map(|c| c.to_string())
                        .unwrap_or_else(unspecified),
                ),
                (
                    "qafiya_harakah",
                    constraints
                        .rhyme_harakah
                        .map(|h| h.arabic_name().to_string())
                        .unwrap_or_else(unspecified),
                ),
                ("line_count", line_count.to_string()),
                ("total_hemistichs", total_hemistichs.to_string()),
                ("theme", constraints.theme.clone().unwrap_or_else(unspecified)),
                ("tone", constraints.tone.clone().unwrap_or_else(unspecified)),
                ("imagery", join_or_unspecified(&constraints.imagery)),
                ("keywords", join_or_unspecified(&constraints.keywords)),
            ]),
        )?;

        let reply = env.generate(&prompt).await?;
        let verses = Self::parse_verses(&reply.text);
        if verses.is_empty() {
            return Err(NodeError::Validation {
                message: "generation returned no verses".to_string(),
            });
        }

        let poem = Poem::new(
            verses,
            env.llm.provider().to_string(),
            env.llm.model().to_string(),
            constraints,
        );
        NodeOutput::new().with_poem(&poem)
    }
}

fn join_or_unspecified(items: &[String]) -> String {
    if items.is_empty() {
        "غير محدد".to_string()
    } else {
        items.join("، ")
    }
}

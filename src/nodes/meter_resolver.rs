//! Meter resolver node.
//!
//! A recognized meter is a no-op enrichment: the canonical name and its feet
//! are attached without touching the LLM, so re-running the resolver on an
//! already-resolved record returns an equal record. Anything else — no meter,
//! or an unrecognized name — goes through one LLM call against a ranked
//! candidate list, and the returned name must validate against the catalog.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::capture::CallType;
use crate::config::NodeSpec;
use crate::constraints::Constraints;
use crate::meters::{Difficulty, MeterCatalog};
use crate::pipeline::context::{keys, PipelineContext};
use crate::pipeline::node::{NodeEnv, NodeError, NodeOutput, PipelineNode};
use crate::prompts::{params, template_ids};
use crate::utils::json_ext;

#[derive(Debug, Deserialize)]
struct MeterReply {
    meter_name: String,
}

/// Resolves and standardizes the meter specification.
pub struct MeterResolver {
    name: String,
}

impl MeterResolver {
    #[must_use]
    pub fn from_spec(spec: &NodeSpec) -> Self {
        Self {
            name: spec.display_name().to_string(),
        }
    }

    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "meter_resolver".to_string(),
        }
    }

    /// Ranked candidate list for the selection prompt: theme-matching meters
    /// first, then tone/difficulty hints, then medium meters as a fallback.
    fn ranked_candidates(constraints: &Constraints, catalog: &MeterCatalog) -> String {
        let mut lines: Vec<String> = Vec::new();
        let mut listed: Vec<String> = Vec::new();

        let mut push_group = |header: &str, meters: Vec<std::sync::Arc<crate::meters::MeterDescriptor>>, cap: usize| {
            let fresh: Vec<_> = meters
                .into_iter()
                .filter(|m| !listed.contains(&m.name))
                .take(cap)
                .collect();
            if fresh.is_empty() {
                return;
            }
            lines.push(header.to_string());
            for meter in fresh {
                lines.push(format!(
                    "  - {} ({})",
                    meter.name,
                    difficulty_label(meter.difficulty)
                ));
                listed.push(meter.name.clone());
            }
        };

        if let Some(theme) = &constraints.theme {
            push_group(
                &format!("بحور مناسبة لموضوع «{theme}»:"),
                catalog.by_theme(theme),
                5,
            );
        }
        let easy_tone = constraints
            .tone
            .as_deref()
            .is_some_and(|t| ["بسيط", "سهل", "مبتدئ"].iter().any(|hint| t.contains(hint)));
        if constraints.theme.is_none() || easy_tone {
            push_group("بحور سهلة:", catalog.by_difficulty(Difficulty::Easy), 3);
        }
        push_group(
            "بحور متوسطة الصعوبة:",
            catalog.by_difficulty(Difficulty::Medium),
            3,
        );

        if lines.is_empty() {
            "جميع البحور متاحة".to_string()
        } else {
            lines.join("\n")
        }
    }

    fn attach_feet(
        mut constraints: Constraints,
        canonical: String,
        catalog: &MeterCatalog,
    ) -> Constraints {
        if let Some(descriptor) = catalog.lookup(&canonical) {
            constraints.meter_feet = descriptor.foot_names();
        }
        constraints.meter = Some(canonical);
        constraints
    }
}

impl Default for MeterResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn difficulty_label(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => "سهل",
        Difficulty::Medium => "متوسط",
        Difficulty::Hard => "صعب",
    }
}

#[async_trait]
impl PipelineNode for MeterResolver {
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
        let constraints = ctx.constraints()?;

        // Recognized meter: attach feet and return without an LLM call.
        if let Some(meter) = constraints.meter.clone()
            && env.meters.recognizes(&meter)
        {
            let canonical = env.meters.canonicalize(&meter)?;
            debug!(meter = %canonical, "meter already specified; attaching feet");
            let enriched = Self::attach_feet(constraints, canonical, &env.meters);
            return NodeOutput::new().with_constraints(&enriched);
        }

        let unspecified = || "غير محدد".to_string();
        let prompt = env.prompts.format(
            template_ids::METER_SELECTION,
            &params([
                (
                    "original_prompt",
                    if constraints.original_prompt.is_empty() {
                        ctx.user_prompt().unwrap_or_default()
                    } else {
                        constraints.original_prompt.clone()
                    },
                ),
                (
                    "current_meter",
                    constraints.meter.clone().unwrap_or_else(unspecified),
                ),
                ("theme", constraints.theme.clone().unwrap_or_else(unspecified)),
                ("tone", constraints.tone.clone().unwrap_or_else(unspecified)),
                (
                    "available_meters",
                    Self::ranked_candidates(&constraints, &env.meters),
                ),
            ]),
        )?;

        let reply = env.generate(&prompt).await?;
        let selection: MeterReply = json_ext::parse_reply(&reply.text)?;
        // Near-match suggestions ride in the MeterError for retry at a
        // higher level.
        let canonical = env.meters.canonicalize(&selection.meter_name)?;
        let enriched = Self::attach_feet(constraints, canonical, &env.meters);
        NodeOutput::new().with_constraints(&enriched)
    }
}

//! Constraint enricher node.
//!
//! Supplements a resolved constraint record with theme-derived imagery and
//! keyword defaults when the parser found none. Purely local — no LLM call.

use async_trait::async_trait;

use crate::capture::CallType;
use crate::config::NodeSpec;
use crate::constraints::Constraints;
use crate::pipeline::context::{keys, PipelineContext};
use crate::pipeline::node::{NodeEnv, NodeError, NodeOutput, PipelineNode};

/// Stock imagery per common theme, used when the request names none.
const THEME_IMAGERY: [(&str, &[&str]); 5] = [
    ("الحب", &["القمر", "النجوم", "الورد", "العيون"]),
    ("فخر", &["السيف", "الجبال", "النسر", "المجد"]),
    ("حماسة", &["الخيل", "الراية", "الميدان"]),
    ("رثاء", &["الدمع", "القبر", "الذكرى"]),
    ("وصف", &["الروض", "الغيم", "النسيم"]),
];

/// Fills imagery/keyword gaps from the theme.
pub struct ConstraintEnricher {
    name: String,
}

impl ConstraintEnricher {
    #[must_use]
    pub fn from_spec(spec: &NodeSpec) -> Self {
        Self {
            name: spec.display_name().to_string(),
        }
    }

    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "enricher".to_string(),
        }
    }

    fn enrich(mut constraints: Constraints) -> Constraints {
        if constraints.imagery.is_empty()
            && let Some(theme) = &constraints.theme
        {
            for (known_theme, imagery) in THEME_IMAGERY {
                if theme.contains(known_theme) {
                    constraints.imagery = imagery.iter().map(|s| (*s).to_string()).collect();
                    break;
                }
            }
        }
        if constraints.keywords.is_empty()
            && let Some(theme) = &constraints.theme
        {
            constraints.keywords.push(theme.clone());
        }
        constraints
    }
}

impl Default for ConstraintEnricher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineNode for ConstraintEnricher {
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

    async fn run(&self, ctx: &PipelineContext, _env: &NodeEnv) -> Result<NodeOutput, NodeError> {
        let constraints = Self::enrich(ctx.constraints()?);
        NodeOutput::new().with_constraints(&constraints)
    }
}

//! Constraint parser node: free-form user prompt → [`Constraints`].
//!
//! One LLM call against the `constraint_parsing` template. The reply is
//! mined for its first balanced JSON object; recognized fields populate the
//! record, unknown-but-harmless fields land in `ambiguities`, and a reply
//! with no usable constraint data at all is a [`ParseError`].

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::capture::CallType;
use crate::config::NodeSpec;
use crate::constraints::{Constraints, Harakah, RhymeType};
use crate::pipeline::context::{keys, PipelineContext};
use crate::pipeline::node::{NodeEnv, NodeError, NodeOutput, PipelineNode};
use crate::prompts::{params, template_ids};
use crate::utils::arabic::validate_rhyme_letter;
use crate::utils::json_ext::{self, ParseError};

#[derive(Debug, Default, Deserialize)]
struct RawConstraints {
    meter: Option<String>,
    qafiya_letter: Option<String>,
    qafiya_harakah: Option<String>,
    qafiya_type: Option<String>,
    line_count: Option<Value>,
    theme: Option<String>,
    tone: Option<String>,
    register: Option<String>,
    era: Option<String>,
    poet_style: Option<String>,
    #[serde(default)]
    imagery: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    sections: Vec<String>,
    #[serde(default)]
    ambiguities: Vec<String>,
    #[serde(flatten)]
    unknown: Map<String, Value>,
}

impl RawConstraints {
    fn has_any_known_field(&self) -> bool {
        self.meter.is_some()
            || self.qafiya_letter.is_some()
            || self.qafiya_harakah.is_some()
            || self.qafiya_type.is_some()
            || self.line_count.is_some()
            || self.theme.is_some()
            || self.tone.is_some()
            || self.register.is_some()
            || self.era.is_some()
            || self.poet_style.is_some()
            || !self.imagery.is_empty()
            || !self.keywords.is_empty()
            || !self.sections.is_empty()
    }
}

/// Parses the user's request into the initial constraint record.
pub struct ConstraintParser {
    name: String,
}

impl ConstraintParser {
    #[must_use]
    pub fn from_spec(spec: &NodeSpec) -> Self {
        Self {
            name: spec.display_name().to_string(),
        }
    }

    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "constraint_parser".to_string(),
        }
    }

    fn build_constraints(raw: RawConstraints, user_prompt: &str) -> Constraints {
        let mut constraints = Constraints {
            original_prompt: user_prompt.to_string(),
            ..Default::default()
        };

        constraints.meter = raw.meter.filter(|m| !m.trim().is_empty());
        constraints.theme = raw.theme.filter(|s| !s.trim().is_empty());
        constraints.tone = raw.tone.filter(|s| !s.trim().is_empty());
        constraints.register = raw.register.filter(|s| !s.trim().is_empty());
        constraints.era = raw.era.filter(|s| !s.trim().is_empty());
        constraints.poet_style = raw.poet_style.filter(|s| !s.trim().is_empty());
        constraints.imagery = raw.imagery;
        constraints.keywords = raw.keywords;
        constraints.sections = raw.sections;
        constraints.ambiguities = raw.ambiguities;

        if let Some(letter) = raw.qafiya_letter {
            match validate_rhyme_letter(&letter) {
                Ok(normalized) => constraints.rhyme_letter = Some(normalized),
                Err(_) => constraints
                    .ambiguities
                    .push(format!("قافية غير واضحة: {letter}")),
            }
        }
        if let Some(harakah) = raw.qafiya_harakah {
            match Harakah::parse(&harakah) {
                Some(parsed) => constraints.rhyme_harakah = Some(parsed),
                None => constraints
                    .ambiguities
                    .push(format!("حركة قافية غير معروفة: {harakah}")),
            }
        }
        if let Some(rhyme_type) = raw.qafiya_type {
            constraints.rhyme_type = RhymeType::parse(&rhyme_type);
        }
        if let Some(count) = raw.line_count {
            constraints.line_count = match count {
                Value::Number(n) => n.as_u64().map(|v| v as u32),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            };
        }
        for (key, value) in raw.unknown {
            constraints.ambiguities.push(format!("{key}: {value}"));
        }

        constraints
    }
}

impl Default for ConstraintParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineNode for ConstraintParser {
    fn name(&self) -> &str {
        &self.name
    }

    fn call_type(&self) -> CallType {
        CallType::Parse
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        &[keys::USER_PROMPT]
    }

    fn produced_outputs(&self) -> &'static [&'static str] {
        &[keys::CONSTRAINTS]
    }

    async fn run(&self, ctx: &PipelineContext, env: &NodeEnv) -> Result<NodeOutput, NodeError> {
        let user_prompt = ctx.user_prompt()?;
        let prompt = env.prompts.format(
            template_ids::CONSTRAINT_PARSING,
            &params([("user_prompt", user_prompt.clone())]),
        )?;
        let reply = env.generate(&prompt).await?;

        let value = json_ext::parse_reply_value(&reply.text)?;
        let raw: RawConstraints = serde_json::from_value(value).map_err(|e| {
            NodeError::Parse(ParseError::Malformed {
                reason: e.to_string(),
                preview: json_ext::truncate(&reply.text, 200),
            })
        })?;
        if !raw.has_any_known_field() {
            return Err(ParseError::MissingField {
                field: "constraints",
            }
            .into());
        }

        let constraints = Self::build_constraints(raw, &user_prompt);
        NodeOutput::new().with_constraints(&constraints)
    }
}

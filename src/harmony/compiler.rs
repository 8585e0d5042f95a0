//! Offline synthesis of training dialogues from captured executions.
//!
//! The compiler projects each captured call down to the fields that matter
//! for its call type, renders the `harmony_structured` template, and asks the
//! LLM to reconstruct the run as a channel-tagged conversation. The reply is
//! validated and normalized so the single-final-message guarantee always
//! holds; parse failures surface as [`CompilerError`] with the raw reply
//! attached.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use miette::Diagnostic;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::instrument;

use super::document::{Channel, HarmonyDocument, HarmonyMessage};
use crate::capture::{CallType, CapturedCall, PipelineExecution};
use crate::llm::{LlmClient, LlmError};
use crate::prompts::{params, template_ids, PromptError, PromptFormatter};
use crate::utils::json_ext::{self, ParseError};

/// Harmony synthesis failure.
#[derive(Debug, Error, Diagnostic)]
pub enum CompilerError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Llm(#[from] LlmError),

    /// The model's reply had no parsable JSON or the wrong shape. The raw
    /// reply rides along for debugging.
    #[error("harmony reply unusable: {reason}")]
    #[diagnostic(code(qasida::harmony::malformed))]
    Malformed { reason: String, raw: String },

    #[error("failed to write harmony artifact {path}")]
    #[diagnostic(code(qasida::harmony::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// LLM-driven compiler from execution records to harmony documents.
pub struct HarmonyCompiler {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<dyn PromptFormatter>,
}

impl HarmonyCompiler {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<dyn PromptFormatter>) -> Self {
        Self { llm, prompts }
    }

    /// Compile one captured execution into a harmony document.
    #[instrument(skip_all, fields(execution = %execution.execution_id))]
    pub async fn compile(
        &self,
        execution: &PipelineExecution,
    ) -> Result<HarmonyDocument, CompilerError> {
        let call_summaries = execution
            .calls
            .iter()
            .enumerate()
            .map(|(i, call)| format!("{}. {}", i + 1, project_call(call)))
            .collect::<Vec<_>>()
            .join("\n");

        let final_poem_text = final_poem_text(execution);
        let prompt = self.prompts.format(
            template_ids::HARMONY_STRUCTURED,
            &params([
                ("user_prompt", execution.user_prompt.clone()),
                (
                    "initial_constraints",
                    execution
                        .initial_constraints
                        .as_ref()
                        .map(Value::to_string)
                        .unwrap_or_else(|| "null".to_string()),
                ),
                ("call_summaries", call_summaries),
                ("final_poem", final_poem_text.clone()),
                (
                    "final_quality",
                    execution
                        .final_quality
                        .as_ref()
                        .map(Value::to_string)
                        .unwrap_or_else(|| "null".to_string()),
                ),
            ]),
        )?;

        let reply = self.llm.generate(&prompt).await?;
        let mut document = parse_document(&reply.text)?;

        document.normalize_final(HarmonyMessage::assistant(
            Channel::Final,
            synthesized_final(&final_poem_text, execution),
        ));
        Ok(document)
    }

    /// Write `{execution_id}_structured.json` and `{execution_id}_harmony.txt`
    /// under `dir`, returning both paths.
    pub fn write_artifacts(
        &self,
        document: &HarmonyDocument,
        execution: &PipelineExecution,
        dir: &Path,
    ) -> Result<(PathBuf, PathBuf), CompilerError> {
        std::fs::create_dir_all(dir).map_err(|source| CompilerError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let structured_path = dir.join(format!("{}_structured.json", execution.execution_id));
        let structured = serde_json::to_string_pretty(document).map_err(|e| {
            CompilerError::Malformed {
                reason: e.to_string(),
                raw: String::new(),
            }
        })?;
        std::fs::write(&structured_path, structured).map_err(|source| CompilerError::Io {
            path: structured_path.clone(),
            source,
        })?;

        let dialogue_path = dir.join(format!("{}_harmony.txt", execution.execution_id));
        std::fs::write(&dialogue_path, document.render_dialogue()).map_err(|source| {
            CompilerError::Io {
                path: dialogue_path.clone(),
                source,
            }
        })?;

        Ok((structured_path, dialogue_path))
    }
}

fn parse_document(reply: &str) -> Result<HarmonyDocument, CompilerError> {
    let value = json_ext::parse_reply_value(reply).map_err(|err| match err {
        ParseError::NoJson { .. } | ParseError::Empty => CompilerError::Malformed {
            reason: "no JSON object in reply".to_string(),
            raw: reply.to_string(),
        },
        other => CompilerError::Malformed {
            reason: other.to_string(),
            raw: reply.to_string(),
        },
    })?;

    for key in ["system_message", "developer_message", "messages"] {
        if value.get(key).is_none() {
            return Err(CompilerError::Malformed {
                reason: format!("missing required key `{key}`"),
                raw: reply.to_string(),
            });
        }
    }

    serde_json::from_value(value).map_err(|e| CompilerError::Malformed {
        reason: e.to_string(),
        raw: reply.to_string(),
    })
}

/// Narrow per-call-type projection fed to the synthesis prompt.
fn project_call(call: &CapturedCall) -> String {
    let mut obj = serde_json::Map::new();
    obj.insert("component".to_string(), json!(call.component_name));
    obj.insert("call_type".to_string(), json!(call.call_type.key()));
    obj.insert("success".to_string(), json!(call.success));

    match call.call_type {
        CallType::Parse | CallType::Enrich => {
            if let Some(constraints) = call.outputs.get("constraints") {
                for field in ["meter", "rhyme_letter", "line_count", "theme"] {
                    if let Some(value) = constraints.get(field) {
                        if !value.is_null() {
                            obj.insert(field.to_string(), value.clone());
                        }
                    }
                }
            }
        }
        CallType::Generate => {
            if let Some(verses) = call
                .outputs
                .get("poem")
                .and_then(|p| p.get("verses"))
                .or_else(|| call.outputs.get("verses"))
            {
                obj.insert("verses".to_string(), verses.clone());
            }
        }
        CallType::Evaluate => {
            for field in ["overall_score", "is_acceptable", "issues"] {
                if let Some(value) = call
                    .outputs
                    .get(field)
                    .or_else(|| call.outputs.get("evaluation").and_then(|e| e.get(field)))
                {
                    obj.insert(field.to_string(), value.clone());
                }
            }
        }
        CallType::Refine => {
            if let Some(before) = call.inputs.get("verses") {
                obj.insert("verses_before".to_string(), before.clone());
            }
            if let Some(after) = call.outputs.get("verses") {
                obj.insert("verses_after".to_string(), after.clone());
            }
            for field in ["no_change", "iterations", "score_before", "score_after"] {
                if let Some(value) = call.inputs.get(field).or_else(|| call.outputs.get(field)) {
                    obj.insert(field.to_string(), value.clone());
                }
            }
        }
        CallType::Process => {
            if let Some(selection) = call.outputs.get("selected_candidate") {
                obj.insert("selected_candidate".to_string(), selection.clone());
            }
        }
    }

    if let Some(llm) = &call.llm {
        obj.insert(
            "llm".to_string(),
            json!({"provider": llm.provider, "model": llm.model}),
        );
    }
    if let Some(candidate) = call.candidate_index {
        obj.insert("candidate_index".to_string(), json!(candidate));
    }
    if let Some(error) = &call.error {
        obj.insert("error".to_string(), json!(error));
    }

    Value::Object(obj).to_string()
}

fn final_poem_text(execution: &PipelineExecution) -> String {
    execution
        .final_poem
        .as_ref()
        .and_then(|poem| poem.get("verses"))
        .and_then(Value::as_array)
        .map(|verses| {
            verses
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_else(|| "(no final poem)".to_string())
}

fn synthesized_final(poem_text: &str, execution: &PipelineExecution) -> String {
    let score = execution
        .final_quality
        .as_ref()
        .and_then(|q| q.get("overall_score"))
        .and_then(Value::as_f64);
    match score {
        Some(score) => format!("{poem_text}\n\n(الجودة الإجمالية: {score:.2})"),
        None => poem_text.to_string(),
    }
}

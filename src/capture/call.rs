//! The captured-call record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// What kind of work a captured call performed.
///
/// Inferred from the method name when a component carries no static
/// annotation; pipeline nodes declare theirs explicitly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    Parse,
    Enrich,
    Generate,
    Evaluate,
    Refine,
    Process,
}

impl CallType {
    /// Infer a call type from a method-name prefix.
    ///
    /// # Examples
    ///
    /// ```
    /// use qasida::capture::CallType;
    ///
    /// assert_eq!(CallType::infer("parse_constraints"), CallType::Parse);
    /// assert_eq!(CallType::infer("refine"), CallType::Refine);
    /// assert_eq!(CallType::infer("select_best"), CallType::Process);
    /// ```
    #[must_use]
    pub fn infer(method_name: &str) -> CallType {
        let lower = method_name.to_ascii_lowercase();
        if lower.contains("parse") {
            CallType::Parse
        } else if lower.contains("refine") {
            CallType::Refine
        } else if lower.contains("evaluate") {
            CallType::Evaluate
        } else if lower.contains("generate") {
            CallType::Generate
        } else if lower.contains("enrich") {
            CallType::Enrich
        } else {
            CallType::Process
        }
    }

    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            CallType::Parse => "parse",
            CallType::Enrich => "enrich",
            CallType::Generate => "generate",
            CallType::Evaluate => "evaluate",
            CallType::Refine => "refine",
            CallType::Process => "process",
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// LLM metadata attached to a call by the adapter side channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmCallInfo {
    pub provider: String,
    pub model: String,
    pub prompt: String,
    pub response: Option<String>,
    pub tokens: Option<u32>,
}

/// Immutable record of one instrumented method invocation.
///
/// Appended to the execution record at call start (so records linearize in
/// start-time order) and completed in place exactly once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapturedCall {
    pub call_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub component_name: String,
    pub method_name: String,
    pub call_type: CallType,
    /// Named parameters by name; positional values as `arg_0`, `arg_1`, …
    pub inputs: Value,
    /// `Null` until the call completes.
    pub outputs: Value,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmCallInfo>,
    /// Set for calls made inside a Best-of-N candidate task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_index: Option<usize>,
    pub duration_ms: Option<u64>,
    pub success: bool,
}

impl CapturedCall {
    pub(crate) fn open(
        component_name: String,
        method_name: String,
        call_type: CallType,
        inputs: Value,
        candidate_index: Option<usize>,
    ) -> Self {
        Self {
            call_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            component_name,
            method_name,
            call_type,
            inputs,
            outputs: Value::Null,
            error: None,
            llm: None,
            candidate_index,
            duration_ms: None,
            success: false,
        }
    }
}

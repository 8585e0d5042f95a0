//! Per-request execution capture.
//!
//! One [`ExecutionCapture`] exists per pipeline run. Calls are appended in
//! start-time order and completed in place; the record is never shared across
//! requests, so concurrent executions cannot interleave their captures.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::call::{CapturedCall, LlmCallInfo};
use super::scope::CaptureScope;
use super::serialize::capture_value;
use crate::constraints::Constraints;
use crate::poem::{Poem, Quality};

/// Lifecycle of an execution record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// The serializable aggregate of one pipeline run.
///
/// Round-trips through JSON: `snapshot → to_string → from_str` yields an
/// equal record (timestamps compare at full precision because they are stored
/// as RFC 3339 with their original sub-second digits).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineExecution {
    pub execution_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    pub user_prompt: String,
    pub initial_constraints: Option<Value>,
    pub calls: Vec<CapturedCall>,
    pub final_poem: Option<Value>,
    pub final_quality: Option<Value>,
    pub total_duration_ms: Option<u64>,
    pub total_llm_calls: u32,
    pub total_tokens: u64,
}

impl PipelineExecution {
    /// Artifact filename for this execution: `{execution_id}.json`.
    #[must_use]
    pub fn artifact_name(&self) -> String {
        format!("{}.json", self.execution_id)
    }
}

/// Errors from persisting capture artifacts.
#[derive(Debug, Error, Diagnostic)]
pub enum CaptureError {
    #[error("failed to write capture artifact {path}")]
    #[diagnostic(code(qasida::capture::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize execution record")]
    #[diagnostic(code(qasida::capture::serde))]
    Serde(#[from] serde_json::Error),
}

/// Coordinator for one request's capture.
///
/// Shared behind an `Arc` between the engine, the instrumented LLM client,
/// and every scope; internally a single mutex guards the record.
#[derive(Debug)]
pub struct ExecutionCapture {
    inner: Mutex<PipelineExecution>,
}

impl ExecutionCapture {
    /// Start capturing a new execution.
    #[must_use]
    pub fn start(user_prompt: &str, initial_constraints: Option<&Constraints>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(PipelineExecution {
                execution_id: Uuid::new_v4(),
                started_at: Utc::now(),
                completed_at: None,
                status: ExecutionStatus::Running,
                user_prompt: user_prompt.to_string(),
                initial_constraints: initial_constraints.map(capture_value),
                calls: Vec::new(),
                final_poem: None,
                final_quality: None,
                total_duration_ms: None,
                total_llm_calls: 0,
                total_tokens: 0,
            }),
        })
    }

    /// The root capture scope for this execution.
    #[must_use]
    pub fn root_scope(self: &Arc<Self>) -> CaptureScope {
        CaptureScope::root(Arc::clone(self))
    }

    #[must_use]
    pub fn execution_id(&self) -> Uuid {
        self.inner.lock().execution_id
    }

    /// Close the record successfully and compute aggregate metrics.
    pub fn complete(&self, final_poem: Option<&Poem>, final_quality: Option<&Quality>) {
        self.close(ExecutionStatus::Completed, final_poem, final_quality);
    }

    /// Close the record after cancellation; the best-so-far poem is still
    /// recorded when available.
    pub fn cancel(&self, best_poem: Option<&Poem>) {
        self.close(ExecutionStatus::Cancelled, best_poem, None);
    }

    /// Close the record after a pipeline failure.
    pub fn fail(&self) {
        self.close(ExecutionStatus::Failed, None, None);
    }

    fn close(&self, status: ExecutionStatus, poem: Option<&Poem>, quality: Option<&Quality>) {
        let mut inner = self.inner.lock();
        let completed = Utc::now();
        inner.completed_at = Some(completed);
        inner.total_duration_ms = Some(
            (completed - inner.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
        inner.status = status;
        inner.final_poem = poem.map(capture_value);
        inner.final_quality = quality.map(capture_value);
    }

    /// Clone the current record.
    #[must_use]
    pub fn snapshot(&self) -> PipelineExecution {
        self.inner.lock().clone()
    }

    /// Write `{execution_id}.json` (pretty-printed UTF-8) under `dir`.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, CaptureError> {
        let record = self.snapshot();
        let path = dir.join(record.artifact_name());
        let json = serde_json::to_string_pretty(&record)?;
        std::fs::create_dir_all(dir).map_err(|source| CaptureError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        std::fs::write(&path, json).map_err(|source| CaptureError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    // ------------------------------------------------------------------
    // Scope plumbing (crate-internal)
    // ------------------------------------------------------------------

    /// Append an opened call, returning its index for later completion.
    pub(super) fn push_call(&self, call: CapturedCall) -> usize {
        let mut inner = self.inner.lock();
        inner.calls.push(call);
        inner.calls.len() - 1
    }

    pub(super) fn complete_call(
        &self,
        index: usize,
        outputs: Value,
        error: Option<String>,
        duration_ms: u64,
    ) {
        let mut inner = self.inner.lock();
        if let Some(call) = inner.calls.get_mut(index) {
            call.outputs = outputs;
            call.success = error.is_none();
            call.error = error;
            call.duration_ms = Some(duration_ms);
        }
    }

    pub(super) fn annotate_llm(&self, index: usize, info: LlmCallInfo) {
        let mut inner = self.inner.lock();
        inner.total_llm_calls += 1;
        if let Some(tokens) = info.tokens {
            inner.total_tokens += u64::from(tokens);
        }
        if let Some(call) = inner.calls.get_mut(index) {
            call.llm = Some(info);
        }
    }
}

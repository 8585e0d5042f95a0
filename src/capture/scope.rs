//! Capture scopes: per-task stacks of open calls.
//!
//! A [`CaptureScope`] owns a stack of currently-open call records. The engine
//! holds the root scope; the Best-of-N wrapper derives one scope per candidate
//! task so concurrent candidates annotate their own calls, never each other's.
//! LLM adapters report metadata to the nearest enclosing open call through
//! [`CaptureScope::annotate_llm`].

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

use super::call::{CallType, CapturedCall, LlmCallInfo};
use super::execution::ExecutionCapture;
use super::serialize::depth_capped;

/// Handle used by instrumented components to open and annotate calls.
#[derive(Clone)]
pub struct CaptureScope {
    exec: Arc<ExecutionCapture>,
    /// Indices (into the execution's call list) of calls open in this task.
    stack: Arc<Mutex<Vec<usize>>>,
    candidate: Option<usize>,
}

impl CaptureScope {
    pub(super) fn root(exec: Arc<ExecutionCapture>) -> Self {
        Self {
            exec,
            stack: Arc::new(Mutex::new(Vec::new())),
            candidate: None,
        }
    }

    /// A scope for one Best-of-N candidate: fresh stack, tagged calls.
    #[must_use]
    pub fn candidate_scope(&self, index: usize) -> CaptureScope {
        CaptureScope {
            exec: Arc::clone(&self.exec),
            stack: Arc::new(Mutex::new(Vec::new())),
            candidate: Some(index),
        }
    }

    /// The execution this scope feeds.
    #[must_use]
    pub fn execution(&self) -> &Arc<ExecutionCapture> {
        &self.exec
    }

    /// Open a call record; the returned guard completes it.
    ///
    /// Inputs are depth-capped before storage. The record is appended
    /// immediately so captured calls linearize in start-time order even when
    /// candidate tasks interleave.
    #[must_use]
    pub fn begin(
        &self,
        component_name: &str,
        method_name: &str,
        call_type: CallType,
        inputs: Value,
    ) -> CallGuard {
        let call = CapturedCall::open(
            component_name.to_string(),
            method_name.to_string(),
            call_type,
            depth_capped(&inputs),
            self.candidate,
        );
        let index = self.exec.push_call(call);
        self.stack.lock().push(index);
        CallGuard {
            scope: self.clone(),
            index,
            started: Instant::now(),
            finished: false,
        }
    }

    /// Attach LLM metadata to the innermost open call of this task.
    ///
    /// With no open call (an adapter used outside instrumentation) the report
    /// is dropped with a warning rather than mis-attributed.
    pub fn annotate_llm(&self, info: LlmCallInfo) {
        match self.stack.lock().last().copied() {
            Some(index) => self.exec.annotate_llm(index, info),
            None => warn!(
                provider = %info.provider,
                "LLM call reported outside any capture scope; dropping annotation"
            ),
        }
    }

    fn close(&self, index: usize) {
        let mut stack = self.stack.lock();
        if let Some(pos) = stack.iter().rposition(|i| *i == index) {
            stack.remove(pos);
        }
    }
}

/// Completion handle for one open call.
///
/// Dropping a guard without calling [`finish`](Self::finish) or
/// [`fail`](Self::fail) records the call as abandoned, keeping the scope
/// stack consistent on early-return paths.
pub struct CallGuard {
    scope: CaptureScope,
    index: usize,
    started: Instant,
    finished: bool,
}

impl CallGuard {
    /// Complete the call successfully with its (depth-capped) outputs.
    pub fn finish(mut self, outputs: &Value) {
        self.finished = true;
        self.scope.exec.complete_call(
            self.index,
            depth_capped(outputs),
            None,
            self.elapsed_ms(),
        );
        self.scope.close(self.index);
    }

    /// Complete the call as failed.
    pub fn fail(mut self, error: &str) {
        self.finished = true;
        self.scope.exec.complete_call(
            self.index,
            Value::Null,
            Some(error.to_string()),
            self.elapsed_ms(),
        );
        self.scope.close(self.index);
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.scope.exec.complete_call(
                self.index,
                Value::Null,
                Some("call abandoned before completion".to_string()),
                self.elapsed_ms(),
            );
            self.scope.close(self.index);
        }
    }
}

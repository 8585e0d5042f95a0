//! Non-intrusive execution capture.
//!
//! Every instrumented invocation in a pipeline run produces a
//! [`CapturedCall`]; the per-request [`ExecutionCapture`] collects them in
//! start-time order together with the run's inputs, outputs, and aggregate
//! LLM metrics. The harmony compiler consumes the resulting
//! [`PipelineExecution`] record offline.
//!
//! Capture is transparent to business logic: components either run under a
//! decorator (the instrumented LLM client, the captured refiner) or are
//! wrapped by the engine, which opens a scope around each node run.

pub mod call;
pub mod execution;
pub mod scope;
pub mod serialize;

pub use call::{CallType, CapturedCall, LlmCallInfo};
pub use execution::{CaptureError, ExecutionCapture, ExecutionStatus, PipelineExecution};
pub use scope::{CallGuard, CaptureScope};
pub use serialize::{capture_value, depth_capped, DEPTH_PLACEHOLDER, MAX_DEPTH};

#![allow(dead_code)]

pub mod fixtures;
pub mod nodes;

use std::sync::Arc;
use std::time::Duration;

use qasida::capture::ExecutionCapture;
use qasida::config::PipelineConfig;
use qasida::control::CancelToken;
use qasida::llm::retry::RetryPolicy;
use qasida::llm::{InstrumentedLlm, MockLlm};
use qasida::meters::MeterCatalog;
use qasida::pipeline::NodeEnv;
use qasida::prompts::TemplateSet;

/// A node environment wired to a scripted mock LLM and a fresh capture.
pub fn test_env(llm: Arc<MockLlm>) -> (NodeEnv, Arc<ExecutionCapture>) {
    test_env_with_config(llm, PipelineConfig::default())
}

pub fn test_env_with_config(
    llm: Arc<MockLlm>,
    config: PipelineConfig,
) -> (NodeEnv, Arc<ExecutionCapture>) {
    let execution = ExecutionCapture::start("test prompt", None);
    let scope = execution.root_scope();
    let env = NodeEnv {
        llm: Arc::new(InstrumentedLlm::new(llm, scope.clone())),
        prompts: Arc::new(TemplateSet::defaults()),
        meters: Arc::new(MeterCatalog::classical()),
        config: Arc::new(config),
        capture: scope,
        cancel: CancelToken::never(),
        temperature: None,
        retry: RetryPolicy {
            max_retries: 1,
            timeout: Duration::from_secs(5),
            base_delay: Duration::from_millis(1),
        },
    };
    (env, execution)
}

//! Capture decorator for LLM clients.
//!
//! [`InstrumentedLlm`] implements [`LlmClient`] by delegating to an inner
//! adapter and reporting `{provider, model, prompt, response, tokens}` to the
//! capture scope's innermost open call. This is the side channel named by the
//! capture design: components never thread LLM metadata by hand.

use std::sync::Arc;

use async_trait::async_trait;

use super::{LlmClient, LlmError, LlmReply};
use crate::capture::{CaptureScope, LlmCallInfo};

/// An [`LlmClient`] that mirrors every call into the capture scope.
pub struct InstrumentedLlm {
    inner: Arc<dyn LlmClient>,
    scope: CaptureScope,
}

impl InstrumentedLlm {
    #[must_use]
    pub fn new(inner: Arc<dyn LlmClient>, scope: CaptureScope) -> Self {
        Self { inner, scope }
    }

    /// Re-wrap the same adapter against a different scope (one per Best-of-N
    /// candidate task).
    #[must_use]
    pub fn with_scope(&self, scope: CaptureScope) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            scope,
        }
    }

    fn report(&self, prompt: &str, outcome: &Result<LlmReply, LlmError>) {
        let (response, tokens) = match outcome {
            Ok(reply) => (Some(reply.text.clone()), reply.tokens),
            Err(_) => (None, None),
        };
        self.scope.annotate_llm(LlmCallInfo {
            provider: self.inner.provider().to_string(),
            model: self.inner.model().to_string(),
            prompt: prompt.to_string(),
            response,
            tokens,
        });
    }
}

#[async_trait]
impl LlmClient for InstrumentedLlm {
    fn provider(&self) -> &str {
        self.inner.provider()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn generate(&self, prompt: &str) -> Result<LlmReply, LlmError> {
        let outcome = self.inner.generate(prompt).await;
        self.report(prompt, &outcome);
        outcome
    }

    async fn generate_with_temperature(
        &self,
        prompt: &str,
        temperature: f64,
    ) -> Result<LlmReply, LlmError> {
        let outcome = self.inner.generate_with_temperature(prompt, temperature).await;
        self.report(prompt, &outcome);
        outcome
    }
}

//! The LLM adapter contract and supporting plumbing.
//!
//! Adapters are external collaborators: the core never constructs HTTP
//! clients, it only consumes [`LlmClient`]. What the core *does* own is the
//! retry policy around transient transport failures ([`retry`]), the capture
//! side channel ([`instrumented`]), and a scripted mock for tests ([`mock`]).

pub mod instrumented;
pub mod mock;
pub mod retry;

use std::time::Duration;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use instrumented::InstrumentedLlm;
pub use mock::MockLlm;

/// One adapter reply.
///
/// The token count is optional because not every provider reports usage;
/// capture records it when present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmReply {
    pub text: String,
    pub tokens: Option<u32>,
}

impl LlmReply {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens: None,
        }
    }

    #[must_use]
    pub fn with_tokens(mut self, tokens: u32) -> Self {
        self.tokens = Some(tokens);
        self
    }
}

/// Errors surfaced by adapters and the retry layer.
#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    /// A single transport-level failure (connection, 5xx, …). Retryable.
    #[error("transport error from {provider}: {message}")]
    #[diagnostic(code(qasida::llm::transport))]
    Transport { provider: String, message: String },

    /// The call exceeded its configured timeout. Retryable.
    #[error("LLM call timed out after {seconds}s")]
    #[diagnostic(code(qasida::llm::timeout))]
    Timeout { seconds: u64 },

    /// The provider rejected the request outright (auth, quota, bad model).
    /// Not retryable.
    #[error("provider {provider} rejected the request: {message}")]
    #[diagnostic(
        code(qasida::llm::rejected),
        help("Check the adapter's api_key and model configuration.")
    )]
    Rejected { provider: String, message: String },

    /// All retry attempts were exhausted.
    #[error("LLM call failed after {attempts} attempts: {last_error}")]
    #[diagnostic(code(qasida::llm::exhausted))]
    Exhausted { attempts: u32, last_error: String },

    /// The run was cancelled before the call started.
    #[error(transparent)]
    #[diagnostic(code(qasida::llm::cancelled))]
    Cancelled(#[from] crate::control::CancelledError),
}

impl LlmError {
    /// `true` for failures worth another attempt.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Transport { .. } | LlmError::Timeout { .. })
    }
}

/// Per-adapter configuration, deserialized from the `llm` config section.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: String,
    /// Read from the environment when absent (adapters are expected to call
    /// [`LlmConfig::resolve_api_key`]).
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_provider() -> String {
    "unknown".to_string()
}
fn default_temperature() -> f64 {
    1.0
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_timeout_secs() -> u64 {
    320
}
fn default_max_retries() -> u32 {
    3
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: "unspecified".to_string(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl LlmConfig {
    /// Per-call timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The configured key, falling back to `<PROVIDER>_API_KEY` from the
    /// environment (`.env` files included).
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<String> {
        if self.api_key.is_some() {
            return self.api_key.clone();
        }
        let var = format!("{}_API_KEY", self.provider.to_uppercase());
        dotenvy::var(&var).ok()
    }
}

/// The adapter contract: `generate(prompt) → reply`.
///
/// Implementations must surface transport failures as [`LlmError::Transport`]
/// after their own internal retries, if any; the core's retry layer handles
/// the rest. Implementations are shared read-only across the whole pipeline.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name, recorded on every captured call.
    fn provider(&self) -> &str;

    /// Model identifier, recorded on every captured call.
    fn model(&self) -> &str;

    /// Produce a completion for `prompt` at the adapter's configured
    /// temperature.
    async fn generate(&self, prompt: &str) -> Result<LlmReply, LlmError>;

    /// Produce a completion at an explicit temperature.
    ///
    /// Used by the Best-of-N wrapper's schedule. Adapters that cannot vary
    /// temperature per call fall back to [`generate`](Self::generate).
    async fn generate_with_temperature(
        &self,
        prompt: &str,
        _temperature: f64,
    ) -> Result<LlmReply, LlmError> {
        self.generate(prompt).await
    }
}

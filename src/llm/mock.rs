//! Scripted adapter for tests and offline runs.
//!
//! Replies are served in order and repeat from the start once exhausted, so a
//! single script can drive loops of unknown length. Optional leading failures
//! exercise the retry path.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{LlmClient, LlmError, LlmReply};

/// A deterministic [`LlmClient`] fed from a fixed list of replies.
///
/// # Examples
///
/// ```
/// use qasida::llm::{LlmClient, MockLlm};
///
/// let llm = MockLlm::scripted(["first", "second"]);
/// assert_eq!(llm.provider(), "mock");
/// ```
pub struct MockLlm {
    replies: Vec<LlmReply>,
    calls: Mutex<usize>,
    fail_first: Mutex<u32>,
    /// Prompts seen, for assertions on template wiring.
    prompts: Mutex<Vec<String>>,
    /// Temperatures seen (None when the plain entry point was used).
    temperatures: Mutex<Vec<Option<f64>>>,
}

impl MockLlm {
    /// A mock serving the given replies in order, cycling when exhausted.
    #[must_use]
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: replies
                .into_iter()
                .map(|r| LlmReply::new(r).with_tokens(64))
                .collect(),
            calls: Mutex::new(0),
            fail_first: Mutex::new(0),
            prompts: Mutex::new(Vec::new()),
            temperatures: Mutex::new(Vec::new()),
        }
    }

    /// Make the first `n` calls fail with a transient transport error.
    #[must_use]
    pub fn failing_first(self, n: u32) -> Self {
        *self.fail_first.lock() = n;
        self
    }

    /// Number of calls attempted so far (including failed ones).
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }

    /// Prompts of all successful and failed calls, in order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    /// Temperatures observed per call.
    #[must_use]
    pub fn temperatures(&self) -> Vec<Option<f64>> {
        self.temperatures.lock().clone()
    }

    fn next(&self, prompt: &str, temperature: Option<f64>) -> Result<LlmReply, LlmError> {
        let mut calls = self.calls.lock();
        let index = *calls;
        *calls += 1;
        drop(calls);

        self.prompts.lock().push(prompt.to_string());
        self.temperatures.lock().push(temperature);

        {
            let mut fail = self.fail_first.lock();
            if *fail > 0 {
                *fail -= 1;
                return Err(LlmError::Transport {
                    provider: "mock".to_string(),
                    message: "scripted transient failure".to_string(),
                });
            }
        }

        if self.replies.is_empty() {
            return Err(LlmError::Rejected {
                provider: "mock".to_string(),
                message: "no scripted replies".to_string(),
            });
        }
        Ok(self.replies[index % self.replies.len()].clone())
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn generate(&self, prompt: &str) -> Result<LlmReply, LlmError> {
        self.next(prompt, None)
    }

    async fn generate_with_temperature(
        &self,
        prompt: &str,
        temperature: f64,
    ) -> Result<LlmReply, LlmError> {
        self.next(prompt, Some(temperature))
    }
}

//! The refiner contract and its capture decorator.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::capture::CallType;
use crate::constraints::Constraints;
use crate::pipeline::node::{NodeEnv, NodeError};
use crate::poem::{Dimension, Poem, Quality};

/// What one refinement attempt produced.
#[derive(Clone, Debug)]
pub struct RefineOutcome {
    pub poem: Poem,
    /// Set when the refiner could not make progress (empty or identical
    /// reply); the chain records the step and moves on.
    pub no_change: bool,
    pub details: Option<String>,
}

impl RefineOutcome {
    /// The refiner produced a rewritten poem.
    #[must_use]
    pub fn rewritten(poem: Poem) -> Self {
        Self {
            poem,
            no_change: false,
            details: None,
        }
    }

    /// The refiner returns its input untouched.
    #[must_use]
    pub fn unchanged(poem: Poem, reason: impl Into<String>) -> Self {
        Self {
            poem,
            no_change: true,
            details: Some(reason.into()),
        }
    }
}

/// A specialist that rewrites a poem to fix one class of defect.
#[async_trait]
pub trait Refiner: Send + Sync {
    /// Stable name, recorded in refinement history.
    fn name(&self) -> &'static str;

    /// Dimensions this refiner's rewrite can change; only these are
    /// re-evaluated after it runs.
    fn affects(&self) -> &'static [Dimension];

    /// Whether this refiner has anything to do for the given quality.
    fn applies(&self, poem: &Poem, quality: &Quality) -> bool;

    /// Attempt one rewrite. Owns its prompt(s); may make several LLM calls.
    async fn refine(
        &self,
        poem: &Poem,
        constraints: &Constraints,
        quality: &Quality,
        env: &NodeEnv,
    ) -> Result<RefineOutcome, NodeError>;
}

/// Capture decorator: delegates to an inner refiner while recording the call.
///
/// Implements the same trait, so the chain composes it transparently.
pub struct CapturedRefiner {
    inner: Arc<dyn Refiner>,
}

impl CapturedRefiner {
    #[must_use]
    pub fn wrap(inner: Arc<dyn Refiner>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Refiner for CapturedRefiner {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn affects(&self) -> &'static [Dimension] {
        self.inner.affects()
    }

    fn applies(&self, poem: &Poem, quality: &Quality) -> bool {
        self.inner.applies(poem, quality)
    }

    async fn refine(
        &self,
        poem: &Poem,
        constraints: &Constraints,
        quality: &Quality,
        env: &NodeEnv,
    ) -> Result<RefineOutcome, NodeError> {
        let guard = env.capture.begin(
            self.inner.name(),
            "refine",
            CallType::Refine,
            json!({
                "verses": poem.verses,
                "score_before": quality.overall_score,
            }),
        );
        match self.inner.refine(poem, constraints, quality, env).await {
            Ok(outcome) => {
                guard.finish(&json!({
                    "verses": outcome.poem.verses,
                    "no_change": outcome.no_change,
                    "details": outcome.details,
                }));
                Ok(outcome)
            }
            Err(err) => {
                guard.fail(&err.to_string());
                Err(err)
            }
        }
    }
}

/// Turn a rewrite reply into an outcome, detecting empty and identical
/// replies as no-change.
#[must_use]
pub fn outcome_from_reply(reply: &str, original: &Poem) -> RefineOutcome {
    let verses: Vec<String> = reply
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if verses.is_empty() {
        return RefineOutcome::unchanged(original.clone(), "empty reply");
    }
    if verses == original.verses {
        return RefineOutcome::unchanged(original.clone(), "reply identical to input");
    }
    let mut poem = original.clone();
    poem.verses = verses;
    poem.quality = None;
    RefineOutcome::rewritten(poem)
}

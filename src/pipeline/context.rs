//! The shared pipeline context.
//!
//! A [`PipelineContext`] is the single mutable structure threaded through a
//! run. The engine owns it: nodes receive a shared reference, compute, and
//! return a [`NodeOutput`](super::node::NodeOutput) whose keys the engine
//! merges back (overwriting prior values). Nodes never retain references
//! across calls, and candidates inside Best-of-N treat the context as
//! read-only.

use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;

use crate::constraints::Constraints;
use crate::poem::{Poem, Quality};

/// Well-known context keys.
pub mod keys {
    /// Verbatim user request; seeds every run.
    pub const USER_PROMPT: &str = "user_prompt";
    /// The current [`Constraints`](crate::constraints::Constraints) record.
    pub const CONSTRAINTS: &str = "constraints";
    /// The current [`Poem`](crate::poem::Poem).
    pub const POEM: &str = "poem";
    /// The latest [`Quality`](crate::poem::Quality) assessment.
    pub const EVALUATION: &str = "evaluation";
    /// Set by refiners when `evaluation` no longer matches `poem`.
    pub const EVALUATION_DIRTY: &str = "evaluation_dirty";
    /// Refinement summary produced by the refiner chain.
    pub const REFINEMENT: &str = "refinement";
    /// Selection metadata produced by a Best-of-N wrapper.
    pub const SELECTION: &str = "selection";
    /// Flag set when every Best-of-N candidate failed.
    pub const ALL_FAILED: &str = "all_failed";
    /// Winning candidate's index.
    pub const CANDIDATE_INDEX: &str = "candidate_index";
    /// Winning candidate's sampling temperature.
    pub const CANDIDATE_TEMPERATURE: &str = "candidate_temperature";
}

/// Why a typed context read failed.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ContextError {
    #[error("context is missing key `{key}`")]
    #[diagnostic(
        code(qasida::context::missing),
        help("Check the pipeline order: a producer of this key must run first.")
    )]
    Missing { key: &'static str },

    #[error("context value under `{key}` has the wrong shape: {reason}")]
    #[diagnostic(code(qasida::context::corrupt))]
    Corrupt { key: &'static str, reason: String },
}

/// The mutable key/value map shared across one pipeline run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PipelineContext {
    values: FxHashMap<String, Value>,
}

impl PipelineContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a context from an initial map (must contain at least
    /// [`keys::USER_PROMPT`] for a standard run; the engine checks).
    #[must_use]
    pub fn from_initial(initial: FxHashMap<String, Value>) -> Self {
        Self { values: initial }
    }

    /// Seed a context holding only the user prompt.
    #[must_use]
    pub fn from_user_prompt(user_prompt: &str) -> Self {
        let mut values = FxHashMap::default();
        values.insert(
            keys::USER_PROMPT.to_string(),
            Value::String(user_prompt.to_string()),
        );
        Self { values }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Merge returned node keys, overwriting existing entries.
    pub fn merge(&mut self, updates: FxHashMap<String, Value>) {
        for (key, value) in updates {
            self.values.insert(key, value);
        }
    }

    /// Iterate over all keys currently present.
    pub fn key_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Snapshot a subset of entries (used for capture inputs).
    #[must_use]
    pub fn project(&self, keys: &[&str]) -> Value {
        let mut map = serde_json::Map::new();
        for key in keys {
            if let Some(value) = self.values.get(*key) {
                map.insert((*key).to_string(), value.clone());
            }
        }
        Value::Object(map)
    }

    // ------------------------------------------------------------------
    // Typed accessors for the well-known keys
    // ------------------------------------------------------------------

    pub fn user_prompt(&self) -> Result<String, ContextError> {
        match self.get(keys::USER_PROMPT) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(ContextError::Corrupt {
                key: keys::USER_PROMPT,
                reason: format!("expected string, found {other}"),
            }),
            None => Err(ContextError::Missing {
                key: keys::USER_PROMPT,
            }),
        }
    }

    pub fn constraints(&self) -> Result<Constraints, ContextError> {
        self.typed(keys::CONSTRAINTS)
    }

    pub fn poem(&self) -> Result<Poem, ContextError> {
        self.typed(keys::POEM)
    }

    pub fn quality(&self) -> Result<Quality, ContextError> {
        self.typed(keys::EVALUATION)
    }

    /// `true` when the recorded evaluation no longer matches the poem.
    #[must_use]
    pub fn evaluation_dirty(&self) -> bool {
        matches!(self.get(keys::EVALUATION_DIRTY), Some(Value::Bool(true)))
    }

    fn typed<T: serde::de::DeserializeOwned>(&self, key: &'static str) -> Result<T, ContextError> {
        let value = self
            .get(key)
            .ok_or(ContextError::Missing { key })?;
        serde_json::from_value(value.clone()).map_err(|e| ContextError::Corrupt {
            key,
            reason: e.to_string(),
        })
    }

    /// The whole context as a JSON object (for error records and capture).
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (key, value) in &self.values {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }
}

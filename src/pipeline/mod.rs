//! The pipeline engine: context, node contract, registry, builder, executor,
//! and the Best-of-N wrapper.
//!
//! A pipeline is declared as an ordered list of node specs, materialized
//! through a [`registry::NodeRegistry`], validated for key wiring at build
//! time, and executed by the [`engine::PipelineEngine`] against a shared
//! [`context::PipelineContext`].

pub mod best_of_n;
pub mod builder;
pub mod context;
pub mod engine;
pub mod node;
pub mod registry;

pub use best_of_n::BestOfN;
pub use builder::PipelineBuilder;
pub use context::{keys, ContextError, PipelineContext};
pub use engine::{NodeReport, PipelineEngine, PipelineError, RunOutcome, Stage};
pub use node::{NodeEnv, NodeError, NodeOutput, PipelineNode};
pub use registry::{BuildContext, ConfigError, NodeFactory, NodeRegistry};

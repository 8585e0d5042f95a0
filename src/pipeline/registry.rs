//! The node registry: string type → node factory.
//!
//! Pipelines are declared as ordered lists of `{type, name?, params?}` specs;
//! the registry materializes each spec through a registered factory. The
//! standard registry covers every built-in node type; applications extend it
//! with [`register`](NodeRegistry::register) before building.

use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use super::node::PipelineNode;
use crate::config::{NodeSpec, PipelineConfig};
use crate::meters::MeterCatalog;
use crate::prompts::PromptFormatter;

/// Bad pipeline declaration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown node type `{node_type}`; registered types: {}", .known.join(", "))]
    #[diagnostic(
        code(qasida::config::unknown_node_type),
        help("Register the node type on the registry, or fix the spelling in the pipeline config.")
    )]
    UnknownNodeType {
        node_type: String,
        known: Vec<String>,
    },

    #[error("node `{node}` requires context key `{key}` but no earlier node produces it")]
    #[diagnostic(
        code(qasida::config::missing_producer),
        help("Reorder the pipeline or add the producing node before `{node}`.")
    )]
    MissingProducer { node: String, key: String },

    #[error("bad params for node `{node}`: {reason}")]
    #[diagnostic(code(qasida::config::bad_params))]
    BadParams { node: String, reason: String },

    #[error("pipeline spec is empty")]
    #[diagnostic(code(qasida::config::empty_pipeline))]
    EmptyPipeline,
}

/// Shared services available to node factories at build time.
#[derive(Clone)]
pub struct BuildContext {
    pub prompts: Arc<dyn PromptFormatter>,
    pub meters: Arc<MeterCatalog>,
    pub config: Arc<PipelineConfig>,
}

/// A node constructor. Receives the spec (for name and params), the build
/// context, and the registry itself so wrapper nodes can build their inner
/// node recursively.
pub type NodeFactory = Arc<
    dyn Fn(&NodeSpec, &BuildContext, &NodeRegistry) -> Result<Arc<dyn PipelineNode>, ConfigError>
        + Send
        + Sync,
>;

/// String-keyed registry of node factories.
pub struct NodeRegistry {
    factories: FxHashMap<String, NodeFactory>,
}

impl NodeRegistry {
    /// An empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: FxHashMap::default(),
        }
    }

    /// The registry carrying every built-in node type:
    /// `constraint_parser`, `meter_resolver`, `rhyme_resolver`, `enricher`,
    /// `generator`, `evaluator`, `refiner_chain`, and `best_of_n`.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register("constraint_parser", |spec, _build, _reg| {
            Ok(Arc::new(crate::nodes::ConstraintParser::from_spec(spec)) as Arc<dyn PipelineNode>)
        });
        registry.register("meter_resolver", |spec, _build, _reg| {
            Ok(Arc::new(crate::nodes::MeterResolver::from_spec(spec)) as Arc<dyn PipelineNode>)
        });
        registry.register("rhyme_resolver", |spec, _build, _reg| {
            Ok(Arc::new(crate::nodes::RhymeResolver::from_spec(spec)) as Arc<dyn PipelineNode>)
        });
        registry.register("enricher", |spec, _build, _reg| {
            Ok(Arc::new(crate::nodes::ConstraintEnricher::from_spec(spec)) as Arc<dyn PipelineNode>)
        });
        registry.register("generator", |spec, _build, _reg| {
            Ok(Arc::new(crate::nodes::PoemGenerator::from_spec(spec)) as Arc<dyn PipelineNode>)
        });
        registry.register("evaluator", |spec, build, _reg| {
            Ok(Arc::new(crate::evaluation::PoemEvaluator::from_spec(spec, &build.config))
                as Arc<dyn PipelineNode>)
        });
        registry.register("refiner_chain", |spec, build, _reg| {
            crate::refinement::RefinerChain::from_spec(spec, &build.config)
                .map(|chain| Arc::new(chain) as Arc<dyn PipelineNode>)
        });
        registry.register("best_of_n", |spec, build, registry| {
            super::best_of_n::BestOfN::from_spec(spec, build, registry)
                .map(|node| Arc::new(node) as Arc<dyn PipelineNode>)
        });
        registry
    }

    /// Register (or replace) a factory for `node_type`.
    pub fn register<F>(&mut self, node_type: impl Into<String>, factory: F)
    where
        F: Fn(&NodeSpec, &BuildContext, &NodeRegistry) -> Result<Arc<dyn PipelineNode>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(node_type.into(), Arc::new(factory));
    }

    /// Materialize a node from its spec.
    pub fn create(
        &self,
        spec: &NodeSpec,
        build: &BuildContext,
    ) -> Result<Arc<dyn PipelineNode>, ConfigError> {
        let factory = self.factories.get(&spec.node_type).ok_or_else(|| {
            let mut known: Vec<String> = self.factories.keys().cloned().collect();
            known.sort();
            ConfigError::UnknownNodeType {
                node_type: spec.node_type.clone(),
                known,
            }
        })?;
        factory(spec, build, self)
    }

    /// Registered type names, sorted.
    #[must_use]
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

//! # Qasida: Constraint-Driven Arabic Poetry Generation
//!
//! Qasida turns a free-form poetry request into a fully-specified constraint
//! set, drives an LLM to produce a candidate poem, validates it against
//! classical prosody (bahr/tafeelat) and rhyme discipline (qafiya), and
//! iteratively refines it through a chain of specialists until a target
//! quality is reached. Every component call is captured non-intrusively so
//! the harmony compiler can reconstruct the run as a channel-tagged training
//! dialogue.
//!
//! ## Core Concepts
//!
//! - **Constraints**: the record of everything the poem must satisfy
//! - **Pipeline**: a configuration-driven sequence of typed async nodes
//!   sharing a mutable context, validated for key wiring at build time
//! - **Evaluation**: four weighted dimensions — prosody, rhyme, line count,
//!   diacritics — combined into a quality score with acceptance thresholds
//! - **Refinement**: ordered specialists under a never-degrade rail
//! - **Capture & Harmony**: per-request execution records compiled offline
//!   into structured reasoning traces
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use qasida::config::{NodeSpec, PipelineConfig};
//! use qasida::control::CancelToken;
//! use qasida::llm::MockLlm;
//! use qasida::meters::MeterCatalog;
//! use qasida::pipeline::PipelineEngine;
//! use qasida::prompts::TemplateSet;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(PipelineConfig {
//!     pipeline: vec![
//!         NodeSpec::new("constraint_parser"),
//!         NodeSpec::new("meter_resolver"),
//!         NodeSpec::new("rhyme_resolver"),
//!         NodeSpec::new("generator"),
//!         NodeSpec::new("evaluator"),
//!         NodeSpec::new("refiner_chain"),
//!     ],
//!     ..Default::default()
//! });
//!
//! let engine = PipelineEngine::from_config(
//!     config,
//!     Arc::new(MockLlm::scripted(["…"])), // any LlmClient adapter
//!     Arc::new(TemplateSet::defaults()),
//!     Arc::new(MeterCatalog::classical()),
//! )?;
//!
//! let outcome = engine
//!     .run_prompt("اكتب بيتين في الحب على بحر الكامل قافية القاف", CancelToken::never())
//!     .await?;
//! if let Some(poem) = outcome.poem() {
//!     println!("{}", poem.text());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`constraints`] - The constraint record and its builder
//! - [`poem`] - Poem and quality records
//! - [`meters`] - The classical meter knowledge base
//! - [`prompts`] - Prompt template contract and registry
//! - [`llm`] - LLM adapter contract, retry, capture side channel, mock
//! - [`config`] - Declarative pipeline configuration
//! - [`pipeline`] - Engine, context, node contract, registry, Best-of-N
//! - [`nodes`] - Parser, resolvers, enricher, generator
//! - [`evaluation`] - Four-dimension evaluator and scoring
//! - [`refinement`] - Refiner chain and the four specialists
//! - [`capture`] - Per-request execution capture
//! - [`harmony`] - Training-dialogue compiler
//! - [`control`] - Cooperative cancellation
//! - [`telemetry`] - Tracing setup

pub mod capture;
pub mod config;
pub mod constraints;
pub mod control;
pub mod evaluation;
pub mod harmony;
pub mod llm;
pub mod meters;
pub mod nodes;
pub mod pipeline;
pub mod poem;
pub mod prompts;
pub mod refinement;
pub mod telemetry;
pub mod utils;

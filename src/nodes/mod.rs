//! Built-in pipeline nodes: parsing, meter/rhyme resolution, enrichment, and
//! generation.
//!
//! The evaluator and refiner chain are substantial enough to live in their
//! own modules ([`crate::evaluation`], [`crate::refinement`]); they implement
//! the same [`PipelineNode`](crate::pipeline::PipelineNode) contract.

pub mod constraint_parser;
pub mod enricher;
pub mod generator;
pub mod meter_resolver;
pub mod rhyme_resolver;

pub use constraint_parser::ConstraintParser;
pub use enricher::ConstraintEnricher;
pub use generator::PoemGenerator;
pub use meter_resolver::MeterResolver;
pub use rhyme_resolver::RhymeResolver;

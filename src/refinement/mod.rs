//! Iterative refinement: the refiner contract, the four specialists, and the
//! chain that orchestrates them.

pub mod chain;
pub mod refiner;
pub mod specialists;

pub use chain::{RefineStep, RefinementReport, RefinerChain};
pub use refiner::{CapturedRefiner, RefineOutcome, Refiner};
pub use specialists::{DiacriticsRefiner, LineCountRefiner, ProsodyRefiner, RhymeRefiner};

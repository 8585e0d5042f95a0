//! Harmony: channel-tagged training dialogues compiled from captured
//! executions.

pub mod compiler;
pub mod document;

pub use compiler::{CompilerError, HarmonyCompiler};
pub use document::{Channel, HarmonyDocument, HarmonyMessage};

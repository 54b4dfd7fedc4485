//! Staged question answering over EV service manuals.
//!
//! A query is classified into a manual section, narrowed to one document of
//! that section, answered from chunks of that document only, and refused
//! when those chunks say nothing relevant. [`Pipeline`] sequences the stages.

pub mod assembler;
pub mod index;
pub mod pipeline;
pub mod prompts;
pub mod retriever;
pub mod router;
pub mod synthesizer;

#[cfg(test)]
mod testing;

pub use assembler::{AssembledContext, apply_budget, assemble, assemble_within};
pub use index::{DocumentIndex, DocumentIndexCache};
pub use pipeline::{Pipeline, ProgressReporter, SilentProgress};
pub use prompts::{REFUSAL, ROLE_MARKER};
pub use router::{DocumentDecision, KeywordRouter, LlmRouter, Router, SectionDecision, resolve_document};
pub use synthesizer::{Synthesis, Synthesizer};

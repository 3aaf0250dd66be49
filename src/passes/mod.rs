//! LLM passes: evidence distillation, synthesis, and citation repair.

mod citation;
mod distill;
mod prompts;
mod synthesize;

pub use citation::{repair_citations, CitationOutcome};
pub use distill::{distill_evidence, EvidenceNotes};
pub use prompts::PromptParts;
pub use synthesize::{synthesize_answer, SynthesisResult};

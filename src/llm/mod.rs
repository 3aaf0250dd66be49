//! Local LLM endpoint client and invocation plumbing.

mod client;
pub mod overflow;
mod types;

pub use client::{LlmClient, LocalLlmClient, LocalLlmConfig, ScriptedLlm};
pub use overflow::{OverflowDebug, OverflowPolicy, OverflowRunner, OverflowStep};
pub use types::{CompletionRequest, CompletionResponse};

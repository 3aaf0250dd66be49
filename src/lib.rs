//! # helix-ask
//!
//! A retrieval-augmented answering engine for code repositories.
//!
//! ## Core Components
//!
//! - **Intent**: profile directory routing questions to strategies
//! - **Retrieval**: hybrid candidate generation fused by weighted RRF and
//!   diversified by MMR, with tier descent and a docs-grep fallback
//! - **Passes**: evidence distillation, synthesis under format contracts,
//!   and citation repair, all under overflow retry
//! - **Gates**: evidence, claim, slot, belief, rattling, lint, format, and
//!   ambiguity checks over the accumulated answer and evidence
//! - **Orchestrator**: plan/execute over a tool manifest with a closed error
//!   taxonomy
//! - **Trajectory**: training-trace emission under the alpha governor
//!
//! ## Example
//!
//! ```rust,ignore
//! use helix_ask::{AskPipeline, AskRequest};
//!
//! let outcome = pipeline.run(&AskRequest {
//!     question: "What is the Platonic reasoning gate?".to_string(),
//!     ..Default::default()
//! }, None).await?;
//! println!("{}", outcome.text);
//! ```

pub mod answer;
pub mod concepts;
pub mod config;
pub mod envelope;
pub mod error;
pub mod gates;
pub mod intent;
pub mod jobs;
pub mod lattice;
pub mod llm;
pub mod longprompt;
pub mod orchestrator;
pub mod passes;
pub mod pipeline;
pub mod planner;
pub mod retrieval;
pub mod server;
pub mod stream;
pub mod text;
pub mod toollog;
pub mod topic;
pub mod trajectory;

// Re-exports for convenience
pub use answer::{derive_format_spec, AnswerFormat, FormatSpec};
pub use concepts::{ConceptCard, ConceptMatch, ConceptStore};
pub use config::Settings;
pub use envelope::{build_envelope, AnswerEnvelope, EnvelopeMode};
pub use error::{Error, Result};
pub use gates::{Arbiter, ArbiterDecision, GateMetrics, GateOutcome, GateReport};
pub use intent::{
    EvidenceKind, EvidencePolicy, FormatPolicy, IntentDirectory, IntentDomain, IntentMatch,
    IntentProfile, IntentTier, Strategy,
};
pub use jobs::{JobRecord, JobResult, JobStatus, JobStore};
pub use lattice::{LatticeNode, LatticeSnapshot};
pub use llm::{
    CompletionRequest, CompletionResponse, LlmClient, LocalLlmClient, LocalLlmConfig,
    OverflowDebug, OverflowPolicy, OverflowRunner, ScriptedLlm,
};
pub use longprompt::{IngestReason, LongPromptIngester};
pub use orchestrator::{
    build_plan, classify_error, ExecErrorKind, ExecutionOutcome, Executor, FnTool, PlanCache,
    PlanRecord, PlanStep, ResonanceBundle, ResonancePatch, Tool, ToolContext, ToolRegistry,
};
pub use pipeline::{AskDebug, AskOutcome, AskPipeline, AskRequest};
pub use planner::{merge_queries, parse_plan, PlanDirectives, RequiredSlot, Surface};
pub use retrieval::{
    Candidate, Channel, ContextBlock, EvidencePack, HybridRetriever, PlanScope, RetrievalMetrics,
    RetrievalRequest,
};
pub use stream::AnswerStreamEmitter;
pub use toollog::{IngestLimiter, ToolLogEvent, ToolLogQuery, ToolLogStore};
pub use trajectory::{
    AdmitDecision, AlphaGovernor, ExecutionEnvelope, TraceOrigin, TraceStore, Trajectory,
    TrajectoryEmitter,
};

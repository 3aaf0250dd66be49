//! The Ask pipeline: intent routing, retrieval, LLM passes, gate stack,
//! post-processing, and envelope packaging for one request.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::answer::{derive_format_spec, extract_citations, hygiene, FormatSpec};
use crate::concepts::{ConceptMatch, ConceptStore};
use crate::config::Settings;
use crate::envelope::{build_envelope, AnswerEnvelope};
use crate::error::Result;
use crate::gates::{
    ambiguity_gate, belief_gate, claim_gate, enforce_format, evidence_gate, lint_answer,
    must_include_gate, rattling_gate, resolve_pre_intent, slot_coverage_gate,
    verification_anchor_gate, Arbiter, ArbiterDecision, ArbiterSignals, GateReport,
};
use crate::intent::{IntentDirectory, IntentDomain, IntentMatch, Strategy};
use crate::lattice::LatticeSnapshot;
use crate::llm::{LlmClient, OverflowDebug, OverflowRunner};
use crate::longprompt::{IngestReason, LongPromptIngester};
use crate::passes::{distill_evidence, repair_citations, synthesize_answer, EvidenceNotes};
use crate::planner::{merge_queries, PlanDirectives, PlanPass};
use crate::retrieval::{EvidencePack, HybridRetriever, PlanScope, RetrievalRequest};
use crate::stream::AnswerStreamEmitter;
use crate::text::{detect_hints, normalize_prompt};
use crate::topic::{profile_for_tags, tag_question};

/// One Ask request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AskRequest {
    pub question: String,
    /// Attached prompt/context, possibly oversized
    pub context: Option<String>,
    pub search_query: Option<String>,
    pub top_k: Option<usize>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub seed: Option<u64>,
    pub debug: bool,
    pub dry_run: bool,
    pub session_id: Option<String>,
    pub trace_id: Option<String>,
}

/// Debug trace accumulated across stages.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AskDebug {
    pub intent_id: String,
    pub intent_reason: String,
    pub topic_tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_directives: Option<PlanDirectives>,
    pub retrieval: crate::retrieval::RetrievalMetrics,
    pub arbiter_mode: Option<ArbiterDecision>,
    pub arbiter_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lint_reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overflow: Option<OverflowDebug>,
    pub gate_report: GateReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_anchor_violation: Option<bool>,
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone)]
pub struct AskOutcome {
    pub text: String,
    pub envelope: Option<AnswerEnvelope>,
    pub debug: Option<AskDebug>,
    pub prompt_ingested: bool,
    pub prompt_ingest_source: Option<String>,
    pub prompt_ingest_reason: Option<IngestReason>,
    pub dry_run: bool,
    pub mode: ArbiterDecision,
    pub gate_report: GateReport,
    pub evidence_files: Vec<String>,
    pub citations: Vec<String>,
    pub trace_id: String,
}

/// Clarify line for the obligation path when retrieval comes back empty.
const OBLIGATION_CLARIFY: &str =
    "Repo evidence was required by the question but could not be confirmed. Could you \
     name the file, route, or module you mean?";

/// The pipeline and its injected collaborators.
pub struct AskPipeline {
    settings: Settings,
    runner: OverflowRunner,
    retriever: HybridRetriever,
    ingester: LongPromptIngester,
    concepts: ConceptStore,
    intents: IntentDirectory,
}

impl AskPipeline {
    pub fn new(
        settings: Settings,
        llm: Arc<dyn LlmClient>,
        snapshot: Arc<LatticeSnapshot>,
        concepts: ConceptStore,
        intents: IntentDirectory,
    ) -> Self {
        Self {
            runner: OverflowRunner::new(llm),
            retriever: HybridRetriever::new(snapshot, settings.clone()),
            ingester: LongPromptIngester::new(settings.clone()),
            concepts,
            intents,
            settings,
        }
    }

    /// Run the pipeline. When `partial_sink` is given, the final answer is
    /// re-chunked through the stream emitter and sent as ordered partials.
    pub async fn run(
        &self,
        request: &AskRequest,
        partial_sink: Option<mpsc::Sender<String>>,
    ) -> Result<AskOutcome> {
        let trace_id = request
            .trace_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let question = normalize_prompt(&request.question);
        let hints = detect_hints(&question);
        let concept = self.concepts.lookup(&question);

        let mut debug = AskDebug::default();
        let mut report = GateReport::default();

        // Pre-intent ambiguity resolver: clarify instead of answering.
        if let Some(clarify) =
            resolve_pre_intent(&question, &hints, concept.as_ref(), &self.settings.gates)
        {
            report.record("ambiguity_pre", false);
            report.note("pre_intent_clarify");
            return Ok(self.clarify_outcome(request, clarify, trace_id, report, debug));
        }
        report.record("ambiguity_pre", true);

        // Intent routing.
        let intent = self.intents.match_question(&question, &hints);
        debug.intent_id = intent.profile.id.clone();
        debug.intent_reason = intent.reason.clone();
        let obligation = hints.has_repo_expectation
            || (intent.profile.domain == IntentDomain::Repo
                && intent.profile.evidence.require_citations);
        let spec = derive_format_spec(intent.profile.format_policy, &question);

        // Topic profiling.
        let tags = tag_question(&question, request.search_query.as_deref());
        debug.topic_tags = tags.iter().map(|t| t.to_string()).collect();
        let topic = profile_for_tags(&tags);

        // Long-prompt ingest decision.
        let capacity = self.runner.client().context_tokens();
        let mut ingest_pack: Option<EvidencePack> = None;
        let mut ingest_source = None;
        let mut ingest_reason = None;
        if let Some(attached) = request.context.as_deref() {
            let attached = normalize_prompt(attached);
            if let Some(reason) = self.ingester.should_ingest(&attached, &question, capacity) {
                ingest_reason = Some(reason);
                let (pack, source) = self.ingester.ingest(&attached, &question, capacity);
                ingest_source = Some(source);
                ingest_pack = Some(pack);
            }
        }

        // Dry run: report routing and ingest decisions, no synthesis.
        if request.dry_run {
            debug.gate_report = report.clone();
            return Ok(AskOutcome {
                text: String::new(),
                envelope: None,
                debug: request.debug.then_some(debug),
                prompt_ingested: ingest_pack.is_some(),
                prompt_ingest_source: ingest_source,
                prompt_ingest_reason: ingest_reason,
                dry_run: true,
                mode: ArbiterDecision::General,
                gate_report: report,
                evidence_files: Vec::new(),
                citations: Vec::new(),
                trace_id,
            });
        }

        // Forced composite answer for the pipeline-overview intent.
        if intent.profile.strategy == Strategy::PipelineOverview {
            let answer = build_pipeline_answer();
            report.record("forced_answer", true);
            return Ok(self.package(
                request, &question, answer, &intent, &spec, trace_id,
                ArbiterDecision::RepoGrounded, EvidencePack::default(), report, debug,
            ));
        }

        // Concept fast path: a strong concept match answers definition
        // questions from the card.
        if intent.profile.strategy == Strategy::ConceptDefinition {
            if let Some(m) = concept.as_ref().filter(|m| {
                m.score >= self.settings.gates.concept_min_score
                    && m.margin >= self.settings.gates.concept_margin_min
            }) {
                let answer = concept_answer(m);
                report.record("concept_fast_path", true);
                return Ok(self.package(
                    request, &question, answer, &intent, &spec, trace_id,
                    ArbiterDecision::Hybrid, EvidencePack::default(), report, debug,
                ));
            }
        }

        // Plan pass (micro), when enabled for this intent.
        let mut base_queries: Vec<String> = vec![question.clone()];
        if let Some(q) = request.search_query.as_deref() {
            base_queries.push(q.to_string());
        }
        let mut plan_scope: Option<PlanScope> = None;
        let mut queries = base_queries.clone();
        let run_plan_pass = self.settings.micro_pass
            || (self.settings.micro_pass_auto && intent.profile.domain == IntentDomain::Repo);
        if run_plan_pass {
            let planner = PlanPass::new(&self.runner, &self.settings);
            match planner.run(&question, &base_queries).await {
                Ok(outcome) => {
                    if let Some(clarify) = outcome.directives.clarify_question.clone() {
                        report.record("plan_clarify", false);
                        debug.plan_directives = Some(outcome.directives);
                        return Ok(self.clarify_outcome(request, clarify, trace_id, report, debug));
                    }
                    queries = outcome.merged_queries.clone();
                    plan_scope = Some(outcome.directives.to_plan_scope());
                    debug.plan_directives = Some(outcome.directives);
                }
                Err(err) => {
                    // The plan pass is advisory; failures fall back to base
                    // queries.
                    tracing::warn!(error = %err, "plan pass failed");
                    report.note("plan_pass_failed");
                }
            }
        }
        if queries.is_empty() {
            queries = merge_queries(&base_queries, &[], self.settings.query_cap);
        }

        // Retrieval (or the ingested chunk pack for long prompts).
        let top_k = request.top_k.unwrap_or(self.settings.context_files);
        let pack = if let Some(pack) = ingest_pack {
            pack
        } else {
            let retrieval_request = RetrievalRequest {
                question: question.clone(),
                queries: queries.clone(),
                top_k,
                topic_profile: topic.clone(),
                plan_scope: plan_scope.clone(),
                require_repo_evidence: obligation,
                concept_paths: concept
                    .as_ref()
                    .map(|m| m.card.source_paths.clone())
                    .unwrap_or_default(),
            };
            let mut pack = self.retriever.retrieve(&retrieval_request);
            if pack.is_empty() && self.settings.retrieval_retry {
                // Retry once with the scope relaxed.
                let relaxed = RetrievalRequest {
                    topic_profile: None,
                    plan_scope: None,
                    ..retrieval_request
                };
                pack = self.retriever.retrieve(&relaxed);
                report.note("retrieval_retry");
            }
            pack
        };
        debug.retrieval = pack.metrics.clone();

        if pack.is_empty() && obligation {
            report.record("retrieval", false);
            return Ok(self.clarify_outcome(
                request,
                OBLIGATION_CLARIFY.to_string(),
                trace_id,
                report,
                debug,
            ));
        }
        report.record("retrieval", !pack.is_empty());

        // Evidence gate.
        let evidence = evidence_gate(&question, &pack, &self.settings.gates);
        report.metrics.match_ratio = evidence.match_ratio;
        report.metrics.matched_tokens = evidence.matched;
        report.record("evidence", evidence.pass);

        // Evidence distillation (two-pass); the claim gate inspects the
        // distilled items before the arbiter commits to a mode.
        let notes = if self.settings.two_pass && !pack.is_empty() {
            match distill_evidence(
                &self.runner,
                &question,
                &pack,
                &spec,
                self.settings.default_max_tokens.min(512),
            )
            .await
            {
                Ok(notes) => notes,
                Err(err) => {
                    tracing::warn!(error = %err, "evidence distillation failed");
                    report.note("distill_failed");
                    EvidenceNotes::default()
                }
            }
        } else {
            EvidenceNotes::default()
        };

        // Claim gate over the distilled items.
        if self.settings.gates.claim_gate && !notes.items.is_empty() {
            let claims = claim_gate(&notes.items, &pack, &self.settings.gates);
            report.metrics.claim_support_ratio = Some(claims.support_ratio);
            report.record("claims", claims.pass);
        }

        // Slot coverage and must-include.
        let required_slots = debug
            .plan_directives
            .as_ref()
            .map(|d| d.required_slots.clone())
            .unwrap_or_default();
        let slots = slot_coverage_gate(
            &required_slots,
            &pack,
            concept.as_ref().map(|m| m.card.name.as_str()),
        );
        report.record("slots", slots.pass);
        report.record("must_include", must_include_gate(&pack));
        if let Some(anchor_ok) = verification_anchor_gate(intent.profile.strategy, &pack) {
            report.record("verification_anchor", anchor_ok);
            debug.endpoint_anchor_violation = Some(!anchor_ok);
        }

        // Post-retrieval ambiguity.
        if let Some(clarify) = ambiguity_gate(&question, &pack, obligation, &self.settings.gates) {
            if !evidence.pass {
                report.record("ambiguity_post", false);
                return Ok(self.clarify_outcome(request, clarify, trace_id, report, debug));
            }
            report.note("ambiguity_terms_present");
        }
        report.record("ambiguity_post", true);

        // Arbiter.
        let arbiter = Arbiter::new(self.settings.arbiter.clone());
        let signals = ArbiterSignals::derive(&pack, evidence.match_ratio, true);
        let (mode, confidence) = arbiter.decide(&signals, intent.profile.domain, obligation);
        report.metrics.retrieval_confidence = Some(confidence);
        debug.arbiter_mode = Some(mode);
        debug.arbiter_confidence = Some(confidence);
        if mode == ArbiterDecision::Clarify {
            report.record("arbiter", false);
            return Ok(self.clarify_outcome(
                request,
                OBLIGATION_CLARIFY.to_string(),
                trace_id,
                report,
                debug,
            ));
        }
        report.record("arbiter", true);

        // Synthesis.
        let max_tokens = request.max_tokens.unwrap_or(self.settings.default_max_tokens);
        let raw_context = pack.render();
        let synthesis = synthesize_answer(
            &self.runner,
            &question,
            &notes,
            Some(raw_context.as_str()),
            &spec,
            max_tokens,
            request.temperature,
            request.seed,
        )
        .await?;
        debug.overflow = Some(synthesis.overflow.clone());
        let mut answer = synthesis.answer;

        // Format enforcement.
        let formatted = enforce_format(&answer, &spec, &question);
        report.record("format", formatted.pass);
        for note in &formatted.notes {
            report.note(note.clone());
        }
        answer = formatted.answer;

        // Citation repair.
        let evidence_paths: Vec<String> = if notes.paths.is_empty() {
            pack.files.clone()
        } else {
            notes.paths.clone()
        };
        let (repaired, _citation_outcome) = repair_citations(
            &self.runner,
            answer,
            &evidence_paths,
            intent.profile.evidence.allow_citations,
        )
        .await;
        answer = repaired;

        // Platonic gates: lint, belief, rattling.
        let lint = lint_answer(&answer);
        debug.lint_reasons = lint.reasons.clone();
        answer = lint.answer;

        let belief = belief_gate(&answer, &notes.items, &self.settings.gates);
        report.metrics.unsupported_rate = Some(belief.unsupported_rate);
        if !notes.items.is_empty() {
            report.record("belief", belief.pass);
            if !belief.pass {
                return Ok(self.clarify_outcome(
                    request,
                    "I could not verify enough of that answer against the repository \
                     evidence to state it confidently. Could you narrow the question?"
                        .to_string(),
                    trace_id,
                    report,
                    debug,
                ));
            }
        }

        let rattling = rattling_gate(&answer, &self.settings.gates);
        report.metrics.rattling_score = Some(rattling.rattling_score);
        report.record("rattling", rattling.pass);

        let mut outcome = self.package(
            request, &question, answer, &intent, &spec, trace_id, mode, pack, report, debug,
        );
        outcome.prompt_ingested = ingest_reason.is_some();
        outcome.prompt_ingest_source = ingest_source;
        outcome.prompt_ingest_reason = ingest_reason;

        // Stream partials of the final text when a sink is attached, so a
        // job's accumulated partial text is always a prefix of its result.
        if let Some(sink) = &partial_sink {
            stream_partials(sink, &outcome.text, &self.settings).await;
        }

        Ok(outcome)
    }

    /// Package the final outcome: hygiene, envelope, citations.
    #[allow(clippy::too_many_arguments)]
    fn package(
        &self,
        request: &AskRequest,
        question: &str,
        answer: String,
        intent: &IntentMatch,
        spec: &FormatSpec,
        trace_id: String,
        mode: ArbiterDecision,
        pack: EvidencePack,
        mut report: GateReport,
        mut debug: AskDebug,
    ) -> AskOutcome {
        let known_files: Vec<String> = pack.files.clone();
        let text = hygiene::format_answer(&answer, question, &known_files, spec);
        let citations = extract_citations(&text);
        let envelope = build_envelope(
            &text,
            spec.format,
            intent.profile.tier,
            intent.profile.secondary_tier,
            &pack.files,
            &trace_id,
        );
        report.record("envelope", true);
        debug.gate_report = report.clone();

        AskOutcome {
            text,
            envelope: Some(envelope),
            debug: request.debug.then_some(debug),
            prompt_ingested: false,
            prompt_ingest_source: None,
            prompt_ingest_reason: None,
            dry_run: false,
            mode,
            gate_report: report,
            evidence_files: pack.files,
            citations,
            trace_id,
        }
    }

    /// Terminal clarify outcome: no further synthesis happens.
    #[allow(clippy::too_many_arguments)]
    fn clarify_outcome(
        &self,
        request: &AskRequest,
        clarify: String,
        trace_id: String,
        mut report: GateReport,
        mut debug: AskDebug,
    ) -> AskOutcome {
        let spec = FormatSpec {
            format: crate::answer::AnswerFormat::Brief,
            stage_tags: false,
        };
        report.record("clarify", true);
        debug.arbiter_mode = Some(ArbiterDecision::Clarify);
        debug.gate_report = report.clone();
        let envelope = build_envelope(
            &clarify,
            spec.format,
            crate::intent::IntentTier::F3,
            None,
            &[],
            &trace_id,
        );
        AskOutcome {
            text: clarify,
            envelope: Some(envelope),
            debug: request.debug.then_some(debug),
            prompt_ingested: false,
            prompt_ingest_source: None,
            prompt_ingest_reason: None,
            dry_run: false,
            mode: ArbiterDecision::Clarify,
            gate_report: report,
            evidence_files: Vec::new(),
            citations: Vec::new(),
            trace_id,
        }
    }
}

/// Re-chunk a finished answer through the stream emitter and send the
/// ordered partials into the sink.
async fn stream_partials(sink: &mpsc::Sender<String>, answer: &str, settings: &Settings) {
    let mut emitter = AnswerStreamEmitter::new(settings.stream.clone());
    // No separators around the markers: the emitted chunks must concatenate
    // to exactly the final text so job partials stay a strict prefix.
    let wrapped = format!(
        "{}{}{}",
        crate::llm::overflow::ANSWER_START,
        answer,
        crate::llm::overflow::ANSWER_END
    );
    let mut chunks = Vec::new();
    let mut buf = String::new();
    for c in wrapped.chars() {
        buf.push(c);
        if buf.len() >= 256 {
            chunks.extend(emitter.push(&buf));
            buf.clear();
        }
    }
    if !buf.is_empty() {
        chunks.extend(emitter.push(&buf));
    }
    chunks.extend(emitter.finalize());
    for chunk in chunks {
        if sink.send(chunk).await.is_err() {
            break;
        }
    }
}

/// The forced composite answer for "how does the pipeline work".
fn build_pipeline_answer() -> String {
    "\
1. A question arrives at the ask route (server/routes/agi.plan.ts) and is \
normalized before intent routing picks a profile \
(server/services/helix-ask/intent-directory.ts).
2. Topic tags derive the retrieval scope, allowlist tiers, and must-include \
files (server/services/helix-ask/topic.ts).
3. The hybrid retriever fuses lexical, symbol, fuzzy, and path channels with \
weighted reciprocal-rank fusion and diversifies the selection \
(server/services/helix-ask/query.ts).
4. Synthesis runs under a strict format contract and the gate stack verifies \
evidence coverage, claim support, and formatting \
(server/services/helix-ask/format.ts).
5. The bounded envelope with evidence refs and a trace id is returned to the \
pill UI (server/services/helix-ask/envelope.ts, \
client/src/components/helix/HelixAskPill.tsx).

In practice, the full flow is documented end to end in docs/helix-ask-flow.md."
        .to_string()
}

/// Definition-first answer assembled from a concept card.
fn concept_answer(m: &ConceptMatch) -> String {
    let mut out = m.card.definition.trim().to_string();
    if !m.card.source_paths.is_empty() {
        out.push_str("\n\n");
        out.push_str(&format!(
            "In this repository, see {}.",
            m.card.source_paths.join(" and ")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::LatticeNode;
    use crate::llm::ScriptedLlm;

    fn snapshot() -> Arc<LatticeSnapshot> {
        Arc::new(LatticeSnapshot::from_nodes(vec![
            LatticeNode {
                symbol: "askRoute".to_string(),
                file_path: "server/routes/agi.plan.ts".to_string(),
                signature: "router.post('/api/agi/ask', askRoute)".to_string(),
                doc: "Registers the ask HTTP route.".to_string(),
                snippet: "router.post('/api/agi/ask', askRoute)".to_string(),
            },
            LatticeNode {
                symbol: "helixAskFlow".to_string(),
                file_path: "docs/helix-ask-flow.md".to_string(),
                signature: String::new(),
                doc: "The pipeline stages in order.".to_string(),
                snippet: "intent, retrieval, gates, envelope".to_string(),
            },
        ]))
    }

    fn pipeline(llm: Arc<dyn LlmClient>) -> AskPipeline {
        let mut settings = Settings::default();
        settings.micro_pass_auto = false;
        AskPipeline::new(
            settings,
            llm,
            snapshot(),
            ConceptStore::builtin(),
            IntentDirectory::builtin(),
        )
    }

    #[tokio::test]
    async fn concept_question_answers_from_card_without_llm() {
        let llm = Arc::new(ScriptedLlm::repeating("unused", 8192));
        let p = pipeline(llm.clone());
        let request = AskRequest {
            question: "What is the Platonic reasoning gate?".to_string(),
            ..Default::default()
        };
        let outcome = p.run(&request, None).await.unwrap();
        assert!(outcome.text.contains("battery of checks"));
        assert!(outcome.text.contains("docs/knowledge/platonic-reasoning.md"));
        let envelope = outcome.envelope.unwrap();
        assert_eq!(envelope.mode, crate::envelope::EnvelopeMode::Brief);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn pipeline_overview_is_forced() {
        let llm = Arc::new(ScriptedLlm::repeating("unused", 8192));
        let p = pipeline(llm.clone());
        let request = AskRequest {
            question: "How does the Helix Ask pipeline work?".to_string(),
            ..Default::default()
        };
        let outcome = p.run(&request, None).await.unwrap();
        assert!(outcome.text.contains("docs/helix-ask-flow.md"));
        assert!(outcome.text.contains("In practice,"));
        assert_eq!(llm.call_count(), 0);
        assert_eq!(outcome.mode, ArbiterDecision::RepoGrounded);
    }

    #[tokio::test]
    async fn short_vague_question_clarifies_without_llm() {
        let llm = Arc::new(ScriptedLlm::repeating("unused", 8192));
        let p = pipeline(llm.clone());
        let request = AskRequest {
            question: "the thing?".to_string(),
            ..Default::default()
        };
        let outcome = p.run(&request, None).await.unwrap();
        assert_eq!(outcome.mode, ArbiterDecision::Clarify);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn dry_run_reports_ingest_without_synthesis() {
        let llm = Arc::new(ScriptedLlm::repeating("unused", 8192));
        let p = pipeline(llm.clone());
        let request = AskRequest {
            question: "Summarize the attached design notes about retrieval.".to_string(),
            context: Some("# Notes\n".to_string() + &"retrieval notes ".repeat(8000)),
            dry_run: true,
            ..Default::default()
        };
        let outcome = p.run(&request, None).await.unwrap();
        assert!(outcome.dry_run);
        assert!(outcome.prompt_ingested);
        assert_eq!(outcome.prompt_ingest_reason, Some(IngestReason::Threshold));
        assert_eq!(outcome.text, "");
        assert_eq!(llm.call_count(), 0);
    }
}

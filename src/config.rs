//! Env-driven runtime settings.
//!
//! Every behavior-affecting knob is read once at startup into a `Settings`
//! record and injected into the pipeline. Defaults match the documented
//! retrieval and gate constants; the environment only overrides them.

use std::env;

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Retrieval fusion settings.
#[derive(Debug, Clone)]
pub struct FusionSettings {
    /// RRF K constant
    pub rrf_k: u32,
    /// Channel weight: lexical
    pub rrf_weight_lexical: f64,
    /// Channel weight: symbol
    pub rrf_weight_symbol: f64,
    /// Channel weight: fuzzy
    pub rrf_weight_fuzzy: f64,
    /// Channel weight: path
    pub rrf_weight_path: f64,
    /// MMR diversification lambda
    pub mmr_lambda: f64,
    /// Trigram similarity floor for the fuzzy channel
    pub fuzzy_threshold: f64,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            rrf_k: 60,
            rrf_weight_lexical: 1.0,
            rrf_weight_symbol: 0.8,
            rrf_weight_fuzzy: 0.6,
            rrf_weight_path: 1.5,
            mmr_lambda: 0.72,
            fuzzy_threshold: 0.25,
        }
    }
}

/// Long-prompt ingest settings.
#[derive(Debug, Clone)]
pub struct LongPromptSettings {
    /// Attached prompts at or above this token estimate are chunk-ingested
    pub trigger_tokens: u32,
    /// Target chunk size in tokens (packed as tokens * 4 chars)
    pub chunk_tokens: u32,
    /// Overlap between adjacent chunks, in tokens
    pub overlap_tokens: u32,
    /// Number of chunks retrieved per question
    pub top_chunks: usize,
    /// Fixed token overhead reserved for chunk headers
    pub overhead_tokens: u32,
}

impl Default for LongPromptSettings {
    fn default() -> Self {
        Self {
            trigger_tokens: 6000,
            chunk_tokens: 700,
            overlap_tokens: 80,
            top_chunks: 6,
            overhead_tokens: 256,
        }
    }
}

/// Gate thresholds.
#[derive(Debug, Clone)]
pub struct GateSettings {
    /// Evidence gate: minimum matched-token ratio
    pub evidence_min_ratio: f64,
    /// Evidence gate: minimum matched-token count
    pub evidence_min_tokens: usize,
    /// Stricter critic variant of the evidence gate
    pub evidence_critic: bool,
    /// Claim gate enabled
    pub claim_gate: bool,
    /// Claim gate: maximum claims extracted
    pub claim_max: usize,
    /// Claim gate: per-claim signal-token ratio floor
    pub claim_min_ratio: f64,
    /// Claim gate: per-claim signal-token count floor
    pub claim_min_tokens: usize,
    /// Claim gate: supported/total floor
    pub claim_support_ratio: f64,
    /// Belief gate: unsupported-rate ceiling
    pub belief_unsupported_max: f64,
    /// Rattling gate: instability score ceiling
    pub rattling_threshold: f64,
    /// Rattling gate rejects instead of annotating
    pub rattling_reject: bool,
    /// Pre-intent ambiguity: content-token count at or below this is short
    pub ambiguity_short_tokens: usize,
    /// Pre-intent ambiguity: concept score that counts as a strong match
    pub concept_min_score: f64,
    /// Pre-intent ambiguity: required margin over the runner-up concept
    pub concept_margin_min: f64,
    /// Post-retrieval ambiguity: max unknown terms cited in the clarify line
    pub ambiguity_max_terms: usize,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            evidence_min_ratio: 0.34,
            evidence_min_tokens: 2,
            evidence_critic: false,
            claim_gate: true,
            claim_max: 12,
            claim_min_ratio: 0.5,
            claim_min_tokens: 2,
            claim_support_ratio: 0.6,
            belief_unsupported_max: 0.4,
            rattling_threshold: 0.55,
            rattling_reject: false,
            ambiguity_short_tokens: 3,
            concept_min_score: 0.6,
            concept_margin_min: 0.15,
            ambiguity_max_terms: 3,
        }
    }
}

/// Arbiter thresholds.
#[derive(Debug, Clone)]
pub struct ArbiterSettings {
    /// Confidence at or above this selects repo-grounded mode
    pub repo_threshold: f64,
    /// Confidence at or above this selects hybrid mode
    pub hybrid_threshold: f64,
}

impl Default for ArbiterSettings {
    fn default() -> Self {
        Self {
            repo_threshold: 0.62,
            hybrid_threshold: 0.38,
        }
    }
}

/// Stream emitter settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Flush when the buffer reaches this many characters
    pub chunk_max_chars: usize,
    /// Flush at least this often while content is pending
    pub flush_ms: u64,
    /// Hard ceiling on emitted events
    pub max_events: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            chunk_max_chars: 512,
            flush_ms: 150,
            max_events: 512,
        }
    }
}

/// Alpha-governor settings.
#[derive(Debug, Clone)]
pub struct AlphaSettings {
    /// Target live/total acceptance ratio
    pub target: f64,
    /// Window of recent traces counted
    pub window: usize,
    /// Governor enabled at all
    pub enabled: bool,
}

impl Default for AlphaSettings {
    fn default() -> Self {
        Self {
            target: 0.8,
            window: 50,
            enabled: true,
        }
    }
}

/// Opaque proxy endpoints (TTS/STT/call-spec).
#[derive(Debug, Clone, Default)]
pub struct ProxySettings {
    pub tts_url: Option<String>,
    pub stt_url: Option<String>,
    pub call_spec_url: Option<String>,
    /// Proxy call ceiling
    pub timeout_ms: u64,
}

/// Complete runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Max context blocks assembled into an evidence pack
    pub context_files: usize,
    /// Max characters per context block preview
    pub context_chars: usize,
    /// Run the evidence-distillation pass before synthesis
    pub two_pass: bool,
    /// Run the micro plan pass
    pub micro_pass: bool,
    /// Auto-enable the micro pass for repo-domain intents
    pub micro_pass_auto: bool,
    /// Local LLM context window, in tokens
    pub local_context_tokens: u32,
    /// Default synthesis output budget, in tokens
    pub default_max_tokens: u32,
    /// Retrieval retried once with relaxed scope on empty context
    pub retrieval_retry: bool,
    /// Job execution ceiling
    pub job_timeout_ms: u64,
    /// Job record TTL before pruning
    pub job_ttl_ms: u64,
    /// Plan record cache TTL
    pub plan_cache_ttl_ms: u64,
    /// Plan record cache max entries
    pub plan_cache_max: usize,
    /// Knowledge fetch ceiling
    pub knowledge_fetch_timeout_ms: u64,
    /// Resonance bundle build ceiling
    pub resonance_build_timeout_ms: u64,
    /// Task-trace persistence ceiling
    pub save_task_trace_timeout_ms: u64,
    /// Whitespace keep-alive pings on the synchronous ask endpoint
    pub keepalive_pings: bool,
    /// Merged query cap after the plan pass
    pub query_cap: usize,
    pub fusion: FusionSettings,
    pub longprompt: LongPromptSettings,
    pub gates: GateSettings,
    pub arbiter: ArbiterSettings,
    pub stream: StreamSettings,
    pub alpha: AlphaSettings,
    /// Base URL of the local LLM endpoint
    pub llm_base_url: String,
    /// Root of the indexed repository, for docs-grep and path resolution
    pub repo_root: String,
    pub proxy: ProxySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            context_files: 8,
            context_chars: 900,
            two_pass: true,
            micro_pass: false,
            micro_pass_auto: true,
            local_context_tokens: 8192,
            default_max_tokens: 768,
            retrieval_retry: true,
            job_timeout_ms: 120_000,
            job_ttl_ms: 15 * 60 * 1000,
            plan_cache_ttl_ms: 10 * 60 * 1000,
            plan_cache_max: 64,
            knowledge_fetch_timeout_ms: 8_000,
            resonance_build_timeout_ms: 12_000,
            save_task_trace_timeout_ms: 5_000,
            keepalive_pings: false,
            query_cap: 6,
            fusion: FusionSettings::default(),
            longprompt: LongPromptSettings::default(),
            gates: GateSettings::default(),
            arbiter: ArbiterSettings::default(),
            stream: StreamSettings::default(),
            alpha: AlphaSettings::default(),
            llm_base_url: "http://127.0.0.1:8080".to_string(),
            repo_root: ".".to_string(),
            proxy: ProxySettings {
                tts_url: None,
                stt_url: None,
                call_spec_url: None,
                timeout_ms: 20_000,
            },
        }
    }
}

impl Settings {
    /// Read settings from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            context_files: env_usize("HELIX_ASK_CONTEXT_FILES", d.context_files),
            context_chars: env_usize("HELIX_ASK_CONTEXT_CHARS", d.context_chars),
            two_pass: env_bool("HELIX_ASK_TWO_PASS", d.two_pass),
            micro_pass: env_bool("HELIX_ASK_MICRO_PASS", d.micro_pass),
            micro_pass_auto: env_bool("HELIX_ASK_MICRO_PASS_AUTO", d.micro_pass_auto),
            local_context_tokens: env_u32("HELIX_ASK_LOCAL_CONTEXT_TOKENS", d.local_context_tokens),
            default_max_tokens: env_u32("HELIX_ASK_MAX_TOKENS", d.default_max_tokens),
            retrieval_retry: env_bool("HELIX_ASK_RETRIEVAL_RETRY", d.retrieval_retry),
            job_timeout_ms: env_u64("HELIX_ASK_JOB_TIMEOUT_MS", d.job_timeout_ms),
            job_ttl_ms: env_u64("HELIX_ASK_JOB_TTL_MS", d.job_ttl_ms),
            plan_cache_ttl_ms: env_u64("HELIX_ASK_PLAN_CACHE_TTL_MS", d.plan_cache_ttl_ms),
            plan_cache_max: env_usize("HELIX_ASK_PLAN_CACHE_MAX", d.plan_cache_max),
            knowledge_fetch_timeout_ms: env_u64(
                "HELIX_ASK_KNOWLEDGE_FETCH_TIMEOUT_MS",
                d.knowledge_fetch_timeout_ms,
            ),
            resonance_build_timeout_ms: env_u64(
                "HELIX_ASK_RESONANCE_BUILD_TIMEOUT_MS",
                d.resonance_build_timeout_ms,
            ),
            save_task_trace_timeout_ms: env_u64(
                "HELIX_ASK_SAVE_TASK_TRACE_TIMEOUT_MS",
                d.save_task_trace_timeout_ms,
            ),
            keepalive_pings: env_bool("ENABLE_ASK_KEEPALIVE", d.keepalive_pings),
            query_cap: env_usize("HELIX_ASK_QUERY_CAP", d.query_cap),
            fusion: FusionSettings {
                rrf_k: env_u32("HELIX_ASK_RRF_K", d.fusion.rrf_k),
                rrf_weight_lexical: env_f64("HELIX_ASK_RRF_WEIGHT_LEXICAL", d.fusion.rrf_weight_lexical),
                rrf_weight_symbol: env_f64("HELIX_ASK_RRF_WEIGHT_SYMBOL", d.fusion.rrf_weight_symbol),
                rrf_weight_fuzzy: env_f64("HELIX_ASK_RRF_WEIGHT_FUZZY", d.fusion.rrf_weight_fuzzy),
                rrf_weight_path: env_f64("HELIX_ASK_RRF_WEIGHT_PATH", d.fusion.rrf_weight_path),
                mmr_lambda: env_f64("HELIX_ASK_MMR_LAMBDA", d.fusion.mmr_lambda),
                fuzzy_threshold: env_f64("HELIX_ASK_FUZZY_THRESHOLD", d.fusion.fuzzy_threshold),
            },
            longprompt: LongPromptSettings {
                trigger_tokens: env_u32("HELIX_ASK_LONGPROMPT_TRIGGER_TOKENS", d.longprompt.trigger_tokens),
                chunk_tokens: env_u32("HELIX_ASK_LONGPROMPT_CHUNK_TOKENS", d.longprompt.chunk_tokens),
                overlap_tokens: env_u32("HELIX_ASK_LONGPROMPT_OVERLAP_TOKENS", d.longprompt.overlap_tokens),
                top_chunks: env_usize("HELIX_ASK_LONGPROMPT_TOP_CHUNKS", d.longprompt.top_chunks),
                overhead_tokens: env_u32("HELIX_ASK_LONGPROMPT_OVERHEAD_TOKENS", d.longprompt.overhead_tokens),
            },
            gates: GateSettings {
                evidence_min_ratio: env_f64("HELIX_ASK_EVIDENCE_MIN_RATIO", d.gates.evidence_min_ratio),
                evidence_min_tokens: env_usize("HELIX_ASK_EVIDENCE_MIN_TOKENS", d.gates.evidence_min_tokens),
                evidence_critic: env_bool("ENABLE_EVIDENCE_CRITIC", d.gates.evidence_critic),
                claim_gate: env_bool("ENABLE_CLAIM_GATE", d.gates.claim_gate),
                claim_max: env_usize("HELIX_ASK_CLAIM_MAX", d.gates.claim_max),
                claim_min_ratio: env_f64("HELIX_ASK_CLAIM_MIN_RATIO", d.gates.claim_min_ratio),
                claim_min_tokens: env_usize("HELIX_ASK_CLAIM_MIN_TOKENS", d.gates.claim_min_tokens),
                claim_support_ratio: env_f64("HELIX_ASK_CLAIM_SUPPORT_RATIO", d.gates.claim_support_ratio),
                belief_unsupported_max: env_f64("HELIX_ASK_BELIEF_UNSUPPORTED_MAX", d.gates.belief_unsupported_max),
                rattling_threshold: env_f64("HELIX_ASK_RATTLING_THRESHOLD", d.gates.rattling_threshold),
                rattling_reject: env_bool("ENABLE_RATTLING_REJECT", d.gates.rattling_reject),
                ambiguity_short_tokens: env_usize("HELIX_ASK_AMBIGUITY_SHORT_TOKENS", d.gates.ambiguity_short_tokens),
                concept_min_score: env_f64("HELIX_ASK_CONCEPT_MIN_SCORE", d.gates.concept_min_score),
                concept_margin_min: env_f64("HELIX_ASK_CONCEPT_MARGIN_MIN", d.gates.concept_margin_min),
                ambiguity_max_terms: env_usize("HELIX_ASK_AMBIGUITY_MAX_TERMS", d.gates.ambiguity_max_terms),
            },
            arbiter: ArbiterSettings {
                repo_threshold: env_f64("HELIX_ASK_ARBITER_REPO_THRESHOLD", d.arbiter.repo_threshold),
                hybrid_threshold: env_f64("HELIX_ASK_ARBITER_HYBRID_THRESHOLD", d.arbiter.hybrid_threshold),
            },
            stream: StreamSettings {
                chunk_max_chars: env_usize("HELIX_ASK_STREAM_CHUNK_MAX_CHARS", d.stream.chunk_max_chars),
                flush_ms: env_u64("HELIX_ASK_STREAM_FLUSH_MS", d.stream.flush_ms),
                max_events: env_usize("HELIX_ASK_STREAM_MAX_EVENTS", d.stream.max_events),
            },
            alpha: AlphaSettings {
                target: env_f64("AGI_REFINERY_ALPHA_TARGET", d.alpha.target),
                window: env_usize("AGI_REFINERY_ALPHA_WINDOW", d.alpha.window),
                enabled: env_bool("AGI_REFINERY_ALPHA_ENABLED", d.alpha.enabled),
            },
            llm_base_url: env_string("HELIX_ASK_LLM_BASE_URL", &d.llm_base_url),
            repo_root: env_string("HELIX_ASK_REPO_ROOT", &d.repo_root),
            proxy: ProxySettings {
                tts_url: env::var("HELIX_TTS_URL").ok(),
                stt_url: env::var("HELIX_STT_URL").ok(),
                call_spec_url: env::var("HELIX_CALL_SPEC_URL").ok(),
                timeout_ms: env_u64("HELIX_PROXY_TIMEOUT_MS", d.proxy.timeout_ms),
            },
        }
    }
}

//! Synthesis: the final answer pass under the format contract.

use crate::answer::{AnswerFormat, FormatSpec};
use crate::error::Result;
use crate::llm::overflow::{ANSWER_END, ANSWER_START};
use crate::llm::{CompletionRequest, OverflowDebug, OverflowRunner};

use super::distill::EvidenceNotes;
use super::prompts::PromptParts;

/// Result of the synthesis pass.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub answer: String,
    pub overflow: OverflowDebug,
}

/// Run the synthesis pass over the distilled evidence (or raw context when
/// the two-pass mode is off).
pub async fn synthesize_answer(
    runner: &OverflowRunner,
    question: &str,
    context: &EvidenceNotes,
    raw_context: Option<&str>,
    spec: &FormatSpec,
    max_tokens: u32,
    temperature: Option<f64>,
    seed: Option<u64>,
) -> Result<SynthesisResult> {
    let format_instruction = match spec.format {
        AnswerFormat::Steps => {
            "Answer as 6-9 numbered steps. Each step is 2-3 sentences. Close with a \
             final paragraph that starts with \"In practice,\"."
        }
        AnswerFormat::Compare => {
            "Answer in 1-2 short paragraphs, then a bullet list contrasting the \
             compared items. No numbered steps."
        }
        AnswerFormat::Brief => {
            "Answer in 1-2 short paragraphs. No numbered steps unless the question \
             explicitly asks for steps."
        }
    };

    let context_body = if context.items.is_empty() {
        raw_context.unwrap_or_default().to_string()
    } else {
        context.render()
    };

    let prompt = PromptParts::new("You answer questions about this repository from evidence.")
        .with_context(context_body)
        .with_question(question)
        .with_instruction(
            "Use only claims supported by the context. Do not introduce new claims.",
        )
        .with_instruction(format_instruction)
        .with_answer_markers()
        .render();

    let mut request = CompletionRequest::new("answer", prompt, max_tokens)
        .with_stop(vec![ANSWER_END.to_string()]);
    if let Some(t) = temperature {
        request = request.with_temperature(t);
    }
    if let Some(s) = seed {
        request = request.with_seed(s);
    }

    let (response, overflow) = runner.run(request, true).await?;
    let answer = extract_answer_block(&response.text);
    Ok(SynthesisResult { answer, overflow })
}

/// Pull the text between the answer markers; tolerate a missing end marker
/// (stop-sequence truncation) and a missing block entirely.
pub fn extract_answer_block(text: &str) -> String {
    match text.find(ANSWER_START) {
        Some(start) => {
            let body = &text[start + ANSWER_START.len()..];
            let end = body.find(ANSWER_END).unwrap_or(body.len());
            body[..end].trim().to_string()
        }
        None => text.trim().to_string(),
    }
}

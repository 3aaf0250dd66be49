//! Prompt assembly.
//!
//! Prompts are built over a `PromptParts` record and rendered to a string at
//! the boundary, so gate logic never reads raw prompt text.

use crate::llm::overflow::{ANSWER_END, ANSWER_START};

/// Builder for a pass prompt.
#[derive(Debug, Clone, Default)]
pub struct PromptParts {
    header: String,
    context: Option<String>,
    question: String,
    instructions: Vec<String>,
    /// Demand emission between the answer markers
    answer_markers: bool,
}

impl PromptParts {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        if !context.trim().is_empty() {
            self.context = Some(context);
        }
        self
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = question.into();
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    pub fn with_answer_markers(mut self) -> Self {
        self.answer_markers = true;
        self
    }

    /// Render the final prompt string.
    ///
    /// The context section is rendered last, directly before the marker
    /// instruction, so the overflow runner can drop everything between the
    /// `Context:` header and `ANSWER_START` without touching the question.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.header);
        out.push('\n');
        if !self.question.is_empty() {
            out.push_str("\nQuestion: ");
            out.push_str(&self.question);
            out.push('\n');
        }
        for instruction in &self.instructions {
            out.push('\n');
            out.push_str(instruction);
        }
        if let Some(context) = &self.context {
            out.push_str("\n\nContext:\n");
            out.push_str(context);
            out.push('\n');
        }
        if self.answer_markers {
            out.push_str(&format!(
                "\nEmit the answer between {ANSWER_START} and {ANSWER_END} markers, nothing else."
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_renders_last_before_markers() {
        let prompt = PromptParts::new("You answer questions about a repo.")
            .with_context("### docs/a.md\nbody")
            .with_question("What is X?")
            .with_instruction("Keep it short.")
            .with_answer_markers()
            .render();
        let ctx = prompt.find("Context:").unwrap();
        let q = prompt.find("Question:").unwrap();
        let marker = prompt.find(ANSWER_START).unwrap();
        assert!(q < ctx && ctx < marker);
    }

    #[test]
    fn empty_context_is_omitted() {
        let prompt = PromptParts::new("h").with_context("  ").with_question("q").render();
        assert!(!prompt.contains("Context:"));
    }
}

//! Prompt builder for narration refinement.
//!
//! [`PromptBuilder::build_chat`] returns a `(system_msg, user_msg)` pair for
//! any OpenAI-compatible `/v1/chat/completions` endpoint.  The optional
//! context is an excerpt from the start of the document so the model can
//! judge what counts as an artifact for this kind of text.

// ---------------------------------------------------------------------------
// System instruction
// ---------------------------------------------------------------------------

const SYSTEM_INSTRUCTION: &str = "\
You prepare book text for a text-to-speech narrator.
Task: Remove artifacts that would sound wrong when read aloud, and nothing else.

Rules:
1. Remove page numbers, running headers, separator lines and stray symbols.
2. Fix words broken by extraction (\"sepa rate\" -> \"separate\").
3. Remove garbage character runs that are not words in context.
4. Never summarise, paraphrase, reorder or add sentences.
5. Keep all dialogue and quotation marks exactly as written.
6. Reply with ONLY the cleaned paragraph - no explanation.
7. If the paragraph is already clean, return it unchanged.";

const FEW_SHOT_EXAMPLES: &str = "
Examples:
Input: \"-------rhgdo Unlike traditional methods, the new approach scales.\"
Output: \"Unlike traditional methods, the new approach scales.\"

Input: \"\"Come in,\" she said. 42 The door creaked open.\"
Output: \"\"Come in,\" she said. The door creaked open.\"
";

/// Upper bound on the document excerpt embedded as context.
pub const CONTEXT_EXCERPT_CHARS: usize = 400;

// ---------------------------------------------------------------------------
// PromptBuilder
// ---------------------------------------------------------------------------

/// Builds refinement prompts in chat-message format.
///
/// # Example
/// ```rust
/// use narrator::advisor::PromptBuilder;
///
/// let (system, user) = PromptBuilder::new().build_chat("Page 4 It was dark.", None);
/// assert!(system.contains("text-to-speech"));
/// assert!(user.contains("It was dark."));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build a `(system_msg, user_msg)` pair.
    pub fn build_chat(&self, paragraph: &str, context: Option<&str>) -> (String, String) {
        let mut user_msg = String::with_capacity(FEW_SHOT_EXAMPLES.len() + paragraph.len() + 256);
        user_msg.push_str(FEW_SHOT_EXAMPLES);
        if let Some(ctx) = context.filter(|c| !c.trim().is_empty()) {
            let excerpt: String = ctx.chars().take(CONTEXT_EXCERPT_CHARS).collect();
            user_msg.push_str("\nDocument opening (for context only):\n");
            user_msg.push_str(&excerpt);
            user_msg.push('\n');
        }
        user_msg.push_str(&format!("\nParagraph:\n{paragraph}\n\nCleaned:\n"));
        (SYSTEM_INSTRUCTION.to_string(), user_msg)
    }
}

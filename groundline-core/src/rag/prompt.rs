//! Grounded prompt construction.

use super::types::FALLBACK_ANSWER;

/// Builds the grounding instruction given to the model ahead of the context.
fn system_instruction() -> String {
    format!(
        "You are a helpful assistant for a private knowledge base. \
         Answer ONLY using the supplied context. If the answer is not in the context, say \
         \"{FALLBACK_ANSWER}\" \
         When you state any fact, immediately include an inline citation in the exact form [doc_id#chunk_id]. \
         Use multiple citations when a sentence uses multiple chunks. Keep answers concise."
    )
}

/// Assembles the full prompt for one question.
///
/// Passages are listed as bullets in the order given, which is the curated
/// order. The output depends only on the inputs.
pub fn build_prompt<S: AsRef<str>>(contexts: &[S], question: &str) -> String {
    let context = contexts
        .iter()
        .map(|c| format!("- {}", c.as_ref()))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{}\n\nContext:\n{}\n\nQuestion: {}\nAnswer (with citations):",
        system_instruction(),
        context,
        question
    )
}

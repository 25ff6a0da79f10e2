//! Prompt construction — one deterministic template for every provider.

/// Build the full prompt from the original text, the user's instruction,
/// and an optional reference-only context block.
///
/// The template pins the response contract: exactly `n` distinct rewrites
/// as a JSON object with a single `suggestions` key holding an array of
/// strings, fenced in triple backticks. Providers that honor a response
/// schema return the bare array instead; both shapes are handled on the
/// way back in (`normalize`).
pub fn build_prompt(text: &str, query: &str, context: &str, n: usize) -> String {
    let base = format!("Original text:\n\"\"\"{text}\"\"\"\n\nUser request: \"{query}\"");
    let instruction = format!(
        "Generate exactly {n} distinct, modified version(s) of the original text based on the \
         user request{and_context}. Provide the response as a JSON object with a single key \
         \"suggestions\" whose value is a JSON array of strings. Do not add any additional \
         considerations, just modify the text. Wrap the JSON object in triple backticks.",
        and_context = if context.is_empty() { "" } else { " and context" },
    );
    if context.is_empty() {
        format!("{base}\n\n{instruction}")
    } else {
        format!(
            "{base}\n\nAdditional context (do not modify this part, only use for reference):\n\
             \"\"\"{context}\"\"\"\n\n{instruction}"
        )
    }
}

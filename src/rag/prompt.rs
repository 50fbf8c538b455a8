//! Prompt assembly for grounded answers.

use super::types::Chunk;

/// Join chunk texts with newlines, preserving retrieval order.
pub fn format_context<'a>(chunks: impl IntoIterator<Item = &'a Chunk>) -> String {
    chunks
        .into_iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the instruction prompt sent to the model.
///
/// The model is told to answer from the supplied context only and to ask for a relevant
/// question when the context does not cover it.
pub fn assemble_prompt<'a>(question: &str, chunks: impl IntoIterator<Item = &'a Chunk>) -> String {
    let context = format_context(chunks);
    format!(
        "Answer this question using the provided context only.\n\
         \n\
         Question:\n\
         {question}\n\
         \n\
         File content:\n\
         {context}\n\
         If the question is not relevant to the file content then\n\
         tell the user to please ask relevant questions to your document.\n"
    )
}

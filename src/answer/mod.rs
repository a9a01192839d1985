//! Retrieval-augmented answering.
//!
//! Every prompt carries the repository README verbatim as primary context,
//! followed by the chunks retrieved for the question.

use crate::error::{RagError, RagResult};
use crate::session::Session;

/// Returned when a question arrives before any repository was analyzed
pub const NOT_INITIALIZED_MESSAGE: &str =
    "The pipeline has not been initialized. Please analyze a repository first.";

const PREAMBLE: &str = "\
You are an expert developer and AI assistant. Your task is to answer questions about a source-code repository.

Use the following context to answer the user's question. The README.md content is the most important for high-level summaries.
The \"Additional Retrieved Context\" is from other files and provides specific details.";

/// The four fields of an answer prompt, rendered in a fixed order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt<'a> {
    pub primary_context: &'a str,
    pub retrieved_context: &'a str,
    pub question: &'a str,
}

impl Prompt<'_> {
    pub fn render(&self) -> String {
        format!(
            "{preamble}\n\n\
             ---\n\
             **Primary Context (from README.md):**\n\
             {primary}\n\
             ---\n\
             **Additional Retrieved Context (from other relevant files):**\n\
             {retrieved}\n\
             ---\n\n\
             **User's Question:** {question}\n\n\
             **Answer:**\n",
            preamble = PREAMBLE,
            primary = self.primary_context,
            retrieved = self.retrieved_context,
            question = self.question,
        )
    }
}

/// Answer `question` against `session`.
///
/// Without a session the sentinel [`NOT_INITIALIZED_MESSAGE`] is returned.
/// Retrieval and model failures are reported as
/// [`RagError::AnswerGeneration`] and are not retried.
pub async fn answer(session: Option<&Session>, question: &str, top_k: usize) -> RagResult<String> {
    let session = match session {
        Some(session) => session,
        None => return Ok(NOT_INITIALIZED_MESSAGE.to_string()),
    };

    tracing::info!("Retrieving documents for question: {}", question);
    if session.index.is_empty() {
        tracing::debug!("Index is empty, answering from the README alone");
    }
    let retrieved = session
        .index
        .query(question, top_k)
        .await
        .map_err(RagError::AnswerGeneration)?;
    for chunk in &retrieved {
        tracing::debug!(
            "Retrieved {}#{} (score {:.3})",
            chunk.source.display(),
            chunk.index,
            chunk.score
        );
    }

    let retrieved_context = retrieved
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let prompt = Prompt {
        primary_context: &session.readme,
        retrieved_context: &retrieved_context,
        question,
    }
    .render();

    tracing::info!("Generating answer with {}", session.chat.model());
    session
        .chat
        .complete(&prompt)
        .await
        .map_err(RagError::AnswerGeneration)
}

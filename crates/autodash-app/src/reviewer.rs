// AI code review: input validation and post-processing of the model reply.

use autodash_llm::prompt;
use autodash_llm::{ChatMessage, LlmError};
use tracing::{error, info};

/// Appended when the model stopped because it hit `max_tokens`.
pub const TRUNCATION_NOTE: &str = "[Review truncated due to token limit]";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReviewError {
    #[error("no code provided for review")]
    EmptyCode,

    #[error("failed to get review from OpenAI: {0}")]
    Llm(#[from] LlmError),
}

/// Validate `code` and build the user prompt for it.
pub fn prepare_review(code: &str) -> Result<String, ReviewError> {
    if code.trim().is_empty() {
        error!("Code to review is empty");
        return Err(ReviewError::EmptyCode);
    }
    info!("Preparing {} bytes of code for review", code.len());
    Ok(prompt::review_prompt(code))
}

/// Messages for a review request built from a prepared prompt.
pub fn review_messages(prepared: String) -> Vec<ChatMessage> {
    vec![ChatMessage::user(prepared)]
}

/// Final review text: trimmed, with a note when the reply was cut short.
pub fn finish_review(full_text: &str, finish_reason: Option<&str>) -> String {
    let review = full_text.trim();
    if finish_reason == Some("length") {
        format!("{review}\n\n{TRUNCATION_NOTE}")
    } else {
        review.to_string()
    }
}

// Prompt templates for code review and source enhancement.

use crate::client::ChatMessage;

/// Instruction used by `self-update` when none is given.
pub const DEFAULT_ENHANCE_INSTRUCTION: &str =
    "Enhance this dashboard and implement smart self-learning features.";

/// User prompt asking for a review of `code`.
pub fn review_prompt(code: &str) -> String {
    format!("Please review this code and provide feedback:\n```\n{code}\n```")
}

/// System prompt for rewriting a source file.
pub fn enhance_system_prompt() -> String {
    "You are AutoIntel AI, a careful senior software engineer. \
     Improve the code you are given with enhancements, fixes and performance gains \
     while keeping it working. \
     Reply with the complete updated file only, no commentary."
        .to_string()
}

/// The instruction followed by a blank line and the current source.
pub fn enhance_user_prompt(instruction: &str, code: &str) -> String {
    format!("{instruction}\n\n{code}")
}

pub fn enhance_messages(instruction: &str, code: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(enhance_system_prompt()),
        ChatMessage::user(enhance_user_prompt(instruction, code)),
    ]
}

/// Remove one markdown code fence wrapping the whole reply, if present.
///
/// A reply that is not entirely fenced comes back trimmed but otherwise
/// unchanged.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed.to_string();
    };
    // Drop the info string (`python`, `rust`, ...) on the opening line.
    match body.split_once('\n') {
        Some((_info, code)) => code.trim_end_matches(['\n', '\r']).to_string(),
        None => body.trim().to_string(),
    }
}

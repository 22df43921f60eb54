// OpenAI Chat Completions client and the prompts autodash sends through it.

pub mod client;
pub mod prompt;

pub use client::{ChatMessage, LlmClient, LlmError, OpenAiClient};

//! LLM client abstraction
//!
//! Every backend (OpenAI-compatible gateway / mocks) implements LlmClient.
//! The gateway is treated as fallible free text: callers own all JSON
//! parse-failure recovery and must never assume valid JSON back.

use async_trait::async_trait;

use crate::memory::Message;

/// Text-completion client. The error is a plain string; components map it
/// into their own fallback behavior rather than propagating it upward.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;
}

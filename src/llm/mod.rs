//! LLM layer: client abstraction, OpenAI-compatible gateway, JSON extraction.

pub mod json;
pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::{FailingLlmClient, MockLlmClient, ScriptedLlmClient};
pub use openai::OpenAiGateway;
pub use traits::LlmClient;

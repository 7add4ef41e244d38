//! Campus helpdesk agent orchestration core
//!
//! Module map:
//! - **agents**: specialist pool (greeting / technical / faq / action_executor) and the critic
//! - **config**: application configuration (TOML + environment variables)
//! - **coordinator**: complexity classification and routing branch
//! - **llm**: LLM gateway abstraction and implementations (OpenAI-compatible / mocks)
//! - **manager**: AgentManager, the public entry point with session memory
//! - **memory**: conversation history, per-session state, request context
//! - **tools**: campus tool catalog and the action service client
//! - **workflow**: DAG plans and the workflow executor for complex requests

pub mod agents;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod llm;
pub mod manager;
pub mod memory;
pub mod observability;
pub mod tools;
pub mod workflow;

pub use agents::AgentResponse;
pub use error::AgentError;
pub use manager::AgentManager;

//! Specialist agents
//!
//! Every specialist answers `process(message, history, ctx) -> AgentResponse`
//! with a role-specific prompt forwarded to the gateway. A gateway failure
//! never escapes a specialist: it becomes an apologetic reply with
//! `success == false`.

pub mod action_executor;
pub mod critic;
pub mod faq;
pub mod greeting;
pub mod technical;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::memory::{history_messages, ChatTurn, Message, RequestContext};

pub use action_executor::ActionExecutorAgent;
pub use critic::{Critic, EvaluationResult};
pub use faq::{Document, DocumentSearch, FaqAgent, PolicySearchClient};
pub use greeting::GreetingAgent;
pub use technical::TechnicalAgent;

/// The universal return shape of every agent call. Agent-specific fields
/// (routing_info, sources, suggested_action, evaluation...) ride in `extra`
/// and serialize flat alongside the fixed fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentResponse {
    pub reply: String,
    pub agent: String,
    pub success: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentResponse {
    pub fn new(agent: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            agent: agent.into(),
            success: true,
            extra: Map::new(),
        }
    }

    pub fn failure(agent: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::new(agent, reply)
        }
    }

    /// The standard user-facing apology for an internal failure.
    pub fn apology(agent: impl Into<String>) -> Self {
        Self::failure(
            agent,
            "Xin lỗi, tôi gặp sự cố khi xử lý yêu cầu của bạn. Vui lòng thử lại sau.",
        )
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// One narrow-capability responder.
#[async_trait]
pub trait Specialist: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(
        &self,
        message: &str,
        history: &[ChatTurn],
        ctx: &RequestContext,
    ) -> AgentResponse;
}

/// Role preamble + windowed history + the new message.
pub fn build_messages(
    system_prompt: &str,
    history: &[ChatTurn],
    history_window: usize,
    message: &str,
) -> Vec<Message> {
    let mut messages = vec![Message::system(system_prompt)];
    messages.extend(history_messages(history, history_window));
    messages.push(Message::user(message));
    messages
}

/// Lookup-by-name table over the fixed specialist set, built once at startup.
#[derive(Clone, Default)]
pub struct SpecialistRegistry {
    agents: HashMap<String, Arc<dyn Specialist>>,
}

impl SpecialistRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent: Arc<dyn Specialist>) {
        self.agents.insert(agent.name().to_string(), agent);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Specialist>> {
        self.agents.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }
}

//! Greeting specialist: stateless, one gateway call.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{build_messages, AgentResponse, Specialist};
use crate::llm::LlmClient;
use crate::memory::{ChatTurn, RequestContext};

const SYSTEM_PROMPT: &str = "You are the friendly greeting assistant of the campus helpdesk. \
Respond warmly and briefly, in the user's language, and offer to help with \
helpdesk topics (accounts, library, rooms, dormitory).";

pub struct GreetingAgent {
    llm: Arc<dyn LlmClient>,
    history_window: usize,
}

impl GreetingAgent {
    pub fn new(llm: Arc<dyn LlmClient>, history_window: usize) -> Self {
        Self {
            llm,
            history_window,
        }
    }
}

#[async_trait]
impl Specialist for GreetingAgent {
    fn name(&self) -> &'static str {
        "greeting"
    }

    async fn process(
        &self,
        message: &str,
        history: &[ChatTurn],
        _ctx: &RequestContext,
    ) -> AgentResponse {
        let messages = build_messages(SYSTEM_PROMPT, history, self.history_window, message);
        match self.llm.complete(&messages).await {
            Ok(reply) => AgentResponse::new(self.name(), reply),
            Err(e) => {
                tracing::warn!(error = %e, "greeting gateway call failed");
                AgentResponse::apology(self.name())
            }
        }
    }
}

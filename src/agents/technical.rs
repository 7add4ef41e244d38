//! Technical-support specialist
//!
//! One gateway call for the reply, then a deterministic keyword scan on the
//! original message to optionally attach a suggested_action hint. The scan
//! is a pure function of the user text and never depends on the generated
//! reply.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::agents::{build_messages, AgentResponse, Specialist};
use crate::llm::LlmClient;
use crate::memory::{ChatTurn, RequestContext};

const SYSTEM_PROMPT: &str = "You are the technical-support specialist of the campus helpdesk. \
Help students with IT issues: accounts, passwords, campus wifi, email, and \
learning platforms. Give concrete steps and answer in the user's language.";

/// A concrete action the user likely wants, detected from the message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestedAction {
    pub action_type: &'static str,
    pub description: &'static str,
}

/// Keyword scan for actionable requests. Pure function of the message.
fn scan_suggested_action(message: &str) -> Option<SuggestedAction> {
    let lower = message.to_lowercase();
    if lower.contains("đặt lại mật khẩu")
        || lower.contains("quên mật khẩu")
        || lower.contains("reset password")
        || lower.contains("forgot password")
    {
        return Some(SuggestedAction {
            action_type: "password_reset",
            description: "Yêu cầu đặt lại mật khẩu",
        });
    }
    None
}

pub struct TechnicalAgent {
    llm: Arc<dyn LlmClient>,
    history_window: usize,
}

impl TechnicalAgent {
    pub fn new(llm: Arc<dyn LlmClient>, history_window: usize) -> Self {
        Self {
            llm,
            history_window,
        }
    }
}

#[async_trait]
impl Specialist for TechnicalAgent {
    fn name(&self) -> &'static str {
        "technical"
    }

    async fn process(
        &self,
        message: &str,
        history: &[ChatTurn],
        _ctx: &RequestContext,
    ) -> AgentResponse {
        let messages = build_messages(SYSTEM_PROMPT, history, self.history_window, message);
        let mut response = match self.llm.complete(&messages).await {
            Ok(reply) => AgentResponse::new(self.name(), reply),
            Err(e) => {
                tracing::warn!(error = %e, "technical gateway call failed");
                AgentResponse::apology(self.name())
            }
        };

        if let Some(action) = scan_suggested_action(message) {
            response = response.with(
                "suggested_action",
                json!({
                    "type": action.action_type,
                    "description": action.description,
                }),
            );
        }
        response
    }
}

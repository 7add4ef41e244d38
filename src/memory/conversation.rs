//! Conversation history
//!
//! ChatTurn is one recorded user/bot exchange, immutable once appended.
//! Turns are rendered into LLM messages through a bounded most-recent-N
//! window so long sessions never blow up the prompt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message role, matching the LLM API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A single prompt message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// One completed exchange in a session. Append-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatTurn {
    pub user_text: String,
    pub bot_text: String,
    pub timestamp: DateTime<Utc>,
    pub agent_name: String,
    pub student_id: Option<String>,
}

impl ChatTurn {
    pub fn new(
        user_text: impl Into<String>,
        bot_text: impl Into<String>,
        agent_name: impl Into<String>,
        student_id: Option<String>,
    ) -> Self {
        Self {
            user_text: user_text.into(),
            bot_text: bot_text.into(),
            timestamp: Utc::now(),
            agent_name: agent_name.into(),
            student_id,
        }
    }
}

/// Render the most recent `max_turns` turns as user/assistant message pairs,
/// oldest first, for inclusion in a prompt.
pub fn history_messages(history: &[ChatTurn], max_turns: usize) -> Vec<Message> {
    let start = history.len().saturating_sub(max_turns);
    let mut messages = Vec::with_capacity((history.len() - start) * 2);
    for turn in &history[start..] {
        messages.push(Message::user(turn.user_text.clone()));
        messages.push(Message::assistant(turn.bot_text.clone()));
    }
    messages
}

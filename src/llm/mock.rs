//! Mock LLM clients for tests
//!
//! MockLlmClient echoes the last user message. ScriptedLlmClient replays a
//! queue of canned replies and counts calls, which is how tests assert the
//! greeting fast path never touches the gateway. FailingLlmClient always
//! errors to exercise the degraded paths.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::{Message, Role};

/// Echoes the last user message.
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(format!("Echo: {last_user}"))
    }
}

/// Replays canned replies in order; repeats the last one when exhausted.
#[derive(Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl ScriptedLlmClient {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(String::from).collect()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of completions served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut replies = self.replies.lock().expect("scripted replies lock");
        match replies.pop_front() {
            Some(reply) => {
                *self.last.lock().expect("scripted last lock") = Some(reply.clone());
                Ok(reply)
            }
            None => self
                .last
                .lock()
                .expect("scripted last lock")
                .clone()
                .ok_or_else(|| "script exhausted".to_string()),
        }
    }
}

/// Always fails, simulating an unreachable gateway.
#[derive(Debug, Default)]
pub struct FailingLlmClient;

#[async_trait]
impl LlmClient for FailingLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        Err("gateway unavailable".to_string())
    }
}

//! Per-session scratch state
//!
//! SessionContext is created lazily on the first message for a session id,
//! mutated by the AgentManager after every turn, and evicted only by
//! age-based cleanup. Everything here must survive reconstruction from an
//! empty map: no field is load-bearing beyond the current turn.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

/// Conversation shape derived from the turn count, used to tune prompts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationFlow {
    New,
    Initial,
    Short,
    Extended,
}

impl ConversationFlow {
    /// New (no history), initial (one turn), short (up to three), extended.
    pub fn from_turn_count(turns: usize) -> Self {
        match turns {
            0 => Self::New,
            1 => Self::Initial,
            2..=3 => Self::Short,
            _ => Self::Extended,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new_conversation",
            Self::Initial => "initial_request",
            Self::Short => "short_conversation",
            Self::Extended => "extended_conversation",
        }
    }
}

/// Mutable per-conversation state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    pub student_id: Option<String>,
    pub session_memory: Map<String, Value>,
    pub last_agent: Option<String>,
    pub turn_count: usize,
    pub last_activity: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, student_id: Option<String>) -> Self {
        Self {
            session_id: session_id.into(),
            student_id,
            session_memory: Map::new(),
            last_agent: None,
            turn_count: 0,
            last_activity: Utc::now(),
        }
    }

    pub fn flow(&self) -> ConversationFlow {
        ConversationFlow::from_turn_count(self.turn_count)
    }
}

/// Read-only view handed to the coordinator and specialists for one request:
/// a snapshot of session state plus any workflow context for the current step.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub session_id: Option<String>,
    pub student_id: Option<String>,
    pub session_memory: Map<String, Value>,
    pub workflow_context: Map<String, Value>,
    pub last_agent: Option<String>,
    pub flow: Option<ConversationFlow>,
}

impl RequestContext {
    /// Look up a value first in the workflow context, then in session memory.
    /// Workflow outputs shadow session state so later plan steps see what
    /// earlier steps produced.
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        self.workflow_context
            .get(key)
            .or_else(|| self.session_memory.get(key))
    }

    pub fn with_workflow_context(mut self, ctx: Map<String, Value>) -> Self {
        self.workflow_context = ctx;
        self
    }
}

/// In-memory session table. Sessions for different ids are independent;
/// two concurrent requests for the same id are not ordered by this store.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionContext>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the session, creating it on first sight.
    pub async fn get_or_create(
        &self,
        session_id: &str,
        student_id: Option<&str>,
    ) -> SessionContext {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                SessionContext::new(session_id, student_id.map(String::from))
            })
            .clone()
    }

    pub async fn update_memory(&self, session_id: &str, key: &str, value: Value) {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionContext::new(session_id, None));
        session.session_memory.insert(key.to_string(), value);
        session.last_activity = Utc::now();
    }

    pub async fn memory(&self, session_id: &str) -> Map<String, Value> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|s| s.session_memory.clone())
            .unwrap_or_default()
    }

    /// Record a processed turn: advance the turn count and remember which
    /// agent answered.
    pub async fn record_turn(&self, session_id: &str, agent: &str) {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionContext::new(session_id, None));
        session.turn_count += 1;
        session.last_agent = Some(agent.to_string());
        session.last_activity = Utc::now();
    }

    /// Evict sessions idle for longer than `max_age_hours`. Returns the
    /// number removed.
    pub async fn cleanup(&self, max_age_hours: i64) -> usize {
        let cutoff = Utc::now() - Duration::hours(max_age_hours);
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_activity >= cutoff);
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_round_trip() {
        let store = SessionStore::new();
        let value = json!({"nested": [1, 2, 3], "flag": true});
        store.update_memory("s1", "k", value.clone()).await;
        let memory = store.memory("s1").await;
        assert_eq!(memory.get("k"), Some(&value));
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let store = SessionStore::new();
        store.update_memory("a", "k", json!(1)).await;
        store.update_memory("b", "k", json!(2)).await;
        assert_eq!(store.memory("a").await.get("k"), Some(&json!(1)));
        assert_eq!(store.memory("b").await.get("k"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn cleanup_evicts_stale_sessions() {
        let store = SessionStore::new();
        store.update_memory("old", "k", json!(1)).await;
        {
            let mut sessions = store.sessions.write().await;
            sessions.get_mut("old").unwrap().last_activity =
                Utc::now() - Duration::hours(48);
        }
        store.update_memory("fresh", "k", json!(2)).await;
        assert_eq!(store.cleanup(24).await, 1);
        assert_eq!(store.len().await, 1);
    }

    #[test]
    fn flow_classification() {
        assert_eq!(ConversationFlow::from_turn_count(0), ConversationFlow::New);
        assert_eq!(ConversationFlow::from_turn_count(1), ConversationFlow::Initial);
        assert_eq!(ConversationFlow::from_turn_count(3), ConversationFlow::Short);
        assert_eq!(ConversationFlow::from_turn_count(7), ConversationFlow::Extended);
    }

    #[test]
    fn workflow_context_shadows_session_memory() {
        let mut ctx = RequestContext::default();
        ctx.session_memory.insert("student_id".into(), json!("1"));
        ctx.workflow_context.insert("student_id".into(), json!("2"));
        assert_eq!(ctx.lookup("student_id"), Some(&json!("2")));
    }
}

//! Agent manager
//!
//! Public entry point of the orchestration core. Owns the session store,
//! the specialist registry, the coordinator, the workflow executor, and the
//! optional critic pass. One call to `process_message` runs the whole
//! pipeline and always returns a well-formed response; failures downstream
//! degrade into the standard apologetic reply instead of surfacing.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::agents::{
    ActionExecutorAgent, AgentResponse, Critic, DocumentSearch, FaqAgent, GreetingAgent,
    SpecialistRegistry, TechnicalAgent,
};
use crate::config::AppConfig;
use crate::coordinator::Coordinator;
use crate::error::AgentError;
use crate::llm::LlmClient;
use crate::memory::{ChatTurn, RequestContext, SessionStore};
use crate::tools::{ActionInvoker, ToolCatalog};
use crate::workflow::WorkflowExecutor;

/// Persistence hook for processed turns. The manager fires it after every
/// response; a failing sink is logged and never fails the request.
#[async_trait]
pub trait TurnSink: Send + Sync {
    async fn persist(&self, session_id: &str, turn: &ChatTurn) -> Result<(), AgentError>;
}

/// Default sink: keep turns in memory only.
pub struct NoopTurnSink;

#[async_trait]
impl TurnSink for NoopTurnSink {
    async fn persist(&self, _session_id: &str, _turn: &ChatTurn) -> Result<(), AgentError> {
        Ok(())
    }
}

pub struct AgentManager {
    coordinator: Coordinator,
    registry: Arc<SpecialistRegistry>,
    executor: Arc<WorkflowExecutor>,
    critic: Option<Critic>,
    store: SessionStore,
    sink: Arc<dyn TurnSink>,
}

impl AgentManager {
    /// Wires the full agent pool from config and the injected collaborators.
    /// The registry is fixed at construction; nothing registers later.
    pub fn new(
        config: &AppConfig,
        llm: Arc<dyn LlmClient>,
        search: Arc<dyn DocumentSearch>,
        invoker: Arc<dyn ActionInvoker>,
    ) -> Self {
        let window = config.session.history_window;

        let action_executor = Arc::new(ActionExecutorAgent::new(
            llm.clone(),
            ToolCatalog::standard(),
            invoker,
        ));

        let mut registry = SpecialistRegistry::new();
        registry.register(Arc::new(GreetingAgent::new(llm.clone(), window)));
        registry.register(Arc::new(TechnicalAgent::new(llm.clone(), window)));
        registry.register(Arc::new(FaqAgent::new(
            llm.clone(),
            search,
            config.retrieval.score_threshold,
            config.retrieval.max_citations,
            window,
        )));
        registry.register(action_executor.clone());
        let registry = Arc::new(registry);

        let executor = Arc::new(WorkflowExecutor::new(
            llm.clone(),
            registry.clone(),
            action_executor,
        ));

        let critic = config
            .critic
            .enabled
            .then(|| Critic::new(llm.clone(), config.critic.score_threshold));

        Self {
            coordinator: Coordinator::new(llm, executor.clone()),
            registry,
            executor,
            critic,
            store: SessionStore::new(),
            sink: Arc::new(NoopTurnSink),
        }
    }

    pub fn with_turn_sink(mut self, sink: Arc<dyn TurnSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Processes one user message end to end: classify, route or plan,
    /// optionally critique, then record the turn.
    pub async fn process_message(
        &self,
        message: &str,
        history: &[ChatTurn],
        session_id: Option<&str>,
        student_id: Option<&str>,
    ) -> AgentResponse {
        let session_id = session_id
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let session = self.store.get_or_create(&session_id, student_id).await;
        let ctx = RequestContext {
            session_id: Some(session_id.clone()),
            student_id: student_id
                .map(String::from)
                .or_else(|| session.student_id.clone()),
            session_memory: session.session_memory.clone(),
            workflow_context: Default::default(),
            last_agent: session.last_agent.clone(),
            flow: Some(session.flow()),
        };

        let decision = self.coordinator.classify(message).await;
        tracing::info!(
            session_id = %session_id,
            is_simple = decision.is_simple,
            level = ?decision.complexity_level,
            "request classified"
        );

        let mut response = if decision.is_simple {
            let routing = Coordinator::route_simple(&decision);
            let agent = match self.registry.get(&routing.target_agent) {
                Some(agent) => agent,
                None => {
                    tracing::warn!(target = %routing.target_agent, "missing specialist, using faq");
                    match self.registry.get("faq") {
                        Some(agent) => agent,
                        None => return AgentResponse::apology("enhanced_manager"),
                    }
                }
            };
            agent
                .process(message, history, &ctx)
                .await
                .with("routing_info", json!(routing))
                .with("orchestrated_by", json!("lead_agent"))
        } else {
            self.coordinator
                .handle_complex(message, history, &ctx, &decision)
                .await
        };

        if let Some(critic) = &self.critic {
            let review = critic.review(message, &response, &ctx).await;
            response = response.with("critic_summary", json!(review.reply));
            for (key, value) in review.extra {
                response.extra.insert(key, value);
            }
        }

        self.store.record_turn(&session_id, &response.agent).await;
        let turn = ChatTurn::new(
            message,
            response.reply.clone(),
            response.agent.clone(),
            ctx.student_id.clone(),
        );
        if let Err(e) = self.sink.persist(&session_id, &turn).await {
            tracing::warn!(session_id = %session_id, error = %e, "turn persistence failed");
        }

        response
    }

    pub async fn update_session_memory(&self, session_id: &str, key: &str, value: Value) {
        self.store.update_memory(session_id, key, value).await;
    }

    pub async fn get_session_memory(&self, session_id: &str) -> serde_json::Map<String, Value> {
        self.store.memory(session_id).await
    }

    pub fn get_workflow_status(&self, workflow_id: &str) -> Option<Value> {
        self.executor.status(workflow_id)
    }

    /// Specialist names plus the orchestrator itself.
    pub fn available_agents(&self) -> Vec<String> {
        let mut agents = vec!["lead_agent".to_string()];
        agents.extend(self.registry.names());
        agents
    }

    /// Evicts idle sessions and finished workflows older than the cutoff.
    pub async fn cleanup_old_sessions(&self, max_age_hours: i64) -> usize {
        let sessions = self.store.cleanup(max_age_hours).await;
        let workflows = self.executor.cleanup(max_age_hours);
        sessions + workflows
    }
}

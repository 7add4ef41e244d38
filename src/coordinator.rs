//! Request coordinator
//!
//! Classifies every incoming message by complexity before anything else
//! runs. Short greetings are recognized lexically and never reach the
//! gateway. Everything else goes through a gateway classification with a
//! rule-based fallback, and the single `is_simple` flag decides the branch:
//! direct specialist routing, or workflow planning.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::agents::AgentResponse;
use crate::llm::{json::extract_as, LlmClient};
use crate::memory::{ChatTurn, Message, RequestContext};
use crate::workflow::WorkflowExecutor;

/// Short greeting forms, matched as substrings of the lowercased message.
const GREETING_LEXICON: [&str; 11] = [
    "xin chào",
    "chào",
    "hello",
    "hi",
    "alo",
    "good morning",
    "good afternoon",
    "good evening",
    "hey",
    "hế lô",
    "chào bạn",
];

const SIMPLE_PATTERNS: [&str; 9] = [
    "xin chào", "chào", "hello", "hi", "alo", "cảm ơn", "thanks", "bye", "tạm biệt",
];

const TOOL_PATTERNS: [&str; 12] = [
    "đặt lại mật khẩu",
    "reset password",
    "quên mật khẩu",
    "gia hạn thẻ",
    "renew",
    "library card",
    "đặt phòng",
    "book room",
    "booking",
    "tạo ticket",
    "create ticket",
    "báo cáo sự cố",
];

/// Conjunctions marking a multi-part request.
const COMPLEX_PATTERNS: [&str; 6] = ["và", "cùng với", "sau đó", "tiếp theo", "vừa", "đồng thời"];

/// Agent kinds a simple request may route to. Closed set: anything else
/// the classifier suggests degrades to faq. Deliberately includes
/// action_executor so a single-tool request classified as simple dispatches
/// directly instead of degrading to faq.
const VALID_ROUTING_TARGETS: [&str; 4] = ["greeting", "technical", "faq", "action_executor"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Simple,
    Moderate,
    Complex,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComplexityDecision {
    pub is_simple: bool,
    pub complexity_level: ComplexityLevel,
    #[serde(default)]
    pub required_agents: Vec<String>,
    #[serde(default)]
    pub needs_planning: bool,
    #[serde(default = "default_steps")]
    pub estimated_steps: u32,
    #[serde(default)]
    pub reasoning: String,
}

fn default_steps() -> u32 {
    1
}

impl ComplexityDecision {
    fn simple(agent: &str, reasoning: &str) -> Self {
        Self {
            is_simple: true,
            complexity_level: ComplexityLevel::Simple,
            required_agents: vec![agent.to_string()],
            needs_planning: false,
            estimated_steps: 1,
            reasoning: reasoning.to_string(),
        }
    }
}

/// Routing metadata attached alongside a simple dispatch.
#[derive(Clone, Debug, Serialize)]
pub struct RoutingInfo {
    pub target_agent: String,
    pub reason: String,
    pub confidence: f64,
}

fn is_short_greeting(message: &str) -> bool {
    let lower = message.to_lowercase();
    let lower = lower.trim();
    lower.split_whitespace().count() <= 3
        && GREETING_LEXICON.iter().any(|kw| lower.contains(kw))
}

/// Rule-based classification for when the gateway output is unusable.
fn rule_based_decision(message: &str) -> ComplexityDecision {
    let lower = message.to_lowercase();

    if SIMPLE_PATTERNS.iter().any(|p| lower.contains(p)) {
        return ComplexityDecision::simple("greeting", "Rule-based: greeting pattern detected");
    }

    let tool_count = TOOL_PATTERNS.iter().filter(|p| lower.contains(*p)).count();
    if tool_count > 0 {
        let conjoined = COMPLEX_PATTERNS.iter().any(|p| lower.contains(p));
        if tool_count > 1 || conjoined {
            return ComplexityDecision {
                is_simple: false,
                complexity_level: ComplexityLevel::Complex,
                required_agents: vec!["action_executor".to_string(), "faq".to_string()],
                needs_planning: true,
                estimated_steps: tool_count as u32 + 1,
                reasoning: "Rule-based: multiple tools or complex conjunction detected"
                    .to_string(),
            };
        }
        return ComplexityDecision {
            is_simple: false,
            complexity_level: ComplexityLevel::Moderate,
            required_agents: vec!["action_executor".to_string()],
            needs_planning: true,
            estimated_steps: 2,
            reasoning: "Rule-based: single tool execution needed".to_string(),
        };
    }

    ComplexityDecision::simple("faq", "Rule-based: default FAQ routing")
}

pub struct Coordinator {
    llm: Arc<dyn LlmClient>,
    executor: Arc<WorkflowExecutor>,
}

impl Coordinator {
    pub fn new(llm: Arc<dyn LlmClient>, executor: Arc<WorkflowExecutor>) -> Self {
        Self { llm, executor }
    }

    /// Complexity classification. The greeting fast path is purely lexical;
    /// the gateway is only consulted past it.
    pub async fn classify(&self, message: &str) -> ComplexityDecision {
        if is_short_greeting(message) {
            return ComplexityDecision::simple("greeting", "Simple greeting message detected");
        }

        let prompt = format!(
            "Phân tích yêu cầu sau và xác định độ phức tạp. Trả về CHÍNH XÁC \
             format JSON sau:\n\nYÊU CẦU: {message}\n\n\
             {{\"is_simple\": true, \"complexity_level\": \"simple\", \
             \"required_agents\": [\"faq\"], \"needs_planning\": false, \
             \"estimated_steps\": 1, \"reasoning\": \"Lý do phân tích\"}}\n\n\
             Tiêu chí phân loại:\n\
             - SIMPLE: Chào hỏi, câu hỏi FAQ đơn giản -> is_simple: true\n\
             - MODERATE: Cần tool call hoặc 2-3 bước -> is_simple: false\n\
             - COMPLEX: Nhiều bước phức tạp -> is_simple: false\n\n\
             CHỈ trả về JSON, không thêm text nào khác!"
        );
        match self.llm.complete(&[Message::user(prompt)]).await {
            Ok(reply) => extract_as::<ComplexityDecision>(&reply).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "complexity analysis unparseable, using rules");
                rule_based_decision(message)
            }),
            Err(e) => {
                tracing::warn!(error = %e, "complexity gateway call failed, using rules");
                rule_based_decision(message)
            }
        }
    }

    /// Validated routing target for a simple request.
    pub fn route_simple(decision: &ComplexityDecision) -> RoutingInfo {
        let suggested = decision
            .required_agents
            .first()
            .map(String::as_str)
            .unwrap_or("faq");
        let target = if VALID_ROUTING_TARGETS.contains(&suggested) {
            suggested
        } else {
            "faq"
        };
        RoutingInfo {
            target_agent: target.to_string(),
            reason: if decision.reasoning.is_empty() {
                "Rule-based routing".to_string()
            } else {
                decision.reasoning.clone()
            },
            confidence: 0.9,
        }
    }

    /// Complex branch: plan and execute a workflow, with the classification
    /// attached for the caller.
    pub async fn handle_complex(
        &self,
        message: &str,
        history: &[ChatTurn],
        ctx: &RequestContext,
        decision: &ComplexityDecision,
    ) -> AgentResponse {
        self.executor
            .run(message, history, ctx)
            .await
            .with("complexity_analysis", json!(decision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{ActionExecutorAgent, SpecialistRegistry};
    use crate::llm::ScriptedLlmClient;
    use crate::tools::{ActionServiceClient, ToolCatalog};

    fn coordinator(llm: Arc<ScriptedLlmClient>) -> Coordinator {
        let action = Arc::new(ActionExecutorAgent::new(
            llm.clone(),
            ToolCatalog::standard(),
            Arc::new(ActionServiceClient::new("http://localhost:0", 1)),
        ));
        let executor = Arc::new(WorkflowExecutor::new(
            llm.clone(),
            Arc::new(SpecialistRegistry::new()),
            action,
        ));
        Coordinator::new(llm, executor)
    }

    #[test]
    fn short_greetings_match_lexicon() {
        assert!(is_short_greeting("Xin chào"));
        assert!(is_short_greeting("hế lô bạn"));
        assert!(is_short_greeting("hi"));
        assert!(!is_short_greeting(
            "chào bạn, tôi muốn hỏi về chính sách học phí của trường"
        ));
        assert!(!is_short_greeting("tôi quên mật khẩu"));
    }

    #[tokio::test]
    async fn greeting_fast_path_skips_gateway() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![]));
        let coordinator = coordinator(llm.clone());
        let decision = coordinator.classify("xin chào").await;
        assert!(decision.is_simple);
        assert_eq!(decision.required_agents, vec!["greeting"]);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn gateway_classification_is_parsed() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            r#"{"is_simple": false, "complexity_level": "moderate",
                "required_agents": ["action_executor"], "needs_planning": true,
                "estimated_steps": 2, "reasoning": "cần tool"}"#,
        ]));
        let decision = coordinator(llm).classify("đặt lại mật khẩu giúp tôi").await;
        assert!(!decision.is_simple);
        assert_eq!(decision.complexity_level, ComplexityLevel::Moderate);
    }

    #[tokio::test]
    async fn unparseable_classification_uses_rules() {
        let llm = Arc::new(ScriptedLlmClient::new(vec!["it seems moderately complex"]));
        let decision = coordinator(llm).classify("tôi quên mật khẩu").await;
        assert!(!decision.is_simple);
        assert_eq!(decision.complexity_level, ComplexityLevel::Moderate);
        assert_eq!(decision.required_agents, vec!["action_executor"]);
    }

    #[test]
    fn conjunction_of_tools_is_complex() {
        let decision =
            rule_based_decision("đặt lại mật khẩu và gia hạn thẻ thư viện giúp tôi");
        assert!(!decision.is_simple);
        assert_eq!(decision.complexity_level, ComplexityLevel::Complex);
        assert!(decision.estimated_steps >= 3);
    }

    #[test]
    fn unknown_text_defaults_to_faq() {
        let decision = rule_based_decision("học phí kỳ này bao nhiêu?");
        assert!(decision.is_simple);
        assert_eq!(decision.required_agents, vec!["faq"]);
    }

    #[test]
    fn routing_degrades_unknown_targets_to_faq() {
        let mut decision = ComplexityDecision::simple("oracle", "gateway suggestion");
        let routing = Coordinator::route_simple(&decision);
        assert_eq!(routing.target_agent, "faq");

        decision.required_agents = vec!["technical".to_string()];
        let routing = Coordinator::route_simple(&decision);
        assert_eq!(routing.target_agent, "technical");
    }

    #[test]
    fn action_executor_is_a_direct_routing_target() {
        let decision = ComplexityDecision::simple("action_executor", "single tool request");
        let routing = Coordinator::route_simple(&decision);
        assert_eq!(routing.target_agent, "action_executor");
    }
}

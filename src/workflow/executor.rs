//! Workflow executor
//!
//! Turns a complex request into a plan via the gateway, drains it one ready
//! step per iteration, threads step outputs through the shared plan context,
//! and synthesizes a single user-facing summary at the end. Finished plans
//! stay queryable until a cleanup pass reaps them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::agents::{ActionExecutorAgent, AgentResponse, SpecialistRegistry};
use crate::error::AgentError;
use crate::llm::{json::extract_as, LlmClient};
use crate::memory::{ChatTurn, Message, RequestContext};
use crate::workflow::plan::{StepResult, TaskStep, WorkflowPlan};

#[derive(Debug, Deserialize)]
struct PlanSpec {
    #[serde(default)]
    steps: Vec<TaskStep>,
}

pub struct WorkflowExecutor {
    llm: Arc<dyn LlmClient>,
    registry: Arc<SpecialistRegistry>,
    action_executor: Arc<ActionExecutorAgent>,
    plans: Mutex<HashMap<String, WorkflowPlan>>,
}

impl WorkflowExecutor {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: Arc<SpecialistRegistry>,
        action_executor: Arc<ActionExecutorAgent>,
    ) -> Self {
        Self {
            llm,
            registry,
            action_executor,
            plans: Mutex::new(HashMap::new()),
        }
    }

    /// Plans and runs a complex request end to end.
    pub async fn run(
        &self,
        user_request: &str,
        history: &[ChatTurn],
        ctx: &RequestContext,
    ) -> AgentResponse {
        let task_id = Uuid::new_v4().to_string();
        let mut plan = self.create_plan(&task_id, user_request, ctx).await;

        let (summary, details) = self.execute(&mut plan, history, ctx).await;
        let steps_total = plan.steps.len();
        let completed = plan.is_completed();

        self.plans
            .lock()
            .expect("plans lock")
            .insert(task_id.clone(), plan);

        AgentResponse::new("lead_agent", summary)
            .with("workflow_id", json!(task_id))
            .with("workflow_type", json!("complex_planning"))
            .with("workflow_completed", json!(completed))
            .with("steps_total", json!(steps_total))
            .with("execution_details", Value::Array(details))
    }

    /// Gateway planning with a single-step FAQ fallback when the plan is
    /// unparseable, empty, or fails the feasibility check.
    async fn create_plan(
        &self,
        task_id: &str,
        user_request: &str,
        ctx: &RequestContext,
    ) -> WorkflowPlan {
        let prompt = format!(
            "Tạo kế hoạch thực hiện cho yêu cầu: {user_request}\n\n\
             Ngữ cảnh phiên: {}\n\n\
             Các agents có sẵn: greeting, technical, faq, action_executor\n\
             Các tools có sẵn: reset_password, renew_library_card, book_room, \
             create_glpi_ticket, request_dorm_fix\n\n\
             Trả về JSON danh sách các bước:\n\
             {{\"steps\": [\
             {{\"step_id\": \"step_1\", \"agent_type\": \"faq\", \
             \"description\": \"Tìm kiếm thông tin chính sách\", \
             \"dependencies\": [], \"priority\": 3, \
             \"expected_output\": \"thông tin policy\"}}, \
             {{\"step_id\": \"step_2\", \"agent_type\": \"action_executor\", \
             \"description\": \"Thực hiện reset password\", \
             \"dependencies\": [\"step_1\"], \"priority\": 2, \
             \"tool_call\": \"reset_password\"}}]}}",
            Value::Object(ctx.session_memory.clone()),
        );

        let mut plan = WorkflowPlan::new(task_id, user_request);
        let parsed = match self.llm.complete(&[Message::user(prompt)]).await {
            Ok(reply) => extract_as::<PlanSpec>(&reply).ok(),
            Err(e) => {
                tracing::warn!(task_id, error = %e, "planning gateway call failed");
                None
            }
        };

        match parsed {
            Some(spec) if !spec.steps.is_empty() => {
                for step in spec.steps {
                    plan.add_step(step);
                }
                if let Err(e) = plan.check_feasible() {
                    tracing::warn!(task_id, error = %e, "infeasible plan, falling back");
                    plan = self.fallback_plan(task_id, user_request);
                }
            }
            _ => {
                tracing::warn!(task_id, "unusable plan output, falling back");
                plan = self.fallback_plan(task_id, user_request);
            }
        }
        plan
    }

    fn fallback_plan(&self, task_id: &str, user_request: &str) -> WorkflowPlan {
        let mut plan = WorkflowPlan::new(task_id, user_request);
        plan.add_step(TaskStep::new(
            "fallback_1",
            "faq",
            user_request.to_string(),
        ));
        plan
    }

    /// One ready step per iteration, highest priority first. An incomplete
    /// plan with no ready steps terminates the run and synthesizes from the
    /// partial results.
    async fn execute(
        &self,
        plan: &mut WorkflowPlan,
        history: &[ChatTurn],
        ctx: &RequestContext,
    ) -> (String, Vec<Value>) {
        let mut details = Vec::new();

        while !plan.is_completed() {
            let Some(step) = plan.ready_steps().first().map(|s| (*s).clone()) else {
                tracing::warn!(
                    task_id = %plan.task_id,
                    "no ready steps in incomplete plan, stopping"
                );
                break;
            };

            plan.mark_in_progress(&step.step_id);
            tracing::info!(
                task_id = %plan.task_id,
                step = %step.step_id,
                agent = %step.agent_type,
                "executing step"
            );

            let step_ctx = ctx.clone().with_workflow_context(plan.context.clone());
            let result = self.execute_step(&step, history, &step_ctx).await;

            details.push(json!({
                "step_id": step.step_id,
                "description": step.description,
                "result": result,
            }));
            plan.merge_context(result.context_updates.clone());
            plan.mark_completed(&step.step_id, result);
        }

        let summary = self.synthesize(plan, &details).await;
        (summary, details)
    }

    async fn execute_step(
        &self,
        step: &TaskStep,
        history: &[ChatTurn],
        ctx: &RequestContext,
    ) -> StepResult {
        match step.agent_type.as_str() {
            "action_executor" => {
                let Some(tool) = step.tool_call.as_deref() else {
                    return StepResult {
                        success: false,
                        payload: json!({"error": "no tool specified for action_executor step"}),
                        context_updates: Map::new(),
                    };
                };
                let response = self
                    .action_executor
                    .execute_named_tool(tool, &step.description, ctx, &Map::new())
                    .await;
                let mut updates = Map::new();
                if response.success {
                    updates.insert(format!("{tool}_executed"), json!(true));
                }
                StepResult {
                    success: response.success,
                    payload: serde_json::to_value(&response).unwrap_or_default(),
                    context_updates: updates,
                }
            }
            agent_type => match self.registry.get(agent_type) {
                Some(agent) => {
                    let response = agent.process(&step.description, history, ctx).await;
                    let mut updates = Map::new();
                    updates.insert(format!("{agent_type}_consulted"), json!(true));
                    StepResult {
                        success: response.success,
                        payload: serde_json::to_value(&response).unwrap_or_default(),
                        context_updates: updates,
                    }
                }
                None => {
                    let err = AgentError::UnknownAgentType(agent_type.to_string());
                    tracing::warn!(step = %step.step_id, error = %err, "step dispatch failed");
                    StepResult {
                        success: false,
                        payload: json!({"error": err.to_string()}),
                        context_updates: Map::new(),
                    }
                }
            },
        }
    }

    async fn synthesize(&self, plan: &WorkflowPlan, details: &[Value]) -> String {
        let prompt = format!(
            "Tổng hợp kết quả từ workflow đã thực hiện.\n\n\
             YÊU CẦU GỐC: {}\n\n\
             CÁC BƯỚC ĐÃ THỰC HIỆN:\n{}\n\n\
             Hãy tạo một phản hồi tóm tắt ngắn gọn và hữu ích cho người dùng.",
            plan.user_request,
            serde_json::to_string_pretty(details).unwrap_or_default(),
        );
        match self.llm.complete(&[Message::user(prompt)]).await {
            Ok(reply) if !reply.trim().is_empty() => reply,
            _ => "Đã hoàn thành xử lý yêu cầu của bạn.".to_string(),
        }
    }

    /// Snapshot of a stored plan for status queries.
    pub fn status(&self, task_id: &str) -> Option<Value> {
        let plans = self.plans.lock().expect("plans lock");
        plans.get(task_id).map(|plan| {
            json!({
                "workflow_id": plan.task_id,
                "user_request": plan.user_request,
                "created_at": plan.created_at.to_rfc3339(),
                "is_completed": plan.is_completed(),
                "steps": plan.steps,
                "context": plan.context,
            })
        })
    }

    /// Drops completed plans older than the cutoff, returning how many were
    /// removed.
    pub fn cleanup(&self, max_age_hours: i64) -> usize {
        let cutoff = chrono::Utc::now() - chrono::Duration::hours(max_age_hours);
        let mut plans = self.plans.lock().expect("plans lock");
        let before = plans.len();
        plans.retain(|_, plan| !(plan.is_completed() && plan.created_at < cutoff));
        before - plans.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::Specialist;
    use crate::llm::ScriptedLlmClient;
    use crate::tools::{ActionInvoker, InvokeError, ToolCatalog};
    use async_trait::async_trait;

    struct StaticSpecialist {
        name: &'static str,
        reply: &'static str,
    }

    #[async_trait]
    impl Specialist for StaticSpecialist {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn process(
            &self,
            _message: &str,
            _history: &[ChatTurn],
            _ctx: &RequestContext,
        ) -> AgentResponse {
            AgentResponse::new(self.name, self.reply)
        }
    }

    struct OkInvoker;

    #[async_trait]
    impl ActionInvoker for OkInvoker {
        async fn invoke(
            &self,
            tool_name: &str,
            _args: &Map<String, Value>,
            _student_id: Option<&str>,
        ) -> Result<Value, InvokeError> {
            Ok(json!({"status": "ok", "message": format!("{tool_name} done")}))
        }
    }

    fn executor_with(replies: Vec<&str>) -> (WorkflowExecutor, Arc<ScriptedLlmClient>) {
        let llm = Arc::new(ScriptedLlmClient::new(replies));
        let mut registry = SpecialistRegistry::new();
        registry.register(Arc::new(StaticSpecialist {
            name: "faq",
            reply: "Thông tin chính sách: mật khẩu được reset qua cổng CNTT.",
        }));
        registry.register(Arc::new(StaticSpecialist {
            name: "technical",
            reply: "Hướng dẫn kỹ thuật.",
        }));
        let action = Arc::new(ActionExecutorAgent::new(
            llm.clone(),
            ToolCatalog::standard(),
            Arc::new(OkInvoker),
        ));
        (
            WorkflowExecutor::new(llm.clone(), Arc::new(registry), action),
            llm,
        )
    }

    const TWO_STEP_PLAN: &str = r#"{"steps": [
        {"step_id": "step_1", "agent_type": "faq",
         "description": "Tìm thông tin chính sách mật khẩu",
         "dependencies": [], "priority": 3},
        {"step_id": "step_2", "agent_type": "action_executor",
         "description": "Đặt lại mật khẩu cho sinh viên 20210001",
         "dependencies": ["step_1"], "priority": 2,
         "tool_call": "reset_password"}
    ]}"#;

    #[tokio::test]
    async fn runs_two_step_plan_in_dependency_order() {
        // Script: plan, tool param extraction, synthesis.
        let (executor, _) = executor_with(vec![
            TWO_STEP_PLAN,
            r#"{"student_id": "20210001"}"#,
            "Đã tra cứu chính sách và đặt lại mật khẩu cho bạn.",
        ]);
        let response = executor
            .run("chính sách mật khẩu và reset giúp tôi", &[], &RequestContext::default())
            .await;
        assert_eq!(response.agent, "lead_agent");
        assert_eq!(response.extra["workflow_completed"], true);
        assert_eq!(response.extra["steps_total"], 2);
        assert!(response.reply.contains("mật khẩu"));

        let details = response.extra["execution_details"].as_array().unwrap();
        assert_eq!(details[0]["step_id"], "step_1");
        assert_eq!(details[1]["step_id"], "step_2");
    }

    #[tokio::test]
    async fn step_outputs_flow_into_later_context() {
        let (executor, _) = executor_with(vec![
            TWO_STEP_PLAN,
            r#"{"student_id": "20210001"}"#,
            "Xong.",
        ]);
        let response = executor
            .run("reset mật khẩu", &[], &RequestContext::default())
            .await;
        let task_id = response.extra["workflow_id"].as_str().unwrap();
        let status = executor.status(task_id).unwrap();
        assert_eq!(status["context"]["faq_consulted"], true);
        assert_eq!(status["context"]["reset_password_executed"], true);
    }

    #[tokio::test]
    async fn garbage_plan_falls_back_to_single_faq_step() {
        let (executor, _) = executor_with(vec!["I cannot plan right now.", "Tóm tắt."]);
        let response = executor
            .run("một yêu cầu phức tạp", &[], &RequestContext::default())
            .await;
        assert_eq!(response.extra["steps_total"], 1);
        assert_eq!(response.extra["workflow_completed"], true);
    }

    #[tokio::test]
    async fn cyclic_plan_falls_back() {
        let cyclic = r#"{"steps": [
            {"step_id": "a", "agent_type": "faq", "description": "x", "dependencies": ["b"]},
            {"step_id": "b", "agent_type": "faq", "description": "y", "dependencies": ["a"]}
        ]}"#;
        let (executor, _) = executor_with(vec![cyclic, "Tóm tắt."]);
        let response = executor
            .run("yêu cầu", &[], &RequestContext::default())
            .await;
        assert_eq!(response.extra["steps_total"], 1);
        assert_eq!(response.extra["workflow_completed"], true);
    }

    #[tokio::test]
    async fn unknown_agent_step_fails_but_run_finishes() {
        let plan = r#"{"steps": [
            {"step_id": "s1", "agent_type": "astrologer", "description": "xem sao"}
        ]}"#;
        let (executor, _) = executor_with(vec![plan, "Tóm tắt."]);
        let response = executor
            .run("yêu cầu", &[], &RequestContext::default())
            .await;
        let details = response.extra["execution_details"].as_array().unwrap();
        assert_eq!(details[0]["result"]["success"], false);
        let error = details[0]["result"]["payload"]["error"].as_str().unwrap();
        assert!(error.contains("Unknown agent type"));
        assert!(error.contains("astrologer"));
        assert_eq!(response.extra["workflow_completed"], true);
    }

    #[tokio::test]
    async fn stuck_plan_synthesizes_partial_results() {
        let (executor, llm) = executor_with(vec!["Tóm tắt một phần."]);
        let mut plan = WorkflowPlan::new("t1", "req");
        let mut step = TaskStep::new("a", "faq", "x");
        step.status = crate::workflow::plan::TaskStatus::InProgress;
        plan.add_step(step);

        let (summary, details) = executor.execute(&mut plan, &[], &RequestContext::default()).await;
        assert!(details.is_empty());
        assert_eq!(summary, "Tóm tắt một phần.");
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn cleanup_reaps_only_old_completed_plans() {
        let (executor, _) = executor_with(vec![
            r#"{"steps": [{"step_id": "s1", "agent_type": "faq", "description": "x"}]}"#,
            "Tóm tắt.",
        ]);
        let response = executor
            .run("yêu cầu", &[], &RequestContext::default())
            .await;
        let task_id = response.extra["workflow_id"].as_str().unwrap().to_string();

        assert_eq!(executor.cleanup(24), 0);
        assert!(executor.status(&task_id).is_some());

        {
            let mut plans = executor.plans.lock().unwrap();
            let plan = plans.get_mut(&task_id).unwrap();
            plan.created_at = chrono::Utc::now() - chrono::Duration::hours(48);
        }
        assert_eq!(executor.cleanup(24), 1);
        assert!(executor.status(&task_id).is_none());
    }
}

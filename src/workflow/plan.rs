//! Workflow plans
//!
//! A plan is a small DAG of steps over the specialist pool. Steps carry
//! explicit dependencies and a priority; readiness is computed from
//! completed dependency sets, so independent branches interleave by
//! priority. Feasibility is checked once at creation time: a plan with
//! dangling, self, or cyclic dependencies is rejected before any step runs.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AgentError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

/// Outcome of one executed step.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    #[serde(default)]
    pub payload: Value,
    /// Merged into the plan context after the step completes, visible to
    /// every later step.
    #[serde(default)]
    pub context_updates: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskStep {
    pub step_id: String,
    pub agent_type: String,
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub tool_call: Option<String>,
    #[serde(default)]
    pub expected_output: Option<String>,
    #[serde(default = "default_status")]
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<StepResult>,
}

fn default_priority() -> i32 {
    1
}

fn default_status() -> TaskStatus {
    TaskStatus::Pending
}

impl TaskStep {
    pub fn new(step_id: impl Into<String>, agent_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            agent_type: agent_type.into(),
            description: description.into(),
            dependencies: Vec::new(),
            priority: default_priority(),
            tool_call: None,
            expected_output: None,
            status: default_status(),
            result: None,
        }
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tool_call(mut self, tool: impl Into<String>) -> Self {
        self.tool_call = Some(tool.into());
        self
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct WorkflowPlan {
    pub task_id: String,
    pub user_request: String,
    pub steps: Vec<TaskStep>,
    /// Shared blackboard the steps write into via context_updates.
    pub context: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowPlan {
    pub fn new(task_id: impl Into<String>, user_request: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            user_request: user_request.into(),
            steps: Vec::new(),
            context: Map::new(),
            created_at: Utc::now(),
        }
    }

    pub fn add_step(&mut self, step: TaskStep) {
        self.steps.push(step);
    }

    /// Pending steps whose dependencies are all completed, highest priority
    /// first.
    pub fn ready_steps(&self) -> Vec<&TaskStep> {
        let completed: HashSet<&str> = self
            .steps
            .iter()
            .filter(|s| s.status == TaskStatus::Completed)
            .map(|s| s.step_id.as_str())
            .collect();
        let mut ready: Vec<&TaskStep> = self
            .steps
            .iter()
            .filter(|s| {
                s.status == TaskStatus::Pending
                    && s.dependencies.iter().all(|d| completed.contains(d.as_str()))
            })
            .collect();
        ready.sort_by(|a, b| b.priority.cmp(&a.priority));
        ready
    }

    /// An empty plan is never completed; it produced nothing.
    pub fn is_completed(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.status == TaskStatus::Completed)
    }

    pub fn mark_in_progress(&mut self, step_id: &str) {
        if let Some(step) = self.steps.iter_mut().find(|s| s.step_id == step_id) {
            step.status = TaskStatus::InProgress;
        }
    }

    pub fn mark_completed(&mut self, step_id: &str, result: StepResult) {
        if let Some(step) = self.steps.iter_mut().find(|s| s.step_id == step_id) {
            step.status = TaskStatus::Completed;
            step.result = Some(result);
        }
    }

    pub fn merge_context(&mut self, updates: Map<String, Value>) {
        self.context.extend(updates);
    }

    /// Kahn's algorithm over the dependency graph. Errors on dangling
    /// references, self dependencies, and cycles, so a feasible plan is
    /// guaranteed to drain through `ready_steps`.
    pub fn check_feasible(&self) -> Result<(), AgentError> {
        let ids: HashSet<&str> = self.steps.iter().map(|s| s.step_id.as_str()).collect();

        let mut indegree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for step in &self.steps {
            indegree.entry(step.step_id.as_str()).or_insert(0);
            for dep in &step.dependencies {
                if dep == &step.step_id {
                    return Err(AgentError::PlanUnsatisfiable(format!(
                        "step {} depends on itself",
                        step.step_id
                    )));
                }
                if !ids.contains(dep.as_str()) {
                    return Err(AgentError::PlanUnsatisfiable(format!(
                        "step {} depends on unknown step {dep}",
                        step.step_id
                    )));
                }
                *indegree.entry(step.step_id.as_str()).or_insert(0) += 1;
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(step.step_id.as_str());
            }
        }

        let mut queue: Vec<&str> = indegree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut visited = 0usize;
        while let Some(id) = queue.pop() {
            visited += 1;
            if let Some(next) = dependents.get(id) {
                for &n in next {
                    if let Some(d) = indegree.get_mut(n) {
                        *d -= 1;
                        if *d == 0 {
                            queue.push(n);
                        }
                    }
                }
            }
        }

        if visited == self.steps.len() {
            Ok(())
        } else {
            Err(AgentError::PlanUnsatisfiable(
                "dependency cycle detected".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(id: &str, deps: &[&str], priority: i32) -> TaskStep {
        TaskStep::new(id, "faq", format!("do {id}"))
            .with_dependencies(deps.iter().map(|s| s.to_string()).collect())
            .with_priority(priority)
    }

    #[test]
    fn ready_steps_respect_dependencies_and_priority() {
        let mut plan = WorkflowPlan::new("t1", "req");
        plan.add_step(step("a", &[], 1));
        plan.add_step(step("b", &[], 3));
        plan.add_step(step("c", &["a"], 5));

        let ready: Vec<&str> = plan.ready_steps().iter().map(|s| s.step_id.as_str()).collect();
        assert_eq!(ready, vec!["b", "a"]);

        plan.mark_completed("a", StepResult::default());
        let ready: Vec<&str> = plan.ready_steps().iter().map(|s| s.step_id.as_str()).collect();
        assert_eq!(ready, vec!["c", "b"]);
    }

    #[test]
    fn empty_plan_is_not_completed() {
        let plan = WorkflowPlan::new("t1", "req");
        assert!(!plan.is_completed());
    }

    #[test]
    fn plan_completes_when_all_steps_do() {
        let mut plan = WorkflowPlan::new("t1", "req");
        plan.add_step(step("a", &[], 1));
        plan.add_step(step("b", &["a"], 1));
        assert!(!plan.is_completed());
        plan.mark_completed("a", StepResult::default());
        plan.mark_completed("b", StepResult::default());
        assert!(plan.is_completed());
    }

    #[test]
    fn in_progress_steps_are_not_ready() {
        let mut plan = WorkflowPlan::new("t1", "req");
        plan.add_step(step("a", &[], 1));
        plan.mark_in_progress("a");
        assert!(plan.ready_steps().is_empty());
    }

    #[test]
    fn linear_and_diamond_plans_are_feasible() {
        let mut plan = WorkflowPlan::new("t1", "req");
        plan.add_step(step("a", &[], 1));
        plan.add_step(step("b", &["a"], 1));
        plan.add_step(step("c", &["a"], 1));
        plan.add_step(step("d", &["b", "c"], 1));
        assert!(plan.check_feasible().is_ok());
    }

    #[test]
    fn dangling_dependency_is_infeasible() {
        let mut plan = WorkflowPlan::new("t1", "req");
        plan.add_step(step("a", &["ghost"], 1));
        assert!(matches!(
            plan.check_feasible(),
            Err(AgentError::PlanUnsatisfiable(_))
        ));
    }

    #[test]
    fn self_dependency_is_infeasible() {
        let mut plan = WorkflowPlan::new("t1", "req");
        plan.add_step(step("a", &["a"], 1));
        assert!(plan.check_feasible().is_err());
    }

    #[test]
    fn cycle_is_infeasible() {
        let mut plan = WorkflowPlan::new("t1", "req");
        plan.add_step(step("a", &["b"], 1));
        plan.add_step(step("b", &["a"], 1));
        assert!(plan.check_feasible().is_err());
    }

    #[test]
    fn merge_context_overwrites_existing_keys() {
        let mut plan = WorkflowPlan::new("t1", "req");
        plan.context.insert("k".into(), json!(1));
        let mut updates = Map::new();
        updates.insert("k".into(), json!(2));
        updates.insert("new".into(), json!(true));
        plan.merge_context(updates);
        assert_eq!(plan.context["k"], 2);
        assert_eq!(plan.context["new"], true);
    }

    #[test]
    fn step_deserializes_with_defaults() {
        let step: TaskStep = serde_json::from_value(json!({
            "step_id": "s1",
            "agent_type": "faq",
            "description": "tra cứu"
        }))
        .unwrap();
        assert_eq!(step.priority, 1);
        assert_eq!(step.status, TaskStatus::Pending);
        assert!(step.dependencies.is_empty());
        assert!(step.tool_call.is_none());
    }
}

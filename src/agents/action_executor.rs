//! Action-executor specialist
//!
//! The only specialist with side effects. Resolves a natural-language
//! request to exactly one catalog tool, fills its required parameters from
//! three layered sources (gateway-extracted entities, workflow/session
//! context, a second narrower gateway call for whatever is still missing),
//! validates strictly, and invokes the action service. Validation failures
//! name every missing or invalid field; they are user-addressable replies,
//! never silent partial successes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::agents::{AgentResponse, Specialist};
use crate::error::AgentError;
use crate::llm::{json::extract_as, LlmClient};
use crate::memory::{ChatTurn, Message, RequestContext};
use crate::tools::{ActionInvoker, InvokeError, ToolCatalog};

/// Gateway shape for intent analysis.
#[derive(Debug, Default, Deserialize)]
struct ToolAnalysis {
    #[serde(default)]
    tool_name: Option<String>,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    extracted_entities: Map<String, Value>,
}

/// Outcome of strict parameter validation.
#[derive(Debug, PartialEq, Eq)]
enum ValidationFailure {
    /// Required parameters absent or null. Contains exactly the set
    /// difference between required and provided.
    Missing(Vec<String>),
    /// All parameters present but one or more violate a format rule.
    Format(Vec<String>),
}

/// Format rules: a `student_id` parameter must be all digits with length
/// >= 8; any parameter named `*_time` must parse as ISO-8601.
fn validate_params(
    required: &[String],
    params: &Map<String, Value>,
) -> Result<(), ValidationFailure> {
    let missing: Vec<String> = required
        .iter()
        .filter(|p| params.get(*p).map_or(true, Value::is_null))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(ValidationFailure::Missing(missing));
    }

    let mut format_errors = Vec::new();
    for (name, value) in params {
        let Some(text) = value.as_str() else { continue };
        if name == "student_id" && !is_valid_student_id(text) {
            format_errors.push(format!(
                "student_id phải là số có ít nhất 8 chữ số (nhận được: {text})"
            ));
        }
        if name.ends_with("_time") && !is_iso8601(text) {
            format_errors.push(format!("{name} phải có định dạng datetime hợp lệ (ISO-8601)"));
        }
    }
    if format_errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationFailure::Format(format_errors))
    }
}

fn is_valid_student_id(value: &str) -> bool {
    value.len() >= 8 && value.chars().all(|c| c.is_ascii_digit())
}

fn is_iso8601(value: &str) -> bool {
    value.parse::<DateTime<FixedOffset>>().is_ok() || value.parse::<NaiveDateTime>().is_ok()
}

pub struct ActionExecutorAgent {
    llm: Arc<dyn LlmClient>,
    catalog: ToolCatalog,
    invoker: Arc<dyn ActionInvoker>,
}

impl ActionExecutorAgent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        catalog: ToolCatalog,
        invoker: Arc<dyn ActionInvoker>,
    ) -> Self {
        Self {
            llm,
            catalog,
            invoker,
        }
    }

    /// Step 1: gateway intent analysis. Unparseable output means no tool
    /// was identified, which is a legitimate terminal outcome.
    async fn analyze_tool_request(&self, message: &str, ctx: &RequestContext) -> ToolAnalysis {
        let prompt = format!(
            "Identify which helpdesk tool (if any) this request needs.\n\
             REQUEST: {message}\n\nAVAILABLE TOOLS:\n{}\n\n\
             Workflow context: {}\n\n\
             Return exactly this JSON shape and nothing else:\n\
             {{\"tool_name\": \"name_or_null\", \"confidence\": 0.9, \
             \"extracted_entities\": {{\"student_id\": \"...\"}}}}",
            self.catalog.listing(),
            Value::Object(ctx.workflow_context.clone()),
        );
        match self.llm.complete(&[Message::user(prompt)]).await {
            Ok(reply) => extract_as::<ToolAnalysis>(&reply).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "tool analysis unparseable");
                ToolAnalysis::default()
            }),
            Err(e) => {
                tracing::warn!(error = %e, "tool analysis gateway call failed");
                ToolAnalysis::default()
            }
        }
    }

    /// Steps 4a-4c: layered parameter resolution. Entities win over context;
    /// the narrower gateway call is only asked for what is still missing.
    async fn resolve_params(
        &self,
        tool_name: &str,
        message: &str,
        ctx: &RequestContext,
        entities: &Map<String, Value>,
    ) -> Map<String, Value> {
        let Some(tool) = self.catalog.get(tool_name) else {
            return Map::new();
        };

        let mut params = Map::new();
        for name in &tool.required_params {
            if let Some(value) = entities.get(name).filter(|v| !v.is_null()) {
                params.insert(name.clone(), value.clone());
            }
        }
        for name in &tool.required_params {
            if params.contains_key(name) {
                continue;
            }
            if let Some(value) = ctx.lookup(name).filter(|v| !v.is_null()) {
                params.insert(name.clone(), value.clone());
            }
        }

        let missing: Vec<&String> = tool
            .required_params
            .iter()
            .filter(|p| !params.contains_key(*p))
            .collect();
        if missing.is_empty() {
            return params;
        }

        let prompt = format!(
            "Extract parameters for the tool '{tool_name}' from this request.\n\
             REQUEST: {message}\n\nPARAMETERS TO EXTRACT: {missing:?}\n\
             SCHEMA: {}\n\n\
             Rules: student_id is a numeric code like 20210001; *_time values \
             use ISO format (2024-01-15T10:00:00); duration is a phrase like \
             \"1 year\".\n\
             Return a JSON object mapping each requested parameter to its \
             value, or null when the request does not contain it.",
            tool.schema,
        );
        if let Ok(reply) = self.llm.complete(&[Message::user(prompt)]).await {
            if let Ok(extracted) = extract_as::<Map<String, Value>>(&reply) {
                for name in missing {
                    if let Some(value) = extracted.get(name).filter(|v| !v.is_null()) {
                        params.insert(name.clone(), value.clone());
                    }
                }
            } else {
                tracing::warn!(tool = tool_name, "parameter extraction unparseable");
            }
        }
        params
    }

    /// Steps 4-6 once the tool is known. Also the entry point the workflow
    /// executor uses for steps bound to a `tool_call`.
    pub async fn execute_named_tool(
        &self,
        tool_name: &str,
        message: &str,
        ctx: &RequestContext,
        entities: &Map<String, Value>,
    ) -> AgentResponse {
        let Some(tool) = self.catalog.get(tool_name) else {
            return self.tool_not_found_response(tool_name);
        };

        let params = self.resolve_params(tool_name, message, ctx, entities).await;

        if let Err(failure) = validate_params(&tool.required_params, &params) {
            return self.validation_error_response(tool_name, failure);
        }

        match self
            .invoker
            .invoke(tool_name, &params, ctx.student_id.as_deref())
            .await
        {
            Ok(result) => {
                let summary = result
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Hoàn thành");
                AgentResponse::new(
                    self.name(),
                    format!("Đã thực hiện thành công {tool_name}. Kết quả: {summary}"),
                )
                .with("tool_executed", json!(tool_name))
                .with("execution_result", result)
            }
            Err(e) => self.invoke_error_response(tool_name, e),
        }
    }

    fn guidance_response(&self) -> AgentResponse {
        AgentResponse::failure(
            self.name(),
            format!(
                "Tôi có thể giúp bạn thực hiện các công việc sau:\n\n{}\n\nBạn muốn làm gì?",
                self.catalog.listing()
            ),
        )
        .with("reason", json!("tool_not_identified"))
        .with("available_tools", json!(self.catalog.names()))
    }

    fn tool_not_found_response(&self, tool_name: &str) -> AgentResponse {
        let err = AgentError::ToolNotFound(tool_name.to_string());
        tracing::warn!(error = %err, "tool resolution failed");
        AgentResponse::failure(
            self.name(),
            format!(
                "Xin lỗi, tôi không thể thực hiện '{tool_name}'. Các công cụ có sẵn: {}",
                self.catalog.names().join(", ")
            ),
        )
        .with("reason", json!("tool_not_found"))
        .with("error", json!(err.to_string()))
        .with("requested_tool", json!(tool_name))
        .with("available_tools", json!(self.catalog.names()))
    }

    fn validation_error_response(
        &self,
        tool_name: &str,
        failure: ValidationFailure,
    ) -> AgentResponse {
        let (detail, extra_key, extra) = match failure {
            ValidationFailure::Missing(missing) => (
                format!("Thiếu tham số bắt buộc: {}", missing.join(", ")),
                "missing_params",
                json!(missing),
            ),
            ValidationFailure::Format(errors) => {
                (errors.join("; "), "validation_errors", json!(errors))
            }
        };
        let err = AgentError::ToolValidationFailed(format!("{tool_name}: {detail}"));
        tracing::warn!(error = %err, "parameter validation failed");
        AgentResponse::failure(
            self.name(),
            format!(
                "Không thể thực hiện {tool_name}. {detail}. Bạn vui lòng cung cấp đầy đủ thông tin."
            ),
        )
        .with("reason", json!("parameter_validation_failed"))
        .with("error", json!(err.to_string()))
        .with("tool_name", json!(tool_name))
        .with(extra_key, extra)
    }

    fn invoke_error_response(&self, tool_name: &str, error: InvokeError) -> AgentResponse {
        tracing::warn!(tool = tool_name, error = %error, "tool invocation failed");
        let (reason, reply) = match error {
            InvokeError::Http(status) => (
                "http_error",
                format!("Không thể thực hiện {tool_name}. Lỗi khi gọi dịch vụ: {status}"),
            ),
            InvokeError::Request(_) => (
                "request_error",
                format!(
                    "Không thể thực hiện {tool_name}. Không thể kết nối đến dịch vụ thực hiện."
                ),
            ),
            InvokeError::Unexpected(detail) => (
                "unexpected_error",
                format!("Không thể thực hiện {tool_name}. Lỗi không xác định: {detail}"),
            ),
        };
        AgentResponse::failure(self.name(), reply)
            .with("reason", json!(reason))
            .with("tool_attempted", json!(tool_name))
    }
}

#[async_trait]
impl Specialist for ActionExecutorAgent {
    fn name(&self) -> &'static str {
        "action_executor"
    }

    async fn process(
        &self,
        message: &str,
        _history: &[ChatTurn],
        ctx: &RequestContext,
    ) -> AgentResponse {
        let analysis = self.analyze_tool_request(message, ctx).await;

        let Some(tool_name) = analysis.tool_name.filter(|t| !t.is_empty() && t != "null") else {
            return self.guidance_response();
        };

        if !self.catalog.contains(&tool_name) {
            return self.tool_not_found_response(&tool_name);
        }

        tracing::info!(
            tool = %tool_name,
            confidence = analysis.confidence,
            "tool intent identified"
        );
        self.execute_named_tool(&tool_name, message, ctx, &analysis.extracted_entities)
            .await
    }
}

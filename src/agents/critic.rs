//! Response critic
//!
//! Scores a specialist response on six quality criteria and produces
//! improvement suggestions. Not a routing target: the manager runs it as an
//! optional post-pass and attaches the evaluation as metadata, never
//! replacing the user-facing reply. When the gateway cannot produce a
//! parseable evaluation, a structural heuristic over the response shape
//! keeps the pass deterministic.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::agents::AgentResponse;
use crate::llm::{json::extract_as, LlmClient};
use crate::memory::{Message, RequestContext};

/// Criterion key with its Vietnamese display label, in report order.
const CRITERIA: [(&str, &str); 6] = [
    ("accuracy", "Tính chính xác của thông tin"),
    ("completeness", "Tính đầy đủ của câu trả lời"),
    ("relevance", "Mức độ liên quan đến yêu cầu"),
    ("clarity", "Tính rõ ràng và dễ hiểu"),
    ("actionability", "Khả năng thực hiện/hành động"),
    ("safety", "Tính an toàn và tuân thủ quy định"),
];

const NO_CRITICAL_ISSUES: &str = "Không có vấn đề nghiêm trọng nào";

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EvaluationResult {
    #[serde(default)]
    pub scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub overall_score: f64,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub critical_issues: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Suggestion {
    pub criterion: String,
    pub current_score: f64,
    pub priority: &'static str,
    pub description: &'static str,
    pub specific_action: &'static str,
}

pub struct Critic {
    llm: Arc<dyn LlmClient>,
    score_threshold: f64,
}

impl Critic {
    pub fn new(llm: Arc<dyn LlmClient>, score_threshold: f64) -> Self {
        Self {
            llm,
            score_threshold,
        }
    }

    /// Runs the full evaluation and wraps it as an agent response with the
    /// formatted summary as reply and the structured result as metadata.
    pub async fn review(
        &self,
        original_request: &str,
        response: &AgentResponse,
        ctx: &RequestContext,
    ) -> AgentResponse {
        let evaluation = self.evaluate(original_request, response, ctx).await;
        let suggestions = self.improvement_suggestions(&evaluation);
        let summary = self.format_summary(&evaluation, &suggestions);
        AgentResponse::new("critic", summary)
            .with("evaluation", json!(evaluation))
            .with("improvement_suggestions", json!(suggestions))
            .with("overall_quality", json!(evaluation.overall_score))
    }

    /// Gateway evaluation with structural fallback on failure or
    /// unparseable output.
    pub async fn evaluate(
        &self,
        original_request: &str,
        response: &AgentResponse,
        ctx: &RequestContext,
    ) -> EvaluationResult {
        let criteria: BTreeMap<&str, &str> = CRITERIA.iter().copied().collect();
        let prompt = format!(
            "Đánh giá response sau theo các tiêu chí chất lượng.\n\n\
             YÊU CẦU GỐC: {original_request}\n\n\
             RESPONSE CẦN ĐÁNH GIÁ:\n{}\n\n\
             CONTEXT BỔ SUNG:\n{}\n\n\
             TIÊU CHÍ ĐÁNH GIÁ:\n{}\n\n\
             Trả về JSON:\n\
             {{\"scores\": {{\"accuracy\": 8.5, \"completeness\": 7.0, \
             \"relevance\": 9.0, \"clarity\": 8.0, \"actionability\": 6.5, \
             \"safety\": 9.5}}, \"overall_score\": 8.1, \
             \"strengths\": [\"...\"], \"weaknesses\": [\"...\"], \
             \"critical_issues\": [\"{NO_CRITICAL_ISSUES}\"]}}\n\n\
             Thang điểm: 0-10 (10 là tốt nhất)",
            serde_json::to_string_pretty(response).unwrap_or_default(),
            serde_json::Value::Object(ctx.workflow_context.clone()),
            serde_json::to_string_pretty(&criteria).unwrap_or_default(),
        );
        match self.llm.complete(&[Message::user(prompt)]).await {
            Ok(reply) => match extract_as::<EvaluationResult>(&reply) {
                Ok(mut evaluation) => {
                    if evaluation.overall_score == 0.0 && !evaluation.scores.is_empty() {
                        evaluation.overall_score = mean(&evaluation.scores);
                    }
                    evaluation
                }
                Err(e) => {
                    tracing::warn!(error = %e, "evaluation unparseable, using structural scoring");
                    fallback_evaluation(response)
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "evaluation gateway call failed");
                fallback_evaluation(response)
            }
        }
    }

    /// One deterministic suggestion per criterion under the threshold, plus
    /// one per reported critical issue.
    pub fn improvement_suggestions(&self, evaluation: &EvaluationResult) -> Vec<Suggestion> {
        let mut suggestions = Vec::new();
        for (criterion, _) in CRITERIA {
            let Some(&score) = evaluation.scores.get(criterion) else {
                continue;
            };
            if score < self.score_threshold {
                suggestions.push(suggestion_for(criterion, score));
            }
        }
        for issue in &evaluation.critical_issues {
            if issue != NO_CRITICAL_ISSUES {
                suggestions.push(Suggestion {
                    criterion: format!("critical: {issue}"),
                    current_score: 0.0,
                    priority: "high",
                    description: "Khắc phục vấn đề nghiêm trọng",
                    specific_action: "Xem xét lại nội dung và sửa ngay vấn đề được nêu",
                });
            }
        }
        suggestions
    }

    fn format_summary(&self, evaluation: &EvaluationResult, suggestions: &[Suggestion]) -> String {
        let quality = if evaluation.overall_score >= 8.5 {
            "Xuất sắc"
        } else if evaluation.overall_score >= 7.0 {
            "Tốt"
        } else if evaluation.overall_score >= 5.5 {
            "Trung bình"
        } else {
            "Cần cải thiện"
        };

        let mut summary = format!(
            "Đánh giá chất lượng response: {quality} ({:.1}/10)\n\nChi tiết điểm số:\n",
            evaluation.overall_score
        );
        for (criterion, label) in CRITERIA {
            if let Some(score) = evaluation.scores.get(criterion) {
                summary.push_str(&format!("- {label}: {score}/10\n"));
            }
        }
        if !evaluation.strengths.is_empty() {
            summary.push_str("\nĐiểm mạnh:\n");
            for s in &evaluation.strengths {
                summary.push_str(&format!("+ {s}\n"));
            }
        }
        if !evaluation.weaknesses.is_empty() {
            summary.push_str("\nĐiểm cần cải thiện:\n");
            for w in &evaluation.weaknesses {
                summary.push_str(&format!("- {w}\n"));
            }
        }
        let high: Vec<&Suggestion> = suggestions.iter().filter(|s| s.priority == "high").collect();
        if !high.is_empty() {
            summary.push_str("\nĐề xuất ưu tiên cao:\n");
            for s in high {
                summary.push_str(&format!("! {}: {}\n", s.description, s.specific_action));
            }
        }
        summary
    }
}

fn mean(scores: &BTreeMap<String, f64>) -> f64 {
    let sum: f64 = scores.values().sum();
    (sum / scores.len() as f64 * 10.0).round() / 10.0
}

/// Structural scoring over the response shape. An empty reply never scores
/// above 7.0 on any criterion, so a blank answer cannot pass as good.
fn fallback_evaluation(response: &AgentResponse) -> EvaluationResult {
    let reply_len = response.reply.chars().count();
    let empty = response.reply.trim().is_empty();

    let mut scores = BTreeMap::new();
    scores.insert(
        "accuracy".to_string(),
        if reply_len > 50 { 7.0 } else { 5.0 },
    );
    scores.insert(
        "completeness".to_string(),
        if empty { 5.0 } else { 7.0 },
    );
    scores.insert("relevance".to_string(), 6.5);
    scores.insert(
        "clarity".to_string(),
        if (50..=500).contains(&reply_len) { 7.0 } else { 6.0 },
    );
    scores.insert(
        "actionability".to_string(),
        if response.extra.contains_key("suggested_action") {
            7.0
        } else {
            5.0
        },
    );
    scores.insert("safety".to_string(), if empty { 6.0 } else { 7.0 });

    let overall = mean(&scores);
    EvaluationResult {
        overall_score: overall,
        scores,
        strengths: Vec::new(),
        weaknesses: vec!["Đánh giá tự động dựa trên cấu trúc response".to_string()],
        critical_issues: vec![NO_CRITICAL_ISSUES.to_string()],
    }
}

fn suggestion_for(criterion: &str, score: f64) -> Suggestion {
    let (priority, description, specific_action): (&'static str, &'static str, &'static str) =
        match criterion {
            "accuracy" => (
                if score < 5.0 { "high" } else { "medium" },
                "Cải thiện tính chính xác thông tin",
                "Kiểm tra lại thông tin với nguồn đáng tin cậy và bổ sung chi tiết cụ thể",
            ),
            "completeness" => (
                "medium",
                "Bổ sung thông tin thiếu sót",
                "Thêm thông tin về quy trình, thời gian, và các yêu cầu cần thiết",
            ),
            "relevance" => (
                "high",
                "Tăng mức độ liên quan đến yêu cầu",
                "Tập trung vào các khía cạnh trực tiếp liên quan đến câu hỏi của người dùng",
            ),
            "clarity" => (
                "medium",
                "Cải thiện tính rõ ràng và dễ hiểu",
                "Sử dụng ngôn ngữ đơn giản hơn và cấu trúc câu trả lời có logic",
            ),
            "actionability" => (
                "high",
                "Tăng khả năng thực hiện hành động",
                "Cung cấp các bước thực hiện cụ thể và rõ ràng",
            ),
            _ => (
                "high",
                "Đảm bảo tính an toàn và tuân thủ quy định",
                "Kiểm tra lại các thông tin nhạy cảm và tuân thủ chính sách bảo mật",
            ),
        };
    Suggestion {
        criterion: criterion.to_string(),
        current_score: score,
        priority,
        description,
        specific_action,
    }
}

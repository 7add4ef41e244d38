//! FAQ specialist: retrieval-grounded answering
//!
//! Four-stage pipeline: query optimization (gateway, keyword-table
//! fallback), document search (external retrieval collaborator), relevance
//! reranking (gateway, order-preserving truncation fallback), and grounded
//! answer generation. Zero retrieved documents short-circuits to a distinct
//! no-results reply; generation is never called on an empty document set.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::time::timeout;

use crate::agents::{build_messages, AgentResponse, Specialist};
use crate::llm::{json::extract_as, LlmClient};
use crate::memory::{ChatTurn, Message, RequestContext};

const SYSTEM_PROMPT: &str = "You are the campus policy assistant. Answer student questions \
about university rules and services strictly from the reference documents \
you are given. If the documents do not contain the answer, say so instead \
of guessing. Answer in the user's language and cite which document each \
fact comes from.";

/// A retrieved policy snippet.
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub quote: String,
    pub source: String,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Boundary to the external retrieval collaborator. An empty result is a
/// valid, expected outcome, not an error.
#[async_trait]
pub trait DocumentSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Document>, String>;
}

/// HTTP retrieval client against the policy service.
pub struct PolicySearchClient {
    client: reqwest::Client,
    service_url: String,
    request_timeout: Duration,
}

impl PolicySearchClient {
    pub fn new(service_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            service_url: service_url.into(),
            request_timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[derive(Deserialize)]
struct SearchReply {
    #[serde(default)]
    citations: Vec<Document>,
}

#[async_trait]
impl DocumentSearch for PolicySearchClient {
    async fn search(&self, query: &str) -> Result<Vec<Document>, String> {
        let request = self
            .client
            .post(format!("{}/rag_answer", self.service_url))
            .json(&json!({ "text": query }));

        let response = timeout(self.request_timeout, request.send())
            .await
            .map_err(|_| "retrieval request timed out".to_string())?
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("policy service returned HTTP {}", response.status()));
        }

        let reply: SearchReply = response.json().await.map_err(|e| e.to_string())?;
        Ok(reply.citations)
    }
}

/// Gateway shapes for the optimization and rerank stages.
#[derive(Deserialize)]
struct OptimizedQuery {
    optimized_query: String,
}

#[derive(Deserialize)]
struct RerankReply {
    ranked: Vec<RankedDoc>,
}

#[derive(Deserialize)]
struct RankedDoc {
    index: usize,
    score: f64,
}

/// Deterministic fallback when query optimization cannot be parsed.
fn keyword_expansion(message: &str) -> String {
    let lower = message.to_lowercase();
    const EXPANSIONS: &[(&str, &str)] = &[
        ("học phí", "học phí tuition fee payment"),
        ("thẻ thư viện", "thẻ thư viện library card renewal"),
        ("ký túc xá", "ký túc xá dormitory accommodation"),
        ("đăng ký", "đăng ký registration enrollment"),
        ("thi", "thi exam examination schedule"),
        ("điểm", "điểm score grade transcript"),
    ];
    for (term, expanded) in EXPANSIONS {
        if lower.contains(term) {
            return (*expanded).to_string();
        }
    }
    message.to_string()
}

pub struct FaqAgent {
    llm: Arc<dyn LlmClient>,
    search: Arc<dyn DocumentSearch>,
    score_threshold: f64,
    max_citations: usize,
    history_window: usize,
}

impl FaqAgent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        search: Arc<dyn DocumentSearch>,
        score_threshold: f64,
        max_citations: usize,
        history_window: usize,
    ) -> Self {
        Self {
            llm,
            search,
            score_threshold,
            max_citations,
            history_window,
        }
    }

    /// Stage 1: ask the gateway for a search-optimized query.
    async fn optimize_query(&self, message: &str) -> String {
        let prompt = format!(
            "Rewrite the following helpdesk question as a short document-search query.\n\
             QUESTION: {message}\n\n\
             Return exactly this JSON shape and nothing else:\n\
             {{\"optimized_query\": \"...\"}}"
        );
        match self.llm.complete(&[Message::user(prompt)]).await {
            Ok(reply) => match extract_as::<OptimizedQuery>(&reply) {
                Ok(parsed) if !parsed.optimized_query.trim().is_empty() => parsed.optimized_query,
                _ => {
                    tracing::warn!("query optimization unparseable, using keyword expansion");
                    keyword_expansion(message)
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "query optimization gateway call failed");
                keyword_expansion(message)
            }
        }
    }

    /// Stage 3: rerank by relevance, filter to the score threshold, cap the
    /// list. Parse failure keeps the original order truncated to the cap.
    async fn rerank(&self, message: &str, docs: Vec<Document>) -> Vec<Document> {
        if docs.len() <= 1 {
            return docs;
        }
        let numbered: String = docs
            .iter()
            .enumerate()
            .map(|(i, d)| format!("[{i}] {} ({})", d.quote, d.source))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Score each document's relevance to the question from 0.0 to 1.0.\n\
             QUESTION: {message}\n\nDOCUMENTS:\n{numbered}\n\n\
             Return exactly this JSON shape and nothing else:\n\
             {{\"ranked\": [{{\"index\": 0, \"score\": 0.9}}]}}"
        );

        let reranked = match self.llm.complete(&[Message::user(prompt)]).await {
            Ok(reply) => extract_as::<RerankReply>(&reply).ok(),
            Err(_) => None,
        };

        match reranked {
            Some(reply) => {
                let mut kept: Vec<(f64, Document)> = reply
                    .ranked
                    .into_iter()
                    .filter(|r| r.score >= self.score_threshold)
                    .filter_map(|r| docs.get(r.index).cloned().map(|d| (r.score, d)))
                    .collect();
                kept.sort_by(|a, b| b.0.total_cmp(&a.0));
                kept.truncate(self.max_citations);
                kept.into_iter().map(|(_, d)| d).collect()
            }
            None => {
                tracing::warn!("rerank unparseable, keeping retrieval order");
                docs.into_iter().take(self.max_citations).collect()
            }
        }
    }

    /// Stage 4: generate an answer grounded on the retained documents.
    async fn generate_answer(
        &self,
        message: &str,
        history: &[ChatTurn],
        docs: &[Document],
    ) -> Result<String, String> {
        let references: String = docs
            .iter()
            .map(|d| format!("- {} (nguồn: {})", d.quote, d.source))
            .collect::<Vec<_>>()
            .join("\n");
        let mut messages = build_messages(SYSTEM_PROMPT, history, self.history_window, message);
        messages.insert(
            1,
            Message::system(format!("THÔNG TIN THAM KHẢO:\n{references}")),
        );
        self.llm.complete(&messages).await
    }

    fn no_results_response(&self, query: &str) -> AgentResponse {
        AgentResponse::new(
            self.name(),
            "Tôi không tìm thấy tài liệu nào liên quan đến câu hỏi của bạn. \
             Bạn có thể diễn đạt lại hoặc liên hệ trực tiếp văn phòng hỗ trợ sinh viên.",
        )
        .with("sources", json!([]))
        .with("no_results", json!(true))
        .with("optimized_query", json!(query))
    }
}

#[async_trait]
impl Specialist for FaqAgent {
    fn name(&self) -> &'static str {
        "faq"
    }

    async fn process(
        &self,
        message: &str,
        history: &[ChatTurn],
        _ctx: &RequestContext,
    ) -> AgentResponse {
        let query = self.optimize_query(message).await;

        let docs = match self.search.search(&query).await {
            Ok(docs) => docs,
            Err(e) => {
                // Retrieval transport failure degrades to the no-results path.
                tracing::warn!(error = %e, "document search failed");
                Vec::new()
            }
        };

        if docs.is_empty() {
            return self.no_results_response(&query);
        }

        let docs = self.rerank(message, docs).await;
        if docs.is_empty() {
            return self.no_results_response(&query);
        }

        match self.generate_answer(message, history, &docs).await {
            Ok(reply) => {
                let sources: Vec<&str> = docs.iter().map(|d| d.source.as_str()).collect();
                AgentResponse::new(self.name(), reply)
                    .with("sources", json!(sources))
                    .with("optimized_query", json!(query))
            }
            Err(e) => {
                tracing::warn!(error = %e, "answer generation failed");
                AgentResponse::apology(self.name())
            }
        }
    }
}

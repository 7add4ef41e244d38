//! Error taxonomy for the orchestration core
//!
//! Each variant is built at the site that classifies the condition; tool
//! errors additionally surface as structured user-addressable responses.
//! Gateway transport failures stay string-typed at the `LlmClient` seam and
//! are recovered locally by the component that issued the call.

use thiserror::Error;

/// Errors that can occur while orchestrating a request.
#[derive(Error, Debug)]
pub enum AgentError {
    /// The gateway replied, but the reply did not contain the expected JSON.
    #[error("Gateway returned malformed output: {0}")]
    GatewayMalformedOutput(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool validation failed: {0}")]
    ToolValidationFailed(String),

    /// A workflow step names an agent type outside the known set.
    #[error("Unknown agent type: {0}")]
    UnknownAgentType(String),

    /// No step is ready while the plan is incomplete (cyclic or
    /// unsatisfiable dependency graph); terminates the workflow run.
    #[error("Plan unsatisfiable: {0}")]
    PlanUnsatisfiable(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

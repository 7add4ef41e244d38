//! Application configuration: config/default.toml plus environment overrides
//!
//! Load order: the first TOML file found among config/default.toml,
//! ../config/default.toml, default.toml; then an optional explicit path;
//! finally `HELPDESK__*` environment variables (double underscore for
//! nesting, e.g. `HELPDESK__LLM__MODEL=gpt-4o-mini`).

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::AgentError;

/// Configuration root (top level of config/default.toml).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub retrieval: RetrievalSection,
    pub action: ActionSection,
    pub session: SessionSection,
    pub critic: CriticSection,
}

/// [llm] section: gateway endpoint and timeouts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Per-request gateway timeout (seconds).
    #[serde(default = "default_llm_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: None,
            api_key: None,
            request_timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    60
}

/// [retrieval] section: policy document search collaborator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    #[serde(default = "default_policy_url")]
    pub policy_service_url: String,
    /// Minimum rerank score for a document to be kept.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
    /// Maximum citations carried into answer generation.
    #[serde(default = "default_max_citations")]
    pub max_citations: usize,
    #[serde(default = "default_retrieval_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            policy_service_url: default_policy_url(),
            score_threshold: default_score_threshold(),
            max_citations: default_max_citations(),
            timeout_secs: default_retrieval_timeout_secs(),
        }
    }
}

fn default_policy_url() -> String {
    "http://policy:8000".to_string()
}

fn default_score_threshold() -> f64 {
    0.7
}

fn default_max_citations() -> usize {
    5
}

fn default_retrieval_timeout_secs() -> u64 {
    15
}

/// [action] section: side-effecting tool service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActionSection {
    #[serde(default = "default_action_url")]
    pub service_url: String,
    #[serde(default = "default_action_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ActionSection {
    fn default() -> Self {
        Self {
            service_url: default_action_url(),
            timeout_secs: default_action_timeout_secs(),
        }
    }
}

fn default_action_url() -> String {
    "http://action:8000".to_string()
}

fn default_action_timeout_secs() -> u64 {
    30
}

/// [session] section: history window and eviction.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Turns of chat history included in prompts.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Idle sessions and finished workflow plans older than this are reaped.
    #[serde(default = "default_max_session_age_hours")]
    pub max_age_hours: i64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            max_age_hours: default_max_session_age_hours(),
        }
    }
}

fn default_history_window() -> usize {
    10
}

fn default_max_session_age_hours() -> i64 {
    24
}

/// [critic] section: post-hoc response scoring.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CriticSection {
    #[serde(default)]
    pub enabled: bool,
    /// Criteria scoring below this get an improvement suggestion.
    #[serde(default = "default_critic_threshold")]
    pub score_threshold: f64,
}

impl Default for CriticSection {
    fn default() -> Self {
        Self {
            enabled: false,
            score_threshold: default_critic_threshold(),
        }
    }
}

fn default_critic_threshold() -> f64 {
    7.0
}

/// Load configuration from disk and environment.
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, AgentError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{name}.toml");
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HELPDESK")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder
        .build()
        .map_err(|e| AgentError::ConfigError(e.to_string()))?;
    c.try_deserialize()
        .map_err(|e| AgentError::ConfigError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sensible() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.session.history_window, 10);
        assert_eq!(cfg.session.max_age_hours, 24);
        assert_eq!(cfg.retrieval.max_citations, 5);
        assert!(!cfg.critic.enabled);
        assert!((cfg.critic.score_threshold - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "[session]\nhistory_window = 4\n\n[llm]\nmodel = \"test-model\"\n"
        )
        .unwrap();
        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.session.history_window, 4);
        assert_eq!(cfg.llm.model, "test-model");
        // untouched sections keep their defaults
        assert_eq!(cfg.action.timeout_secs, 30);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "[session]\nhistory_window = \"lots\"\n").unwrap();
        let err = load_config(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, AgentError::ConfigError(_)));
    }
}

//! Application configuration for the casework engine.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// Environment variables are prefixed with `CASEWORK_`:
/// - `CASEWORK_NATS_URL`: NATS server for event intake and notifications
/// - `CASEWORK_CASE_EVENT_SUBJECT`: subject carrying case triggers
/// - `CASEWORK_TASK_EVENT_SUBJECT`: subject carrying task completions
/// - `CASEWORK_CONTROL_SUBJECT`: subject carrying resume/cancel requests
/// - `CASEWORK_NOTIFICATION_SUBJECT`: subject prefix for user notifications
/// - `CASEWORK_AI_BASE_URL` / `CASEWORK_AI_API_KEY` / `CASEWORK_AI_MODEL`:
///   chat-completions endpoint used by review and classification steps
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Name used in logs and as the NATS client name
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// NATS URL (optional)
    #[serde(default)]
    pub nats_url: Option<String>,

    #[serde(default = "default_case_event_subject")]
    pub case_event_subject: String,

    #[serde(default = "default_task_event_subject")]
    pub task_event_subject: String,

    #[serde(default = "default_control_subject")]
    pub control_subject: String,

    #[serde(default = "default_notification_subject")]
    pub notification_subject: String,

    /// Base URL of an OpenAI-compatible API. Unset disables AI steps.
    #[serde(default)]
    pub ai_base_url: Option<String>,

    #[serde(default)]
    pub ai_api_key: Option<String>,

    #[serde(default = "default_ai_model")]
    pub ai_model: String,

    /// AI request timeout in seconds
    #[serde(default = "default_ai_timeout")]
    pub ai_timeout_secs: u64,

    /// Staff role used when a manual step names no assignee
    #[serde(default = "default_staff_role")]
    pub staff_role: String,

    /// Apply the database schema on startup
    #[serde(default)]
    pub init_schema: bool,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,
}

fn default_server_name() -> String {
    "casework-engine".to_string()
}

fn default_case_event_subject() -> String {
    "casework.cases.events".to_string()
}

fn default_task_event_subject() -> String {
    "casework.tasks.completed".to_string()
}

fn default_control_subject() -> String {
    "casework.executions.control".to_string()
}

fn default_notification_subject() -> String {
    "casework.notifications".to_string()
}

fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_ai_timeout() -> u64 {
    30
}

fn default_staff_role() -> String {
    "staff".to_string()
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables are prefixed with `CASEWORK_`.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("CASEWORK_").from_env::<AppConfig>()
    }

    /// Whether review/classification steps can reach an AI endpoint.
    pub fn ai_enabled(&self) -> bool {
        self.ai_base_url
            .as_deref()
            .map(|url| !url.trim().is_empty())
            .unwrap_or(false)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            nats_url: None,
            case_event_subject: default_case_event_subject(),
            task_event_subject: default_task_event_subject(),
            control_subject: default_control_subject(),
            notification_subject: default_notification_subject(),
            ai_base_url: None,
            ai_api_key: None,
            ai_model: default_ai_model(),
            ai_timeout_secs: default_ai_timeout(),
            staff_role: default_staff_role(),
            init_schema: false,
            log_json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.case_event_subject, "casework.cases.events");
        assert_eq!(config.staff_role, "staff");
        assert_eq!(config.ai_timeout_secs, 30);
        assert!(!config.ai_enabled());
    }

    #[test]
    fn test_ai_enabled_requires_non_blank_url() {
        let mut config = AppConfig::default();
        config.ai_base_url = Some("  ".to_string());
        assert!(!config.ai_enabled());
        config.ai_base_url = Some("https://api.openai.com/v1".to_string());
        assert!(config.ai_enabled());
    }

    #[test]
    fn test_envy_prefixed_parse() {
        let vars = vec![
            ("CASEWORK_NATS_URL".to_string(), "nats://localhost:4222".to_string()),
            ("CASEWORK_AI_TIMEOUT_SECS".to_string(), "5".to_string()),
            ("CASEWORK_INIT_SCHEMA".to_string(), "true".to_string()),
        ];
        let config: AppConfig = envy::prefixed("CASEWORK_")
            .from_iter(vars)
            .unwrap();
        assert_eq!(config.nats_url.as_deref(), Some("nats://localhost:4222"));
        assert_eq!(config.ai_timeout_secs, 5);
        assert!(config.init_schema);
        assert_eq!(config.ai_model, "gpt-4o-mini");
    }
}

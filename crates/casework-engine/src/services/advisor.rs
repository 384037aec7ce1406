//! AI advisor used by review and classification steps.
//!
//! [`HttpAdvisor`] talks to any OpenAI-compatible chat-completions API and
//! asks for a JSON verdict. Connection failures and timeouts surface as
//! `CollaboratorUnavailable`; malformed answers as `ExternalService`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::error::{EngineError, EngineResult};

/// Outcome of an automatic review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub approved: bool,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// Category suggested for a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(rename = "type")]
    pub category: String,
    pub confidence: f64,
}

#[async_trait]
pub trait AiAdvisor: Send + Sync {
    async fn review(&self, case_text: &str, criteria: &[String]) -> EngineResult<ReviewVerdict>;

    async fn classify(&self, case_text: &str) -> EngineResult<Classification>;
}

/// Advisor for deployments without an AI endpoint.
#[derive(Debug, Default, Clone)]
pub struct DisabledAdvisor;

#[async_trait]
impl AiAdvisor for DisabledAdvisor {
    async fn review(&self, _case_text: &str, _criteria: &[String]) -> EngineResult<ReviewVerdict> {
        Err(EngineError::CollaboratorUnavailable(
            "AI review is not configured".to_string(),
        ))
    }

    async fn classify(&self, _case_text: &str) -> EngineResult<Classification> {
        Err(EngineError::CollaboratorUnavailable(
            "AI classification is not configured".to_string(),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

const REVIEW_PROMPT: &str = "You review government permit applications. Decide whether the \
application can be approved automatically. Answer only with JSON: \
{\"approved\": bool, \"confidence\": number between 0 and 1, \"reasoning\": string}.";

const CLASSIFY_PROMPT: &str = "You classify government permit applications into a category. \
Answer only with JSON: {\"type\": string, \"confidence\": number between 0 and 1}.";

/// Advisor backed by an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct HttpAdvisor {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl HttpAdvisor {
    pub fn new(base_url: &str, api_key: Option<String>, model: &str, timeout: Duration) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: resolve_chat_endpoint(base_url),
            api_key,
            model: model.to_string(),
        })
    }

    /// Build from configuration; `None` when no endpoint is configured.
    pub fn from_config(config: &AppConfig) -> EngineResult<Option<Self>> {
        match config.ai_base_url.as_deref() {
            Some(url) if config.ai_enabled() => Self::new(
                url,
                config.ai_api_key.clone(),
                &config.ai_model,
                Duration::from_secs(config.ai_timeout_secs),
            )
            .map(Some),
            _ => Ok(None),
        }
    }

    async fn complete_json(&self, system: &str, user: &str) -> EngineResult<Value> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EngineError::CollaboratorUnavailable(format!(
                "AI endpoint returned {}",
                status
            )));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::ExternalService(format!(
                "AI endpoint returned {}: {}",
                status, text
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| EngineError::ExternalService(format!("invalid AI response: {}", e)))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| EngineError::ExternalService("AI response had no content".to_string()))?;

        parse_json_content(&content)
    }
}

#[async_trait]
impl AiAdvisor for HttpAdvisor {
    async fn review(&self, case_text: &str, criteria: &[String]) -> EngineResult<ReviewVerdict> {
        let mut prompt = case_text.to_string();
        if !criteria.is_empty() {
            prompt.push_str("\n\nCriteria:\n");
            for c in criteria {
                prompt.push_str(&format!("- {}\n", c));
            }
        }
        let value = self.complete_json(REVIEW_PROMPT, &prompt).await?;
        let verdict: ReviewVerdict = serde_json::from_value(value)
            .map_err(|e| EngineError::ExternalService(format!("invalid review verdict: {}", e)))?;
        Ok(verdict)
    }

    async fn classify(&self, case_text: &str) -> EngineResult<Classification> {
        let value = self.complete_json(CLASSIFY_PROMPT, case_text).await?;
        serde_json::from_value(value)
            .map_err(|e| EngineError::ExternalService(format!("invalid classification: {}", e)))
    }
}

fn map_transport_error(err: reqwest::Error) -> EngineError {
    if err.is_connect() || err.is_timeout() {
        EngineError::CollaboratorUnavailable(format!("AI endpoint unreachable: {}", err))
    } else {
        EngineError::ExternalService(err.to_string())
    }
}

fn resolve_chat_endpoint(base_url: &str) -> String {
    if base_url.contains("/chat/completions") {
        base_url.to_string()
    } else {
        format!("{}/chat/completions", base_url.trim_end_matches('/'))
    }
}

/// Models sometimes wrap JSON in a markdown fence.
fn parse_json_content(content: &str) -> EngineResult<Value> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(unfenced)
        .map_err(|e| EngineError::ExternalService(format!("AI content is not JSON: {}", e)))
}

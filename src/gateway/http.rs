//! OpenAI-compatible chat-completions adapter.

use super::PromptGateway;
use crate::error::WorkflowError;
use anyhow::Result;
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::time::Duration;

pub struct HttpGateway {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpGateway {
    /// Read the API key from `api_key_env`; a missing key is a configuration error.
    pub fn new(endpoint: &str, api_key_env: &str, timeout: Duration) -> Result<Self> {
        if endpoint.trim().is_empty() {
            return Err(WorkflowError::Configuration("http gateway endpoint is empty".to_string()).into());
        }
        let api_key = env::var(api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                WorkflowError::Configuration(format!(
                    "environment variable {api_key_env} holds no API key"
                ))
            })?;
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Ok(HttpGateway {
            agent,
            endpoint: endpoint.trim().to_string(),
            api_key,
        })
    }
}

impl PromptGateway for HttpGateway {
    fn ask(&self, prompt: &str, model: Option<&str>) -> Result<String> {
        let model = model.ok_or_else(|| {
            WorkflowError::Configuration("http gateway requires a model".to_string())
        })?;
        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
        });
        let mut response = self
            .agent
            .post(&self.endpoint)
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(&body)
            .map_err(|err| WorkflowError::Provider(format!("POST {}: {err}", self.endpoint)))?;
        let parsed: ChatResponse = response
            .body_mut()
            .read_json()
            .map_err(|err| WorkflowError::Provider(format!("decode chat response: {err}")))?;
        let answer = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| WorkflowError::Provider("chat response has no content".to_string()))?;
        tracing::info!(
            prompt_bytes = prompt.len(),
            response_bytes = answer.len(),
            model,
            "lm http invoke complete"
        );
        Ok(answer.trim().to_string())
    }
}

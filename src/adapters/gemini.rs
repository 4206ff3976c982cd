use crate::domain::model::ResponseEnvelope;
use crate::domain::ports::{GenerationClient, PromptConfig};
use crate::utils::error::{CanonError, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Generation client for the Gemini `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    timeout: Option<Duration>,
}

impl GeminiClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(CanonError::MissingConfigError {
                field: "generation.api_key".to_string(),
            });
        }

        Ok(Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            timeout: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, model)
    }

    /// 組出 generateContent 的請求內容；system prompt 以 model 角色送出
    pub fn request_body(prompt: &PromptConfig, payload: &Value) -> Result<Value> {
        let user_text = serde_json::to_string(payload)?;

        let mut generation_config = json!({
            "maxOutputTokens": prompt.max_tokens,
            "temperature": prompt.temperature,
        });

        if !prompt.thinking_mode {
            // flash 模型關閉 thinking 時固定 temperature 0
            if prompt.model.contains("flash") {
                generation_config["temperature"] = json!(0);
            }
            generation_config["thinkingConfig"] = json!({ "thinkingBudget": 0 });
        }

        Ok(json!({
            "contents": [
                { "role": "model", "parts": [{ "text": prompt.system_prompt }] },
                { "role": "user", "parts": [{ "text": user_text }] },
            ],
            "generationConfig": generation_config,
        }))
    }
}

fn transport_error(e: reqwest::Error) -> CanonError {
    let kind = if e.is_timeout() {
        "timeout"
    } else if e.is_decode() {
        "decode"
    } else {
        "network"
    };
    CanonError::Transport {
        kind: kind.to_string(),
        message: e.to_string(),
    }
}

#[async_trait::async_trait]
impl GenerationClient for GeminiClient {
    /// Non-2xx answers come back as envelopes carrying their status code so
    /// they can be recorded before the caller rejects them.
    async fn invoke(&self, prompt: &PromptConfig, payload: &Value) -> Result<ResponseEnvelope> {
        let url = self.url(&prompt.model);
        let body = Self::request_body(prompt, payload)?;

        tracing::debug!("📡 POST {} ({} bytes of input)", url, body.to_string().len());

        let mut request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body);

        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        tracing::debug!("📡 Generation API response status: {}", status);

        if status.is_success() {
            let body: Value = response.json().await.map_err(transport_error)?;
            return Ok(ResponseEnvelope::new(body, status.as_u16()));
        }

        let raw = response.text().await.map_err(transport_error)?;
        let body = serde_json::from_str::<Value>(&raw)
            .unwrap_or_else(|_| json!({ "error": { "code": status.as_u16(), "message": raw } }));
        tracing::warn!("⚠️ Generation API responded with {}", status);

        Ok(ResponseEnvelope::new(body, status.as_u16()))
    }
}

use crate::domain::model::ResponseEnvelope;
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Opaque prompt settings handed to the generation client untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    pub system_prompt: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub thinking_mode: bool,
}

#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Performs one generation call. Network, timeout and decode failures are
    /// returned as `CanonError::Transport`; non-2xx answers come back as
    /// envelopes so they can be recorded.
    async fn invoke(
        &self,
        prompt: &PromptConfig,
        payload: &serde_json::Value,
    ) -> Result<ResponseEnvelope>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionFlow {
    Validation,
    Merge,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionHandle(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: InteractionHandle,
    pub flow: InteractionFlow,
    pub created_at: DateTime<Utc>,
    pub request_body: serde_json::Value,
    pub response_body: serde_json::Value,
    pub http_status_code: u16,
}

impl Interaction {
    pub fn is_successful(&self) -> bool {
        (200..300).contains(&self.http_status_code)
    }
}

/// 請求/回應紀錄的持久化介面
pub trait InteractionStore: Send + Sync {
    fn record(
        &self,
        flow: InteractionFlow,
        request: &serde_json::Value,
        envelope: &ResponseEnvelope,
    ) -> impl std::future::Future<Output = Result<InteractionHandle>> + Send;

    /// All stored interactions, oldest first.
    fn all(&self) -> impl std::future::Future<Output = Result<Vec<Interaction>>> + Send;

    /// The `count` most recent interactions, oldest first.
    fn recent(
        &self,
        count: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Interaction>>> + Send {
        async move {
            let mut interactions = self.all().await?;
            let skip = interactions.len().saturating_sub(count);
            interactions.drain(..skip);
            Ok(interactions)
        }
    }
}

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use super::error::GenerationError;
use super::types::{ChatRequest, ChatResponse};
use crate::config::GenerationConfig;

/// Something that turns a prompt into raw reply text.
///
/// Implementations make exactly one attempt; retry policy belongs to callers.
pub trait Generator: Send + Sync + 'static {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, GenerationError>> + Send;
}

/// Client for an OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    api_key: String,
    model: String,
    endpoint: String,
    client: Client,
}

impl ChatClient {
    /// Build a client whose every request is bounded by `config.timeout_ms`.
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
            client,
        })
    }

    pub async fn complete(&self, req: &ChatRequest) -> Result<ChatResponse, GenerationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(GenerationError::Service {
                status: status.as_u16(),
                message: body,
            });
        }

        serde_json::from_str::<ChatResponse>(&body).map_err(|e| GenerationError::Service {
            status: status.as_u16(),
            message: format!("undecodable completion body: {e}"),
        })
    }
}

impl Generator for ChatClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let req = ChatRequest::user_prompt(self.model.clone(), prompt);
        let response = self.complete(&req).await?;
        if let Some(usage) = &response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion received"
            );
        }
        response
            .first_text()
            .map(str::to_string)
            .ok_or_else(|| GenerationError::Service {
                status: 200,
                message: "completion contained no choices".into(),
            })
    }
}

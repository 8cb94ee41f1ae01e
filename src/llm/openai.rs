use async_openai::error::OpenAIError;
use async_openai::types::{CreateChatCompletionRequest, CreateChatCompletionResponse};
use async_openai::{Client, config::OpenAIConfig};
use async_trait::async_trait;

use crate::config::GatewayConfig;

use super::error::LlmError;
use super::provider::ChatCompletionProvider;

/// [`ChatCompletionProvider`] backed by an OpenAI-compatible API.
#[derive(Clone, Debug)]
pub struct OpenAiChatProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiChatProvider {
    pub fn new(client: Client<OpenAIConfig>) -> Self {
        Self { client }
    }

    /// Build a provider from the gateway's model settings.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, LlmError> {
        let api_key = config
            .model_api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(api_base) = config.model_base_url.as_deref() {
            openai_config = openai_config.with_api_base(api_base);
        }

        Ok(Self::new(Client::with_config(openai_config)))
    }
}

#[async_trait]
impl ChatCompletionProvider for OpenAiChatProvider {
    async fn create_chat_completion(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<CreateChatCompletionResponse, OpenAIError> {
        self.client.chat().create(request).await
    }
}

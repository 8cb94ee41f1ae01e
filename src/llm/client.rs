use std::fmt;
use std::time::Instant;

use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessageArgs,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, CreateChatCompletionResponse, ResponseFormat,
};
use serde_json::{Value as JsonValue, json};

use crate::config::GatewayConfig;
use crate::logging::GatewayLogger;

use super::error::LlmError;
use super::openai::OpenAiChatProvider;
use super::provider::ChatCompletionProvider;

const CATEGORY: &str = "llm";

/// Optional parameters that influence chat completion requests.
#[derive(Debug, Default, Clone)]
pub struct ChatCompletionOptions {
    pub model: Option<String>,
    pub response_format: Option<ResponseFormat>,
}

/// Strip a routing prefix such as `openai/` from a model name.
pub fn normalize_model_name(model: &str) -> &str {
    let model = model.trim();
    model
        .split_once('/')
        .map(|(_, name)| name)
        .filter(|name| !name.is_empty())
        .unwrap_or(model)
}

/// Provider-neutral chat completion client.
pub struct LlmClient<P: ChatCompletionProvider> {
    provider: P,
    default_model: String,
    logger: GatewayLogger,
}

impl<P> fmt::Debug for LlmClient<P>
where
    P: ChatCompletionProvider + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider", &self.provider)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl<P: ChatCompletionProvider> LlmClient<P> {
    pub fn new(default_model: impl Into<String>, provider: P) -> Self {
        Self {
            provider,
            default_model: default_model.into(),
            logger: GatewayLogger::default(),
        }
    }

    pub fn with_logger(mut self, logger: GatewayLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Build an [`async_openai`] request from messages and options.
    pub fn build_request(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        options: ChatCompletionOptions,
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        let ChatCompletionOptions {
            model,
            response_format,
        } = options;

        let model = model.unwrap_or_else(|| self.default_model.clone());
        let model = normalize_model_name(&model);
        if model.is_empty() {
            return Err(LlmError::MissingDefaultModel);
        }

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(model);
        builder.messages(messages);

        if let Some(response_format) = response_format {
            builder.response_format(response_format);
        }

        builder
            .build()
            .map_err(|err| LlmError::InvalidRequest(err.to_string()))
    }

    pub async fn create_chat_completion(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        options: ChatCompletionOptions,
        function_name: &str,
    ) -> Result<CreateChatCompletionResponse, LlmError> {
        let request = self.build_request(messages, options)?;
        let model = request.model.clone();

        self.logger.debug(
            format!("Sending chat completion request for {function_name}"),
            Some(CATEGORY),
            Some(json!({ "model": model })),
        );

        let start = Instant::now();
        match self.provider.create_chat_completion(request).await {
            Ok(response) => {
                self.logger.debug(
                    format!("Chat completion for {function_name} succeeded"),
                    Some(CATEGORY),
                    Some(json!({
                        "model": model,
                        "duration_ms": start.elapsed().as_millis() as u64,
                        "usage": response.usage,
                    })),
                );
                Ok(response)
            }
            Err(err) => {
                self.logger.error(
                    format!("Chat completion for {function_name} failed: {err}"),
                    Some(CATEGORY),
                    Some(json!({ "model": model })),
                );
                Err(LlmError::OpenAi(err))
            }
        }
    }

    /// Send a system and user prompt and parse the reply as JSON.
    pub async fn complete_json(
        &self,
        system_prompt: String,
        user_prompt: String,
        response_format: ResponseFormat,
        function_name: &str,
    ) -> Result<JsonValue, LlmError> {
        let messages = vec![system_message(system_prompt)?, user_message(user_prompt)?];
        let options = ChatCompletionOptions {
            response_format: Some(response_format),
            ..Default::default()
        };

        let response = self
            .create_chat_completion(messages, options, function_name)
            .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)?;

        parse_json_reply(&content)
    }
}

impl LlmClient<OpenAiChatProvider> {
    /// Wire the OpenAI provider from gateway configuration.
    pub fn from_config(config: &GatewayConfig, logger: GatewayLogger) -> Result<Self, LlmError> {
        let provider = OpenAiChatProvider::from_config(config)?;
        Ok(LlmClient::new(config.model_name.as_str(), provider).with_logger(logger))
    }
}

pub fn system_message(text: String) -> Result<ChatCompletionRequestMessage, LlmError> {
    ChatCompletionRequestSystemMessageArgs::default()
        .content(ChatCompletionRequestSystemMessageContent::Text(text))
        .build()
        .map(ChatCompletionRequestMessage::System)
        .map_err(|err| LlmError::InvalidRequest(err.to_string()))
}

pub fn user_message(text: String) -> Result<ChatCompletionRequestMessage, LlmError> {
    ChatCompletionRequestUserMessageArgs::default()
        .content(ChatCompletionRequestUserMessageContent::Text(text))
        .build()
        .map(ChatCompletionRequestMessage::User)
        .map_err(|err| LlmError::InvalidRequest(err.to_string()))
}

/// Parse a model reply as JSON, tolerating a surrounding code fence.
fn parse_json_reply(content: &str) -> Result<JsonValue, LlmError> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(unfenced.trim()).map_err(LlmError::MalformedResponse)
}

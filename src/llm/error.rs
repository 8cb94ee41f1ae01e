use thiserror::Error;

use async_openai::error::OpenAIError;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing model API key; set MODEL_API_KEY or OPENAI_API_KEY")]
    MissingApiKey,
    #[error("missing default model configuration")]
    MissingDefaultModel,
    #[error("invalid chat completion request: {0}")]
    InvalidRequest(String),
    #[error("model returned no content")]
    EmptyResponse,
    #[error("model returned malformed JSON: {0}")]
    MalformedResponse(#[source] serde_json::Error),
    #[error(transparent)]
    OpenAi(#[from] OpenAIError),
}

//! Language model access for the reference engine.
//!
//! [`LlmClient`] builds chat completion requests against a default model and
//! sends them through a [`ChatCompletionProvider`]. [`OpenAiChatProvider`] is
//! the production provider; tests substitute a recording one.

pub mod client;
pub mod error;
pub mod openai;
pub mod prompts;
pub mod provider;

pub use client::{ChatCompletionOptions, LlmClient, normalize_model_name};
pub use error::LlmError;
pub use openai::OpenAiChatProvider;
pub use provider::ChatCompletionProvider;

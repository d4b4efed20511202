mod anthropic;
mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

use crate::provider::{LlmError, LlmProvider};

/// Create the provider named in config.
pub fn create_provider(
    config: &newswire_core::config::LlmConfig,
) -> Result<Box<dyn LlmProvider>, LlmError> {
    let api_key = config
        .api_key
        .clone()
        .ok_or_else(|| LlmError::NotConfigured("LLM_API_KEY is not set".to_string()))?;

    match config.provider.as_str() {
        "anthropic" => Ok(Box::new(AnthropicProvider::new(
            api_key,
            config.base_url.clone(),
            config.timeout_seconds,
        )?)),
        "openai" => Ok(Box::new(OpenAiProvider::new(
            api_key,
            config.base_url.clone(),
            config.timeout_seconds,
        )?)),
        other => Err(LlmError::NotConfigured(format!(
            "unknown LLM_PROVIDER '{}' (expected anthropic or openai)",
            other
        ))),
    }
}

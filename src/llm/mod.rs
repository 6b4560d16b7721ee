pub mod providers;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("JSON error: {0}")]
    JsonError(String),
    #[error("Missing client/API key: {0}")]
    MissingConfig(String),
    #[error("Unknown error: {0}")]
    Unknown(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat_completion(
        &self,
        system_prompt: &str,
        history: &[Message],
        user_message: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, LlmError>;

    async fn transcribe_audio(
        &self,
        audio_bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<String, LlmError>;

    async fn analyze_image(
        &self,
        image_bytes: Vec<u8>,
        text_prompt: &str,
    ) -> Result<String, LlmError>;
}

/// Facade over the configured provider.
///
/// When no API key is present the client still constructs; every call then
/// fails with [`LlmError::MissingConfig`], which handlers translate into a
/// degraded-mode reply instead of a crash.
pub struct LlmClient {
    groq: Option<providers::GroqProvider>,
}

impl LlmClient {
    pub fn new(settings: &crate::config::Settings) -> Self {
        Self {
            groq: settings
                .groq_api_key
                .as_ref()
                .filter(|k| !k.is_empty())
                .map(|k| providers::GroqProvider::new(k.clone())),
        }
    }

    fn provider(&self) -> Result<&dyn LlmProvider, LlmError> {
        self.groq
            .as_ref()
            .map(|p| p as &dyn LlmProvider)
            .ok_or_else(|| LlmError::MissingConfig("GROQ_API_KEY".to_string()))
    }

    pub fn is_configured(&self) -> bool {
        self.groq.is_some()
    }

    pub async fn chat_completion(
        &self,
        system_prompt: &str,
        history: &[Message],
        user_message: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, LlmError> {
        self.provider()?
            .chat_completion(system_prompt, history, user_message, max_tokens, temperature)
            .await
    }

    pub async fn transcribe_audio(
        &self,
        audio_bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<String, LlmError> {
        self.provider()?.transcribe_audio(audio_bytes, file_name).await
    }

    pub async fn analyze_image(
        &self,
        image_bytes: Vec<u8>,
        text_prompt: &str,
    ) -> Result<String, LlmError> {
        self.provider()?.analyze_image(image_bytes, text_prompt).await
    }
}

use super::{LlmError, LlmProvider, Message};
use crate::config::{CHAT_MODEL, VISION_MODEL, WHISPER_MODEL};
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::multipart::{Form, Part};
use reqwest::Client as HttpClient;
use serde_json::json;

const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

/// Groq provider: OpenAI-compatible chat plus Whisper transcription and
/// vision through the same API surface.
pub struct GroqProvider {
    client: Client<OpenAIConfig>,
    http_client: HttpClient,
    api_key: String,
}

impl GroqProvider {
    pub fn new(api_key: String) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key.clone())
            .with_api_base(GROQ_API_BASE);
        Self {
            client: Client::with_config(config),
            http_client: HttpClient::new(),
            api_key,
        }
    }
}

#[async_trait]
impl LlmProvider for GroqProvider {
    async fn chat_completion(
        &self,
        system_prompt: &str,
        history: &[Message],
        user_message: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let mut messages = vec![ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()
            .map_err(|e| LlmError::Unknown(e.to_string()))?
            .into()];

        for msg in history {
            let m = match msg.role.as_str() {
                "user" => ChatCompletionRequestUserMessageArgs::default()
                    .content(msg.content.clone())
                    .build()
                    .map_err(|e| LlmError::Unknown(e.to_string()))?
                    .into(),
                _ => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(msg.content.clone())
                    .build()
                    .map_err(|e| LlmError::Unknown(e.to_string()))?
                    .into(),
            };
            messages.push(m);
        }

        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_message)
                .build()
                .map_err(|e| LlmError::Unknown(e.to_string()))?
                .into(),
        );

        let request = CreateChatCompletionRequestArgs::default()
            .model(CHAT_MODEL)
            .messages(messages)
            .max_tokens(max_tokens)
            .temperature(temperature)
            .build()
            .map_err(|e| LlmError::Unknown(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::ApiError(e.to_string()))?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::ApiError("Empty response".to_string()))
    }

    async fn transcribe_audio(
        &self,
        audio_bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<String, LlmError> {
        let url = format!("{GROQ_API_BASE}/audio/transcriptions");

        let file_part = Part::bytes(audio_bytes)
            .file_name(file_name.to_string())
            .mime_str("audio/ogg")
            .map_err(|e| LlmError::Unknown(e.to_string()))?;

        let form = Form::new()
            .part("file", file_part)
            .text("model", WHISPER_MODEL)
            .text("response_format", "text");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError(format!(
                "Whisper API error: {status} - {error_text}"
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;
        Ok(text.trim().to_string())
    }

    async fn analyze_image(
        &self,
        image_bytes: Vec<u8>,
        text_prompt: &str,
    ) -> Result<String, LlmError> {
        let url = format!("{GROQ_API_BASE}/chat/completions");
        let data_url = format!("data:image/jpeg;base64,{}", BASE64.encode(&image_bytes));

        // Vision models reject a system role next to image content, so the
        // user prompt carries everything.
        let body = json!({
            "model": VISION_MODEL,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        {"type": "text", "text": text_prompt},
                        {
                            "type": "image_url",
                            "image_url": {"url": data_url}
                        }
                    ]
                }
            ],
            "max_tokens": 500
        });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError(format!(
                "Vision API error: {status} - {error_text}"
            )));
        }

        let res_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::JsonError(e.to_string()))?;

        res_json["choices"][0]["message"]["content"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| LlmError::ApiError("Failed to get vision analysis".to_string()))
    }
}

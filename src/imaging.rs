//! AI image generation over hosted services.
//!
//! Tries Hugging Face FLUX first when a key is configured, then falls back
//! to the public pollinations.ai endpoints, and for automatic mode finally
//! to an LLM-written visual description so the user always gets something.

use crate::llm::LlmClient;
use rand::seq::IndexedRandom;
use reqwest::Client as HttpClient;
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

const HF_MODEL: &str = "black-forest-labs/FLUX.1-schnell";
const CREATIVE_STYLES: &[&str] = &[
    "digital-art",
    "fantasy-art",
    "neon-punk",
    "isometric",
    "low-poly",
];

/// Memory settings key holding a user's preferred image model.
pub const IMAGE_MODEL_SETTING: &str = "image_model";

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("empty prompt")]
    EmptyPrompt,
    #[error("all image services failed")]
    AllServicesFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageModel {
    /// Try every service in order, ending with a text description.
    #[default]
    Auto,
    /// Hugging Face FLUX.1-schnell.
    Flux,
    /// pollinations.ai default model.
    Pollinations,
    /// pollinations.ai with a random artistic style.
    Creative,
}

impl FromStr for ImageModel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "flux" => Ok(Self::Flux),
            "pollinations" => Ok(Self::Pollinations),
            "creative" => Ok(Self::Creative),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ImageModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::Flux => "flux",
            Self::Pollinations => "pollinations",
            Self::Creative => "creative",
        };
        f.write_str(name)
    }
}

/// What a generation attempt produced.
pub enum ImageOutcome {
    /// Raw image bytes ready to send as a photo.
    Image(Vec<u8>),
    /// Text fallback when no service returned an image.
    Description {
        prompt: String,
        description: String,
        suggestion: String,
    },
}

pub struct ImageGenerator {
    http_client: HttpClient,
    hf_api_key: Option<String>,
}

impl ImageGenerator {
    pub fn new(settings: &crate::config::Settings) -> Self {
        Self {
            http_client: HttpClient::new(),
            hf_api_key: settings
                .hf_api_key
                .clone()
                .filter(|k| !k.is_empty()),
        }
    }

    /// Generate an image for `prompt` with the requested model.
    ///
    /// Service failures are soft: each one is logged and the next service
    /// is tried. Only when every applicable service fails (and, for
    /// [`ImageModel::Auto`], the description fallback too) is
    /// [`ImagingError::AllServicesFailed`] returned.
    pub async fn generate(
        &self,
        prompt: &str,
        model: ImageModel,
        llm: &LlmClient,
    ) -> Result<ImageOutcome, ImagingError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ImagingError::EmptyPrompt);
        }

        info!("Generating image ({model}) for: {}", crate::utils::truncate_str(prompt, 50));

        if matches!(model, ImageModel::Auto | ImageModel::Flux) {
            match self.try_flux(prompt).await {
                Ok(Some(bytes)) => return Ok(ImageOutcome::Image(bytes)),
                Ok(None) => {}
                Err(e) => warn!("FLUX generation failed: {e}"),
            }
        }

        if matches!(model, ImageModel::Auto | ImageModel::Pollinations) {
            match self.try_pollinations(prompt, None).await {
                Ok(Some(bytes)) => return Ok(ImageOutcome::Image(bytes)),
                Ok(None) => {}
                Err(e) => warn!("pollinations.ai failed: {e}"),
            }
        }

        if matches!(model, ImageModel::Auto | ImageModel::Creative) {
            let style = CREATIVE_STYLES
                .choose(&mut rand::rng())
                .copied()
                .unwrap_or("digital-art");
            match self.try_pollinations(prompt, Some(style)).await {
                Ok(Some(bytes)) => {
                    info!("Creative style {style} successful");
                    return Ok(ImageOutcome::Image(bytes));
                }
                Ok(None) => {}
                Err(e) => warn!("Creative style {style} failed: {e}"),
            }
        }

        if model == ImageModel::Auto {
            return Ok(self.describe_fallback(prompt, llm).await);
        }

        Err(ImagingError::AllServicesFailed)
    }

    /// Hugging Face inference endpoint, with the router-URL retry the
    /// service demands when the legacy endpoint answers 410.
    async fn try_flux(&self, prompt: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let Some(key) = self.hf_api_key.as_deref() else {
            return Ok(None);
        };

        let primary = format!("https://api-inference.huggingface.co/models/{HF_MODEL}");
        let response = self
            .http_client
            .post(&primary)
            .bearer_auth(key)
            .header("x-use-cache", "false")
            .json(&json!({"inputs": prompt}))
            .timeout(Duration::from_secs(60))
            .send()
            .await?;

        let response = if response.status().as_u16() == 410 {
            info!("HF endpoint gone, retrying via router");
            let router = format!("https://router.huggingface.co/hf-inference/models/{HF_MODEL}");
            self.http_client
                .post(&router)
                .bearer_auth(key)
                .header("x-use-cache", "false")
                .json(&json!({"inputs": prompt}))
                .timeout(Duration::from_secs(60))
                .send()
                .await?
        } else {
            response
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                "HF failed ({status}): {}",
                crate::utils::truncate_str(body, 100)
            );
            return Ok(None);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.contains("image") {
            warn!("HF returned non-image content type: {content_type}");
            return Ok(None);
        }

        Ok(Some(response.bytes().await?.to_vec()))
    }

    async fn try_pollinations(
        &self,
        prompt: &str,
        style: Option<&str>,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        let encoded = urlencoding::encode(prompt);
        let url = match style {
            Some(style) => {
                format!("https://image.pollinations.ai/prompt/{encoded}?model={style}")
            }
            None => format!("https://image.pollinations.ai/prompt/{encoded}"),
        };

        let response = self
            .http_client
            .get(&url)
            .header(reqwest::header::USER_AGENT, "Mozilla/5.0")
            .timeout(Duration::from_secs(15))
            .send()
            .await?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !content_type.contains("image") {
            return Ok(None);
        }

        Ok(Some(response.bytes().await?.to_vec()))
    }

    /// Last resort for auto mode: ask the LLM for a vivid description of
    /// what the image would have looked like.
    async fn describe_fallback(&self, prompt: &str, llm: &LlmClient) -> ImageOutcome {
        let request = format!("Create a detailed visual description for: {prompt}");

        match llm.chat_completion("", &[], &request, 200, 0.8).await {
            Ok(description) => ImageOutcome::Description {
                prompt: prompt.to_string(),
                description,
                suggestion: "Try a different prompt or simpler description.".to_string(),
            },
            Err(e) => {
                warn!("Description fallback unavailable: {e}");
                ImageOutcome::Description {
                    prompt: prompt.to_string(),
                    description:
                        "AI backend not configured. Set GROQ_API_KEY to enable detailed descriptions."
                            .to_string(),
                    suggestion: "Add GROQ_API_KEY to .env and restart the bot.".to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::llm::LlmClient;

    #[test]
    fn model_names_round_trip() {
        for model in [
            ImageModel::Auto,
            ImageModel::Flux,
            ImageModel::Pollinations,
            ImageModel::Creative,
        ] {
            assert_eq!(model.to_string().parse::<ImageModel>(), Ok(model));
        }
        assert!("dalle".parse::<ImageModel>().is_err());
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected() {
        let settings = Settings::default();
        let generator = ImageGenerator::new(&settings);
        let llm = LlmClient::new(&settings);

        let result = generator.generate("   ", ImageModel::Auto, &llm).await;
        assert!(matches!(result, Err(ImagingError::EmptyPrompt)));
    }

    #[tokio::test]
    async fn flux_is_skipped_without_key() {
        let settings = Settings::default();
        let generator = ImageGenerator::new(&settings);
        let skipped = generator
            .try_flux("a castle")
            .await
            .expect("no key means a clean skip, not an error");
        assert!(skipped.is_none());
    }
}

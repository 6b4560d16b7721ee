use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default system prompt sent with every chat completion unless the user
/// configured their own via `SYSTEM_MESSAGE`.
pub const SYSTEM_PROMPT: &str = "You are Artovix, an elite AI assistant.\n\n\
PERSONALITY:\n\
- Brilliant futurist AI\n\
- Empathetic and supportive\n\
- Creative problem solver\n\
- Multimodal expert\n\
- Ethical and responsible\n\n\
GUIDELINES:\n\
1. Be helpful, accurate, and concise\n\
2. Use appropriate emojis\n\
3. Admit when you don't know something\n\
4. Consider context from previous messages\n\
5. Think step-by-step for complex problems\n\n\
RESPONSE FORMAT:\n\
- Use Markdown for readability\n\
- Structure complex answers with bullet points\n\
- Keep responses clear and engaging";

/// Chat model used for text, search and code requests.
pub const CHAT_MODEL: &str = "llama-3.3-70b-versatile";
/// Speech-to-text model for voice messages.
pub const WHISPER_MODEL: &str = "whisper-large-v3";
/// Multimodal model for photo analysis.
pub const VISION_MODEL: &str = "llama-3.2-11b-vision-preview";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    /// Telegram bot token. Optional: without it the process runs degraded.
    pub bot_token: Option<String>,

    /// Groq API key, gates text/voice/vision features.
    pub groq_api_key: Option<String>,

    /// Hugging Face API key, gates FLUX image generation.
    pub hf_api_key: Option<String>,

    /// Overrides the built-in system prompt.
    pub system_message: Option<String>,

    /// Path of the conversation memory file.
    #[serde(default = "default_memory_file")]
    pub memory_file: String,
}

fn default_memory_file() -> String {
    "artovix_memory.json".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            // Environment variables win: BOT_TOKEN, GROQ_API_KEY, HF_API_KEY, ...
            .add_source(Environment::default())
            .build()?;

        s.try_deserialize()
    }

    pub fn system_prompt(&self) -> &str {
        self.system_message.as_deref().unwrap_or(SYSTEM_PROMPT)
    }
}

/// Feature gates evaluated once at startup from credential presence.
///
/// Handlers dispatch on these flags, never on the raw credentials. A
/// missing credential disables its feature set with a warning instead of
/// failing the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Telegram transport can be started.
    pub telegram: bool,
    /// Chat, transcription and vision requests can be served.
    pub llm: bool,
    /// FLUX image generation is available (public fallbacks work without it).
    pub image_generation: bool,
}

impl Capabilities {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            telegram: settings.bot_token.as_deref().is_some_and(|t| !t.is_empty()),
            llm: settings
                .groq_api_key
                .as_deref()
                .is_some_and(|k| !k.is_empty()),
            image_generation: settings.hf_api_key.as_deref().is_some_and(|k| !k.is_empty()),
        }
    }

    /// Emit one warning per missing credential, naming the variable that
    /// would enable the feature. Degraded mode is not an error.
    pub fn warn_degraded(&self) {
        if !self.telegram {
            warn!("BOT_TOKEN not set; Telegram transport disabled, running in degraded mode");
        }
        if !self.llm {
            warn!("GROQ_API_KEY not set; chat, voice and vision features disabled");
        }
        if !self.image_generation {
            warn!("HF_API_KEY not set; FLUX image generation disabled, public fallbacks only");
        }
    }

    pub fn fully_enabled(&self) -> bool {
        self.telegram && self.llm && self.image_generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(bot: Option<&str>, groq: Option<&str>, hf: Option<&str>) -> Settings {
        Settings {
            bot_token: bot.map(String::from),
            groq_api_key: groq.map(String::from),
            hf_api_key: hf.map(String::from),
            ..Settings::default()
        }
    }

    #[test]
    fn all_credentials_present() {
        let caps = Capabilities::from_settings(&settings(Some("t"), Some("g"), Some("h")));
        assert!(caps.fully_enabled());
    }

    #[test]
    fn missing_token_degrades_transport_only() {
        let caps = Capabilities::from_settings(&settings(None, Some("g"), Some("h")));
        assert!(!caps.telegram);
        assert!(caps.llm);
        assert!(caps.image_generation);
    }

    #[test]
    fn empty_string_counts_as_absent() {
        let caps = Capabilities::from_settings(&settings(Some(""), Some(""), None));
        assert!(!caps.telegram);
        assert!(!caps.llm);
        assert!(!caps.image_generation);
    }

    #[test]
    fn system_prompt_override() {
        let mut s = settings(None, None, None);
        assert_eq!(s.system_prompt(), SYSTEM_PROMPT);
        s.system_message = Some("be brief".to_string());
        assert_eq!(s.system_prompt(), "be brief");
    }
}

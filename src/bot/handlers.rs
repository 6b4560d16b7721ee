use crate::analytics::Analytics;
use crate::config::Settings;
use crate::imaging::{ImageGenerator, ImageModel, ImageOutcome, IMAGE_MODEL_SETTING};
use crate::llm::{LlmClient, LlmError};
use crate::memory::Memory;
use crate::utils;
use anyhow::Result;
use chrono::Local;
use std::sync::Arc;
use teloxide::{
    net::Download,
    prelude::*,
    types::{ChatAction, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode},
    utils::command::BotCommands,
};
use tracing::{error, info};

/// History entries (not exchanges) sent as chat context.
const HISTORY_WINDOW: usize = 4;
/// Telegram message length budget, below the hard 4096 limit.
const MAX_MESSAGE_LEN: usize = 4000;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    #[command(description = "welcome guide and features.")]
    Start,
    #[command(description = "command reference.")]
    Help,
    #[command(description = "bot health report.")]
    Status,
    #[command(description = "usage analytics dashboard.")]
    Stats,
    #[command(description = "clear conversation memory.")]
    Reset,
    #[command(description = "search information.")]
    Search(String),
    #[command(description = "analyze code or answer a programming question.")]
    Code(String),
    #[command(description = "generate an image with your preferred model.")]
    Draw(String),
    #[command(description = "high-quality image (FLUX.1-schnell).")]
    Flux(String),
    #[command(description = "fast and reliable image generation.")]
    Pollin(String),
    #[command(description = "creative and artistic image styles.")]
    Art(String),
    #[command(description = "smart image model selection.")]
    Auto(String),
}

fn user_id_of(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0 as i64)
}

fn start_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("💬 Chat Now", "start_chat"),
            InlineKeyboardButton::callback("🎨 Draw Image", "generate_image"),
        ],
        vec![
            InlineKeyboardButton::callback("💻 Code Help", "code_help"),
            InlineKeyboardButton::callback("🔍 Search", "ask_question"),
        ],
    ])
}

fn model_keyboard(selected: ImageModel) -> InlineKeyboardMarkup {
    let button = |model: ImageModel, label: &str| {
        let label = if model == selected {
            format!("✅ {label}")
        } else {
            label.to_string()
        };
        InlineKeyboardButton::callback(label, format!("set_model_{model}"))
    };

    InlineKeyboardMarkup::new(vec![
        vec![
            button(ImageModel::Auto, "Auto"),
            button(ImageModel::Flux, "Flux"),
        ],
        vec![
            button(ImageModel::Pollinations, "Pollinations"),
            button(ImageModel::Creative, "Creative"),
        ],
    ])
}

/// Send formatted HTML, split into Telegram-sized parts.
async fn send_formatted(bot: &Bot, chat_id: ChatId, text: &str) -> Result<()> {
    let formatted = utils::format_text(text);
    for part in utils::split_long_message(&formatted, MAX_MESSAGE_LEN) {
        bot.send_message(chat_id, part)
            .parse_mode(ParseMode::Html)
            .await?;
    }
    Ok(())
}

/// Last-ditch reply once a handler has already failed. Plain text with no
/// parse mode, so Telegram cannot reject it for markup.
pub const FALLBACK_REPLY: &str =
    "⚠️ Something went wrong while preparing the reply. Please try again.";

pub async fn send_fallback(bot: &Bot, chat_id: ChatId) {
    if let Err(e) = bot.send_message(chat_id, FALLBACK_REPLY).await {
        error!("Fallback reply failed as well: {e}");
    }
}

/// The degraded-mode reply for a missing API key, or a generic error line.
fn llm_error_reply(e: &LlmError, feature: &str) -> String {
    match e {
        LlmError::MissingConfig(key) => format!(
            "🔌 <b>AI backend not configured.</b>\nSet <code>{key}</code> in your .env to enable {feature}."
        ),
        other => format!("🤖 <b>Request failed:</b> {other}\nPlease try again in a moment."),
    }
}

pub async fn start(bot: Bot, msg: Message, memory: Arc<Memory>) -> Result<()> {
    let user_id = user_id_of(&msg);
    let model = preferred_model(&memory, user_id).await;

    let welcome = format!(
        "🌟 <b>Welcome to Artovix!</b> 🌟\n\n\
        I'm your AI assistant powered by Llama 3.3 70B.\n\n\
        🎯 <b>Quick start:</b>\n\
        1. 💬 Chat - just type your message\n\
        2. 🎨 AI images - /draw, /flux, /pollin or /art\n\
        3. 🎙️ Voice - send a voice message\n\
        4. 🖼️ Vision - send a photo to analyze\n\
        5. 🔍 Search - /search [question]\n\n\
        Current image model: <b>{model}</b>\n\n\
        Type /help for the full command list. Ready to begin? 🚀"
    );

    bot.send_message(msg.chat.id, welcome)
        .parse_mode(ParseMode::Html)
        .reply_markup(start_keyboard())
        .await?;
    info!("Start command from user {user_id}");
    Ok(())
}

pub async fn help(bot: Bot, msg: Message) -> Result<()> {
    let help_text = format!(
        "🔧 <b>Artovix Command Reference</b>\n\n{}\n\n\
        <b>Tips:</b>\n\
        • Be descriptive for better images\n\
        • Use /draw without a prompt to change your default model\n\
        • Send photos to analyze them (vision)\n\
        • Send voice messages to transcribe them (Whisper)\n\n\
        Need more help? Just chat with me normally! 😊",
        html_escape::encode_text(&Command::descriptions().to_string())
    );

    bot.send_message(msg.chat.id, help_text)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

pub async fn status(
    bot: Bot,
    msg: Message,
    memory: Arc<Memory>,
    llm: Arc<LlmClient>,
) -> Result<()> {
    let ai_state = if llm.is_configured() {
        "✅ Online"
    } else {
        "⚠️ Degraded (no API key)"
    };
    let status_text = format!(
        "✅ <b>Artovix Status Report</b>\n\n\
        <b>Core systems:</b>\n\
        • 🤖 AI engine: {ai_state}\n\
        • 🧠 Memory: ✅ {} active\n\
        • 🎨 Image gen: ✅ multiple services\n\
        • 🎙️ Voice/vision: {ai_state}\n\n\
        <b>Server info:</b>\n\
        • Time: {}\n\
        • Version: {}\n\n\
        Ready to assist! 🚀",
        memory.active_users().await,
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        env!("CARGO_PKG_VERSION"),
    );

    bot.send_message(msg.chat.id, status_text)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

pub async fn stats(
    bot: Bot,
    msg: Message,
    memory: Arc<Memory>,
    analytics: Arc<Analytics>,
) -> Result<()> {
    let metrics = analytics.current_metrics();

    let mut breakdown: Vec<_> = metrics.breakdown.iter().collect();
    breakdown.sort_by(|a, b| b.1.cmp(a.1));
    let breakdown_text = if breakdown.is_empty() {
        "• No requests today yet.".to_string()
    } else {
        breakdown
            .iter()
            .map(|(kind, count)| format!("• {}: {count}", kind.replace('_', " ")))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let stats_text = format!(
        "📊 <b>Artovix Analytics Dashboard</b>\n\n\
        <b>Live metrics:</b>\n\
        • RPM: {} requests/minute\n\
        • TPM: {} tokens/minute\n\
        • RPD: {} total requests today\n\n\
        <b>Usage breakdown:</b>\n{breakdown_text}\n\n\
        <b>System:</b>\n\
        • 💬 Active users: {}\n\
        • 🕐 Server time: {}\n\n\
        All systems operational! 🚀",
        metrics.rpm,
        metrics.tpm,
        metrics.rpd,
        memory.active_users().await,
        Local::now().format("%H:%M:%S"),
    );

    bot.send_message(msg.chat.id, stats_text)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

pub async fn reset(bot: Bot, msg: Message, memory: Arc<Memory>) -> Result<()> {
    memory.clear_history(user_id_of(&msg)).await?;
    bot.send_message(
        msg.chat.id,
        "🧹 <b>Memory cleared!</b>\n\nOur conversation history has been reset.\n\
         Ready for a fresh start! 👋",
    )
    .parse_mode(ParseMode::Html)
    .await?;
    Ok(())
}

pub async fn search(
    bot: Bot,
    msg: Message,
    llm: Arc<LlmClient>,
    analytics: Arc<Analytics>,
    query: String,
) -> Result<()> {
    let query = query.trim();
    if query.is_empty() {
        bot.send_message(
            msg.chat.id,
            "🔍 <b>Web Search</b>\n\n<b>Usage:</b> /search [your question]\n\n\
             <b>Example:</b> /search latest AI developments",
        )
        .parse_mode(ParseMode::Html)
        .await?;
        return Ok(());
    }

    bot.send_chat_action(msg.chat.id, ChatAction::Typing).await?;

    let search_prompt = format!(
        "Search query: {query}\n\n\
        As a knowledge specialist, provide a comprehensive answer for the query above.\n\n\
        Structure your response as follows:\n\
        🌐 [Topic Overview]\n\
        📌 [Key Facts & Developments]\n\
        🛠️ [Practical Insights]\n\
        💡 [Expert Tip]\n\n\
        Keep it professional, accurate, and formatted for a mobile chat interface."
    );

    match llm.chat_completion("", &[], &search_prompt, 500, 0.7).await {
        Ok(answer) => {
            send_formatted(
                &bot,
                msg.chat.id,
                &format!("🔍 *Search results:* {query}\n\n{answer}"),
            )
            .await?;
            analytics.log_request(user_id_of(&msg), query.split_whitespace().count() as i64 * 30, "search");
        }
        Err(e) => {
            bot.send_message(msg.chat.id, llm_error_reply(&e, "search features"))
                .parse_mode(ParseMode::Html)
                .await?;
        }
    }
    Ok(())
}

pub async fn code(
    bot: Bot,
    msg: Message,
    llm: Arc<LlmClient>,
    analytics: Arc<Analytics>,
    input: String,
) -> Result<()> {
    let input = input.trim();
    if input.is_empty() {
        bot.send_message(
            msg.chat.id,
            "💻 <b>Code Assistant</b>\n\n\
             1. Ask a question: /code how to reverse a string in Rust?\n\
             2. Send code in ``` blocks for analysis",
        )
        .parse_mode(ParseMode::Html)
        .await?;
        return Ok(());
    }

    bot.send_chat_action(msg.chat.id, ChatAction::Typing).await?;

    let code_prompt = if input.contains("```") {
        format!(
            "Analyze this code and provide:\n\n1. What it does\n2. Any issues or bugs\n\
             3. Improvements\n4. Best practices\n\nCode:\n{input}"
        )
    } else {
        format!(
            "Answer this programming question: {input}\n\nProvide:\n1. Clear explanation\n\
             2. Code examples if applicable\n3. Best practices\n4. Common pitfalls to avoid"
        )
    };

    match llm.chat_completion("", &[], &code_prompt, 600, 0.3).await {
        Ok(analysis) => {
            send_formatted(&bot, msg.chat.id, &format!("💻 *Code analysis:*\n\n{analysis}"))
                .await?;
            analytics.log_request(
                user_id_of(&msg),
                input.split_whitespace().count() as i64,
                "code_analysis",
            );
        }
        Err(e) => {
            bot.send_message(msg.chat.id, llm_error_reply(&e, "code analysis"))
                .parse_mode(ParseMode::Html)
                .await?;
        }
    }
    Ok(())
}

async fn preferred_model(memory: &Memory, user_id: i64) -> ImageModel {
    memory
        .get_setting(user_id, IMAGE_MODEL_SETTING)
        .await
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

/// Shared flow behind /draw, /flux, /pollin, /art and /auto.
pub async fn generate_image(
    bot: Bot,
    msg: Message,
    memory: Arc<Memory>,
    llm: Arc<LlmClient>,
    imaging: Arc<ImageGenerator>,
    analytics: Arc<Analytics>,
    prompt: String,
    forced_model: Option<ImageModel>,
) -> Result<()> {
    let user_id = user_id_of(&msg);
    let prompt = prompt.trim().to_string();

    if prompt.is_empty() {
        let current = preferred_model(&memory, user_id).await;
        let help_text = format!(
            "🎨 <b>AI Image Generator</b>\n\n\
            <b>Usage:</b> /draw [description]\n\n\
            <b>Example:</b> /draw a majestic dragon flying over mountains at sunset\n\n\
            Current default model: <b>{current}</b>. Pick another below:"
        );
        bot.send_message(msg.chat.id, help_text)
            .parse_mode(ParseMode::Html)
            .reply_markup(model_keyboard(current))
            .await?;
        return Ok(());
    }

    let model = match forced_model {
        Some(model) => model,
        None => preferred_model(&memory, user_id).await,
    };

    let progress = bot
        .send_message(
            msg.chat.id,
            format!(
                "🎨 <b>Creating with {}:</b> \"{}\"\n⏳ Generating image... (10-30 seconds)",
                model.to_string().to_uppercase(),
                html_escape::encode_text(&utils::truncate_str(&prompt, 60)),
            ),
        )
        .parse_mode(ParseMode::Html)
        .await?;

    let result = imaging.generate(&prompt, model, &llm).await;

    // The progress message is noise once there is a result.
    let _ = bot.delete_message(msg.chat.id, progress.id).await;

    match result {
        Ok(ImageOutcome::Image(bytes)) => {
            bot.send_photo(msg.chat.id, InputFile::memory(bytes))
                .caption(format!(
                    "🎨 AI generated ({}): {}\n\n✨ Powered by Artovix | {}",
                    model.to_string().to_uppercase(),
                    utils::truncate_str(&prompt, 200),
                    Local::now().format("%H:%M"),
                ))
                .await?;
            info!("Image sent to {user_id}");
        }
        Ok(ImageOutcome::Description {
            prompt,
            description,
            suggestion,
        }) => {
            send_formatted(
                &bot,
                msg.chat.id,
                &format!(
                    "🎨 *AI image concept:* {prompt}\n\n🎨✨ *Visual description:*\n\
                     {description}\n\n💡 *Pro tip:* {suggestion}"
                ),
            )
            .await?;
        }
        Err(e) => {
            info!("Image generation failed for {user_id}: {e}");
            bot.send_message(
                msg.chat.id,
                "❌ Generation failed. Try a more specific prompt, e.g. add colors, \
                 lighting or a style like `digital art`.",
            )
            .await?;
        }
    }

    analytics.log_request(
        user_id,
        prompt.split_whitespace().count() as i64,
        &format!("image_gen_{model}"),
    );
    Ok(())
}

/// Plain chat messages: system prompt + history window + user text.
pub async fn handle_text(
    bot: Bot,
    msg: Message,
    settings: Arc<Settings>,
    memory: Arc<Memory>,
    llm: Arc<LlmClient>,
    analytics: Arc<Analytics>,
) -> Result<()> {
    let Some(text) = msg.text().map(ToString::to_string) else {
        return Ok(());
    };
    process_chat_message(&bot, &msg, &settings, &memory, &llm, &analytics, text).await
}

async fn process_chat_message(
    bot: &Bot,
    msg: &Message,
    settings: &Settings,
    memory: &Memory,
    llm: &LlmClient,
    analytics: &Analytics,
    text: String,
) -> Result<()> {
    let user_id = user_id_of(msg);
    info!("Message from {user_id}: {}", utils::truncate_str(&text, 50));

    bot.send_chat_action(msg.chat.id, ChatAction::Typing).await?;

    let history = memory.user_history(user_id, HISTORY_WINDOW).await;

    match llm
        .chat_completion(settings.system_prompt(), &history, &text, 400, 0.7)
        .await
    {
        Ok(reply) => {
            memory.append_exchange(user_id, &text, &reply).await?;
            send_formatted(bot, msg.chat.id, &reply).await?;

            let tokens =
                (text.split_whitespace().count() + reply.split_whitespace().count()) as i64;
            analytics.log_request(user_id, tokens, "chat");
        }
        Err(e) => {
            error!("Chat API error: {e}");
            bot.send_message(msg.chat.id, llm_error_reply(&e, "chat responses"))
                .parse_mode(ParseMode::Html)
                .await?;
        }
    }
    Ok(())
}

pub async fn handle_voice(
    bot: Bot,
    msg: Message,
    settings: Arc<Settings>,
    memory: Arc<Memory>,
    llm: Arc<LlmClient>,
    analytics: Arc<Analytics>,
) -> Result<()> {
    let Some(voice) = msg.voice() else {
        return Ok(());
    };

    bot.send_chat_action(msg.chat.id, ChatAction::UploadDocument)
        .await?;

    let file = bot.get_file(voice.file.id.clone()).await?;
    let mut buffer = Vec::new();
    bot.download_file(&file.path, &mut buffer).await?;

    match llm.transcribe_audio(buffer, "voice.ogg").await {
        Ok(transcription) if !transcription.trim().is_empty() => {
            bot.send_message(
                msg.chat.id,
                format!(
                    "🎤 <b>Transcribed:</b> \"{}\"",
                    html_escape::encode_text(&transcription)
                ),
            )
            .parse_mode(ParseMode::Html)
            .await?;
            analytics.log_request(user_id_of(&msg), 0, "voice_transcription");
            process_chat_message(&bot, &msg, &settings, &memory, &llm, &analytics, transcription)
                .await?;
        }
        Ok(_) => {
            bot.send_message(
                msg.chat.id,
                "🎤 <b>I couldn't hear you clearly.</b>\nCould you please try again?",
            )
            .parse_mode(ParseMode::Html)
            .await?;
        }
        Err(e) => {
            error!("Voice handling error: {e}");
            bot.send_message(msg.chat.id, llm_error_reply(&e, "voice transcription"))
                .parse_mode(ParseMode::Html)
                .await?;
        }
    }
    Ok(())
}

pub async fn handle_photo(
    bot: Bot,
    msg: Message,
    memory: Arc<Memory>,
    llm: Arc<LlmClient>,
    analytics: Arc<Analytics>,
) -> Result<()> {
    // Telegram sends several sizes; the last one is the largest.
    let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) else {
        return Ok(());
    };
    let prompt = msg
        .caption()
        .unwrap_or("Describe this image in detail and tell me what you see.")
        .to_string();

    bot.send_chat_action(msg.chat.id, ChatAction::Typing).await?;

    let file = bot.get_file(photo.file.id.clone()).await?;
    let mut buffer = Vec::new();
    bot.download_file(&file.path, &mut buffer).await?;

    match llm.analyze_image(buffer, &prompt).await {
        Ok(analysis) => {
            let user_id = user_id_of(&msg);
            memory
                .append_exchange(user_id, &format!("[Image] {prompt}"), &analysis)
                .await?;
            send_formatted(&bot, msg.chat.id, &format!("🖼️ *Image analysis:*\n\n{analysis}"))
                .await?;
            analytics.log_request(user_id, 500, "vision_analysis");
        }
        Err(e) => {
            error!("Vision handling error: {e}");
            bot.send_message(msg.chat.id, llm_error_reply(&e, "vision features"))
                .parse_mode(ParseMode::Html)
                .await?;
        }
    }
    Ok(())
}

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    memory: Arc<Memory>,
) -> Result<()> {
    let Some(data) = q.data.clone() else {
        return Ok(());
    };

    let _ = bot.answer_callback_query(q.id.clone()).await;

    let Some(chat_id) = q.message.as_ref().map(|m| m.chat().id) else {
        return Ok(());
    };

    if let Some(model_name) = data.strip_prefix("set_model_") {
        let Ok(model) = model_name.parse::<ImageModel>() else {
            return Ok(());
        };
        let user_id = q.from.id.0 as i64;
        memory
            .update_setting(user_id, IMAGE_MODEL_SETTING, &model.to_string())
            .await?;

        if let Some(message) = q.message.as_ref() {
            let _ = bot
                .edit_message_text(
                    chat_id,
                    message.id(),
                    format!(
                        "✅ Model set to <b>{}</b>\n\nNow use /draw [prompt] to generate images!",
                        model.to_string().to_uppercase()
                    ),
                )
                .parse_mode(ParseMode::Html)
                .reply_markup(model_keyboard(model))
                .await;
        }
        return Ok(());
    }

    let reply = match data.as_str() {
        "start_chat" => {
            "💬 <b>Chat activated!</b>\n\nJust type your message and I'll respond!\n\n\
             <b>Try asking:</b>\n• What can you do?\n• Tell me about AI\n• Help me with a problem"
        }
        "generate_image" => {
            "🎨 <b>Image Generator</b>\n\n<b>Usage:</b> /draw [description]\n\n\
             <b>Quick examples:</b>\n• /draw sunset over mountains\n\
             • /draw cute robot in a futuristic city\n\nBe creative! 🎨"
        }
        "code_help" => {
            "💻 <b>Code Assistant</b>\n\n<b>Two ways to use:</b>\n\
             1. Ask: /code how to [do something]\n\
             2. Send code in ``` blocks\n\nI can help with most languages."
        }
        "ask_question" => {
            "🔍 <b>Knowledge Search</b>\n\n<b>Usage:</b> /search [your question]\n\n\
             <b>Examples:</b>\n• /search latest space discoveries\n\
             • /search best programming practices\n\nAsk me anything! 🌟"
        }
        _ => return Ok(()),
    };

    bot.send_message(chat_id, reply)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_reply_is_sendable_as_plain_text() {
        // Must survive a send with no parse mode and fit in one message.
        assert!(!FALLBACK_REPLY.contains('<'));
        assert!(!FALLBACK_REPLY.contains('>'));
        assert!(FALLBACK_REPLY.len() < MAX_MESSAGE_LEN);
    }
}

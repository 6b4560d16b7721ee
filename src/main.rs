use anyhow::Result;
use artovix_bot::analytics::Analytics;
use artovix_bot::bot::handlers::{self, Command};
use artovix_bot::config::{Capabilities, Settings};
use artovix_bot::imaging::{ImageGenerator, ImageModel};
use artovix_bot::llm::LlmClient;
use artovix_bot::memory::Memory;
use dotenvy::dotenv;
use lazy_static::lazy_static;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

lazy_static! {
    static ref RE_TG_TOKEN: Regex =
        Regex::new(r"[0-9]{8,10}:[A-Za-z0-9_-]{35}").expect("static regex");
    static ref RE_TG_URL_TOKEN: Regex =
        Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+").expect("static regex");
    static ref RE_GROQ_KEY: Regex = Regex::new(r"gsk_[A-Za-z0-9]+").expect("static regex");
    static ref RE_HF_KEY: Regex = Regex::new(r"hf_[A-Za-z0-9]+").expect("static regex");
}

fn redact(input: &str) -> String {
    let mut output = RE_TG_URL_TOKEN
        .replace_all(input, "$1[TELEGRAM_TOKEN]")
        .to_string();
    output = RE_TG_TOKEN.replace_all(&output, "[TELEGRAM_TOKEN]").to_string();
    output = RE_GROQ_KEY.replace_all(&output, "[GROQ_API_KEY]").to_string();
    output = RE_HF_KEY.replace_all(&output, "[HF_API_KEY]").to_string();
    output
}

struct RedactingWriter<W: Write> {
    inner: W,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        self.inner.write_all(redact(&s).as_bytes())?;
        // Report the original length even when redaction changed it.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: (self.make_inner)(),
        }
    }
}

fn init_logging() {
    let make_writer = RedactingMakeWriter {
        make_inner: io::stderr,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_logging();

    info!("Starting Artovix bot...");

    let settings = match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // Missing credentials degrade features, they never abort startup.
    let capabilities = Capabilities::from_settings(&settings);
    capabilities.warn_degraded();

    let memory = Arc::new(Memory::new(&settings.memory_file));
    let llm = Arc::new(LlmClient::new(&settings));
    let imaging = Arc::new(ImageGenerator::new(&settings));
    let analytics = match Analytics::open("analytics.db") {
        Ok(a) => Arc::new(a),
        Err(e) => {
            warn!("Analytics database unavailable ({e}), falling back to in-memory metrics");
            Arc::new(Analytics::open_in_memory()?)
        }
    };

    info!(
        "Memory: {} active conversations",
        memory.active_users().await
    );

    if !capabilities.telegram {
        // Degraded-mode contract: keep running so the supervisor sees a
        // healthy long-lived process, serve nothing.
        info!("No Telegram transport; idling in degraded mode until terminated.");
        tokio::signal::ctrl_c().await?;
        return Ok(());
    }

    let token = settings.bot_token.clone().unwrap_or_default();
    let bot = Bot::new(token);

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(
            |bot: Bot, q: CallbackQuery, memory: Arc<Memory>| async move {
                let chat_id = q.message.as_ref().map(|m| m.chat().id);
                let fallback = bot.clone();
                if let Err(e) = handlers::handle_callback(bot, q, memory).await {
                    error!("Callback handler error: {e}");
                    if let Some(chat_id) = chat_id {
                        handlers::send_fallback(&fallback, chat_id).await;
                    }
                }
                respond(())
            },
        ))
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry().filter_command::<Command>().endpoint(
                        |bot: Bot,
                         msg: Message,
                         cmd: Command,
                         memory: Arc<Memory>,
                         llm: Arc<LlmClient>,
                         imaging: Arc<ImageGenerator>,
                         analytics: Arc<Analytics>| async move {
                            let chat_id = msg.chat.id;
                            let fallback = bot.clone();
                            let res = match cmd {
                                Command::Start => handlers::start(bot, msg, memory).await,
                                Command::Help => handlers::help(bot, msg).await,
                                Command::Status => {
                                    handlers::status(bot, msg, memory, llm).await
                                }
                                Command::Stats => {
                                    handlers::stats(bot, msg, memory, analytics).await
                                }
                                Command::Reset => handlers::reset(bot, msg, memory).await,
                                Command::Search(query) => {
                                    handlers::search(bot, msg, llm, analytics, query).await
                                }
                                Command::Code(input) => {
                                    handlers::code(bot, msg, llm, analytics, input).await
                                }
                                Command::Draw(prompt) => {
                                    handlers::generate_image(
                                        bot, msg, memory, llm, imaging, analytics, prompt, None,
                                    )
                                    .await
                                }
                                Command::Flux(prompt) => {
                                    handlers::generate_image(
                                        bot,
                                        msg,
                                        memory,
                                        llm,
                                        imaging,
                                        analytics,
                                        prompt,
                                        Some(ImageModel::Flux),
                                    )
                                    .await
                                }
                                Command::Pollin(prompt) => {
                                    handlers::generate_image(
                                        bot,
                                        msg,
                                        memory,
                                        llm,
                                        imaging,
                                        analytics,
                                        prompt,
                                        Some(ImageModel::Pollinations),
                                    )
                                    .await
                                }
                                Command::Art(prompt) => {
                                    handlers::generate_image(
                                        bot,
                                        msg,
                                        memory,
                                        llm,
                                        imaging,
                                        analytics,
                                        prompt,
                                        Some(ImageModel::Creative),
                                    )
                                    .await
                                }
                                Command::Auto(prompt) => {
                                    handlers::generate_image(
                                        bot,
                                        msg,
                                        memory,
                                        llm,
                                        imaging,
                                        analytics,
                                        prompt,
                                        Some(ImageModel::Auto),
                                    )
                                    .await
                                }
                            };
                            if let Err(e) = res {
                                error!("Command error: {e}");
                                handlers::send_fallback(&fallback, chat_id).await;
                            }
                            respond(())
                        },
                    ),
                )
                .branch(
                    Update::filter_message()
                        .filter(|msg: Message| msg.voice().is_some())
                        .endpoint(
                            |bot: Bot,
                             msg: Message,
                             settings: Arc<Settings>,
                             memory: Arc<Memory>,
                             llm: Arc<LlmClient>,
                             analytics: Arc<Analytics>| async move {
                                let chat_id = msg.chat.id;
                                let fallback = bot.clone();
                                if let Err(e) = handlers::handle_voice(
                                    bot, msg, settings, memory, llm, analytics,
                                )
                                .await
                                {
                                    error!("Voice handler error: {e}");
                                    handlers::send_fallback(&fallback, chat_id).await;
                                }
                                respond(())
                            },
                        ),
                )
                .branch(
                    Update::filter_message()
                        .filter(|msg: Message| msg.photo().is_some())
                        .endpoint(
                            |bot: Bot,
                             msg: Message,
                             memory: Arc<Memory>,
                             llm: Arc<LlmClient>,
                             analytics: Arc<Analytics>| async move {
                                let chat_id = msg.chat.id;
                                let fallback = bot.clone();
                                if let Err(e) =
                                    handlers::handle_photo(bot, msg, memory, llm, analytics).await
                                {
                                    error!("Photo handler error: {e}");
                                    handlers::send_fallback(&fallback, chat_id).await;
                                }
                                respond(())
                            },
                        ),
                )
                .branch(
                    Update::filter_message()
                        .filter(|msg: Message| msg.text().is_some())
                        .endpoint(
                            |bot: Bot,
                             msg: Message,
                             settings: Arc<Settings>,
                             memory: Arc<Memory>,
                             llm: Arc<LlmClient>,
                             analytics: Arc<Analytics>| async move {
                                let chat_id = msg.chat.id;
                                let fallback = bot.clone();
                                if let Err(e) = handlers::handle_text(
                                    bot, msg, settings, memory, llm, analytics,
                                )
                                .await
                                {
                                    error!("Text handler error: {e}");
                                    handlers::send_fallback(&fallback, chat_id).await;
                                }
                                respond(())
                            },
                        ),
                ),
        );

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![settings, memory, llm, imaging, analytics])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

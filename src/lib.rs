//! Artovix - Telegram AI assistant
//!
//! A Telegram bot that forwards chat, voice and photo messages to hosted
//! AI services and relays the answers back, plus a small supervisor that
//! keeps the bot process alive across crashes.

/// Usage metrics (SQLite)
pub mod analytics;
/// Telegram bot implementation
pub mod bot;
/// Configuration and startup capability gating
pub mod config;
/// AI image generation services
pub mod imaging;
/// LLM provider and client
pub mod llm;
/// Per-user conversation memory (JSON file)
pub mod memory;
/// Crash-restart supervisor for the bot process
pub mod supervisor;
pub mod utils;

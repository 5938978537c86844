//! Telegram command surface for kudo.

pub mod commands;
pub mod format;
pub mod verification;

pub use commands::{BotContext, handle_text_message};

//! Telegram adapter for the bridge.
//!
//! Long polling turns Bot API updates into [`mqtg_bridge::ChatEvent`]s and
//! [`TelegramPlatform`] implements the outbound side.

pub mod bot;
pub mod convert;
pub mod error;
pub mod outbound;

pub use {
    bot::{build_bot, start_polling},
    error::{Error, Result},
    outbound::TelegramPlatform,
};

//! Discord bot integration.
//!
//! This module provides the Discord side of the bridge: the gateway client,
//! message intake, delivery handles and content translation.

pub mod channel;
pub mod client;
pub mod directory;
pub mod handler;
pub mod translator;

// Re-export main types for external use
pub use channel::{DiscordChannel, DiscordChannelProvider, SerenityChannelProvider};
pub use client::DiscordBot;
pub use translator::ContentTranslator;

//! Common utilities and types shared across the application.

pub mod command;
pub mod directory;
pub mod error;
pub mod messages;
pub mod reconnect;
pub mod types;

pub use messages::{
    BroadcastRequest, ChatMessage, CommandRequest, DiscordMessage, OutboundChatRequest,
};
pub use types::{ChannelKind, GuildLinkConfig, PlayerRef};

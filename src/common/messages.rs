//! Canonical message types for bridge communication.
//!
//! This module defines the single source of truth for message types
//! flowing between Minecraft and Discord.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::common::types::{PlayerRef, GUILD_CHAT_PREFIX, OFFICER_CHAT_PREFIX, PARTY_CHAT_PREFIX};

/// In-game chat channel a line was received on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Guild,
    Officer,
    Party,
    Whisper,
}

/// Direction of a whisper line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhisperDirection {
    /// `From ign: ...` - someone whispered the bot.
    Incoming,
    /// `To ign: ...` - echo of the bot's own whisper.
    Outgoing,
}

/// Author of a player chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub ign: String,
    /// Hypixel rank tag, e.g. "MVP+".
    pub hypixel_rank: Option<String>,
    /// Guild rank, only present on guild/officer lines.
    pub guild_rank: Option<String>,
    /// Resolved directory entry, if known.
    pub player: Option<PlayerRef>,
}

/// A parsed chat line. Immutable once created.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// Text as received, including invisible characters and formatting codes.
    pub raw_text: String,
    /// Text with invisible characters and formatting codes stripped.
    pub cleaned_text: String,
    pub message_type: Option<MessageType>,
    pub author: Option<Author>,
    /// Cleaned message body with the channel/author prefix removed.
    pub content: String,
    pub is_from_self: bool,
    pub is_spam: bool,
    pub is_blocked: bool,
    pub whisper_direction: Option<WhisperDirection>,
    pub received_at: DateTime<Utc>,
}

impl ChatMessage {
    /// A server/system line with no author.
    pub fn is_system(&self) -> bool {
        self.message_type.is_none()
    }

    /// IGN of the author, if any.
    pub fn author_ign(&self) -> Option<&str> {
        self.author.as_ref().map(|a| a.ign.as_str())
    }
}

/// Message class used to pick the response safety delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    Guild,
    Officer,
    Party,
    Whisper,
    /// Any other chat prefix. Padded like channel chat.
    Chat,
    /// A bare command. Sent verbatim.
    Command,
}

impl MessageClass {
    /// Class implied by a chat prefix.
    pub fn from_prefix(prefix: &str) -> Self {
        match prefix.to_lowercase().as_str() {
            GUILD_CHAT_PREFIX => Self::Guild,
            OFFICER_CHAT_PREFIX => Self::Officer,
            PARTY_CHAT_PREFIX => Self::Party,
            p if p.starts_with("/w ") || p.starts_with("/msg ") => Self::Whisper,
            _ => Self::Chat,
        }
    }
}

/// Discord message that originated an outbound send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscordOrigin {
    pub channel_id: u64,
    pub message_id: u64,
    pub author_id: u64,
}

/// A send request for the Minecraft side.
#[derive(Debug, Clone)]
pub struct OutboundChatRequest {
    pub content: String,
    /// Chat command prefix, e.g. "/gc ". Counted against the line budget.
    pub prefix: String,
    /// Maximum number of lines the content may be split into.
    pub max_parts: usize,
    pub origin: Option<DiscordOrigin>,
    pub class: MessageClass,
}

impl OutboundChatRequest {
    pub fn new(prefix: impl Into<String>, content: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let class = MessageClass::from_prefix(&prefix);
        Self {
            content: content.into(),
            prefix,
            max_parts: 1,
            origin: None,
            class,
        }
    }

    /// A slash command sent without padding, e.g. `command("g online")`.
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            content: command.into(),
            prefix: "/".to_string(),
            max_parts: 1,
            origin: None,
            class: MessageClass::Command,
        }
    }

    pub fn with_max_parts(mut self, max_parts: usize) -> Self {
        self.max_parts = max_parts;
        self
    }

    pub fn with_origin(mut self, origin: DiscordOrigin) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// A content broadcast to one or both sides.
#[derive(Debug, Clone)]
pub struct BroadcastRequest {
    pub content: String,
    pub discord: bool,
    pub minecraft: bool,
}

impl BroadcastRequest {
    pub fn everywhere(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            discord: true,
            minecraft: true,
        }
    }
}

/// An in-game command whose reply lines should be collected.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Command without the leading slash, e.g. "g online".
    pub command: String,
    /// Pattern a system line must match to count as a reply.
    pub response_pattern: Option<String>,
    /// Stop after this many reply lines. `None` collects until the timeout.
    pub max: Option<usize>,
    pub timeout: Duration,
    /// Fail with a timeout error instead of returning what was collected.
    pub reject_on_timeout: bool,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            response_pattern: None,
            max: None,
            timeout: Duration::from_secs(5),
            reject_on_timeout: false,
        }
    }

    pub fn with_response_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.response_pattern = Some(pattern.into());
        self
    }

    pub fn with_max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn rejecting_on_timeout(mut self) -> Self {
        self.reject_on_timeout = true;
        self
    }
}

/// Message from Discord to be relayed in game.
#[derive(Debug, Clone)]
pub struct DiscordMessage {
    pub channel_id: u64,
    pub message_id: u64,
    pub author_id: u64,
    /// Sender's display name.
    pub author_name: String,
    /// Content already translated for Minecraft.
    pub content: String,
}

impl DiscordMessage {
    pub fn origin(&self) -> DiscordOrigin {
        DiscordOrigin {
            channel_id: self.channel_id,
            message_id: self.message_id,
            author_id: self.author_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_class_from_prefix() {
        assert_eq!(MessageClass::from_prefix("/gc "), MessageClass::Guild);
        assert_eq!(MessageClass::from_prefix("/OC "), MessageClass::Officer);
        assert_eq!(MessageClass::from_prefix("/pc "), MessageClass::Party);
        assert_eq!(MessageClass::from_prefix("/w Steve "), MessageClass::Whisper);
        assert_eq!(MessageClass::from_prefix("/ac "), MessageClass::Chat);
        assert_eq!(MessageClass::from_prefix(""), MessageClass::Chat);
        assert_eq!(MessageClass::from_prefix("/"), MessageClass::Chat);
    }

    #[test]
    fn test_only_explicit_commands_skip_padding() {
        let req = OutboundChatRequest::new("", "hello");
        assert_eq!(req.class, MessageClass::Chat);

        let req = OutboundChatRequest::command("g online");
        assert_eq!(req.class, MessageClass::Command);
        assert_eq!(req.prefix, "/");
        assert_eq!(req.content, "g online");
    }

    #[test]
    fn test_request_defaults() {
        let req = OutboundChatRequest::new("/gc ", "hello");
        assert_eq!(req.max_parts, 1);
        assert_eq!(req.class, MessageClass::Guild);
        assert!(req.origin.is_none());
    }
}

//! Chat line parsing.
//!
//! Turns the text of a chat packet into a structured [`ChatMessage`].
//! Player lines follow the fixed Hypixel shapes:
//!
//! - `Guild > [MVP+] Steve [Member]: hello`
//! - `Officer > Steve [Officer]: hello`
//! - `Party > [VIP] Steve: hello`
//! - `From [MVP+] Steve: hello` / `To [MVP+] Steve: hello`
//!
//! Everything else is server/system text.

use std::sync::Arc;

use chrono::Utc;
use fancy_regex::Regex;
use tracing::warn;

use crate::common::directory::PlayerDirectory;
use crate::common::messages::{Author, ChatMessage, MessageType, WhisperDirection};
use crate::game::invisible::strip_invisible;

/// Replies the server sends when a line is rejected as spam.
pub const SPAM_REPLIES: [&str; 3] = [
    "You cannot say the same message twice!",
    "You can only send a message once every half second!",
    "You are sending commands too fast! Please slow down.",
];

/// Start of the reply sent when a line is blocked by the content filter.
pub const BLOCKED_REPLY_PREFIX: &str = "We blocked your comment";

const LINE_PATTERN: &str = r"^(?:(?P<channel>Guild|Officer|Party) > |(?P<whisper>From|To) )(?:\[(?P<hrank>[^\]]+)\] )?(?P<ign>\w{1,16})(?: \[(?P<grank>[^\]]+)\])?: (?P<content>.*)$";

/// Remove `§x` formatting codes.
pub fn strip_formatting(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '§' {
            // Drop the code character too.
            chars.next();
        } else {
            result.push(c);
        }
    }
    result
}

/// Strip both invisible characters and formatting codes.
pub fn clean_line(text: &str) -> String {
    strip_formatting(&strip_invisible(text)).trim().to_string()
}

/// Parses chat lines for one bot account.
pub struct ChatLineParser {
    bot_ign: String,
    directory: Arc<dyn PlayerDirectory>,
    pattern: Regex,
}

impl ChatLineParser {
    pub fn new(bot_ign: impl Into<String>, directory: Arc<dyn PlayerDirectory>) -> Self {
        Self {
            bot_ign: bot_ign.into(),
            directory,
            // The pattern is a constant; failing to compile it is a bug.
            pattern: Regex::new(LINE_PATTERN).expect("chat line pattern compiles"),
        }
    }

    pub fn bot_ign(&self) -> &str {
        &self.bot_ign
    }

    /// Parse one chat line.
    pub fn parse(&self, raw: &str) -> ChatMessage {
        let cleaned = clean_line(raw);

        let captures = match self.pattern.captures(&cleaned) {
            Ok(captures) => captures,
            Err(e) => {
                warn!("Chat pattern match error on '{}': {}", cleaned, e);
                None
            }
        };

        let Some(caps) = captures else {
            return self.system_line(raw, cleaned);
        };

        let group = |name: &str| caps.name(name).map(|m| m.as_str().to_string());

        let (message_type, whisper_direction) = match (group("channel"), group("whisper")) {
            (Some(channel), _) => {
                let message_type = match channel.as_str() {
                    "Guild" => MessageType::Guild,
                    "Officer" => MessageType::Officer,
                    _ => MessageType::Party,
                };
                (message_type, None)
            }
            (None, Some(whisper)) if whisper == "To" => {
                (MessageType::Whisper, Some(WhisperDirection::Outgoing))
            }
            _ => (MessageType::Whisper, Some(WhisperDirection::Incoming)),
        };

        let ign = group("ign").unwrap_or_default();
        let content = group("content").unwrap_or_default();

        let author = if whisper_direction == Some(WhisperDirection::Outgoing) {
            // "To ign:" is our own whisper echoed back; the author is us.
            Author {
                ign: self.bot_ign.clone(),
                hypixel_rank: None,
                guild_rank: None,
                player: None,
            }
        } else {
            Author {
                player: self.directory.resolve_player_by_ign(&ign),
                ign,
                hypixel_rank: group("hrank"),
                guild_rank: group("grank"),
            }
        };

        let is_from_self = author.ign.eq_ignore_ascii_case(&self.bot_ign);

        ChatMessage {
            raw_text: raw.to_string(),
            cleaned_text: cleaned,
            message_type: Some(message_type),
            author: Some(author),
            content,
            is_from_self,
            is_spam: false,
            is_blocked: false,
            whisper_direction,
            received_at: Utc::now(),
        }
    }

    fn system_line(&self, raw: &str, cleaned: String) -> ChatMessage {
        let is_spam = SPAM_REPLIES.contains(&cleaned.as_str());
        let is_blocked = cleaned.starts_with(BLOCKED_REPLY_PREFIX);
        ChatMessage {
            raw_text: raw.to_string(),
            content: cleaned.clone(),
            cleaned_text: cleaned,
            message_type: None,
            author: None,
            is_from_self: false,
            is_spam,
            is_blocked,
            whisper_direction: None,
            received_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::directory::StaticPlayerDirectory;
    use crate::common::types::PlayerRef;
    use uuid::Uuid;

    fn parser() -> ChatLineParser {
        let steve = PlayerRef {
            uuid: Uuid::new_v4(),
            ign: "Steve".to_string(),
            discord_id: Some(7),
        };
        ChatLineParser::new("BridgeBot", Arc::new(StaticPlayerDirectory::new(vec![steve])))
    }

    #[test]
    fn test_guild_line() {
        let msg = parser().parse("Guild > [MVP+] Steve [Member]: hello world");
        assert_eq!(msg.message_type, Some(MessageType::Guild));
        let author = msg.author.as_ref().unwrap();
        assert_eq!(author.ign, "Steve");
        assert_eq!(author.guild_rank.as_deref(), Some("Member"));
        assert_eq!(author.hypixel_rank.as_deref(), Some("MVP+"));
        assert_eq!(author.player.as_ref().and_then(|p| p.discord_id), Some(7));
        assert_eq!(msg.content, "hello world");
        assert!(!msg.is_from_self);
    }

    #[test]
    fn test_formatting_codes_are_stripped() {
        let msg = parser().parse("§2Guild > §b[MVP§c+§b] Steve §e[Member]§f: §fhello");
        assert_eq!(msg.message_type, Some(MessageType::Guild));
        assert_eq!(msg.author_ign(), Some("Steve"));
        assert_eq!(msg.content, "hello");
    }

    #[test]
    fn test_officer_and_party_lines() {
        let msg = parser().parse("Officer > Alex [Officer]: secret");
        assert_eq!(msg.message_type, Some(MessageType::Officer));
        assert!(msg.author.as_ref().unwrap().player.is_none());
        assert_eq!(msg.author.as_ref().unwrap().hypixel_rank, None);

        let msg = parser().parse("Party > [VIP] Alex: warp");
        assert_eq!(msg.message_type, Some(MessageType::Party));
        assert_eq!(msg.author.as_ref().unwrap().guild_rank, None);
    }

    #[test]
    fn test_incoming_whisper() {
        let msg = parser().parse("From [MVP++] Steve: !weight");
        assert_eq!(msg.message_type, Some(MessageType::Whisper));
        assert_eq!(msg.whisper_direction, Some(WhisperDirection::Incoming));
        assert_eq!(msg.author_ign(), Some("Steve"));
        assert_eq!(msg.content, "!weight");
    }

    #[test]
    fn test_outgoing_whisper_is_self() {
        let msg = parser().parse("To [MVP+] Steve: your weight is 5000");
        assert_eq!(msg.whisper_direction, Some(WhisperDirection::Outgoing));
        assert_eq!(msg.author_ign(), Some("BridgeBot"));
        assert!(msg.author.as_ref().unwrap().player.is_none());
        assert!(msg.is_from_self);
    }

    #[test]
    fn test_own_guild_message_is_self() {
        let msg = parser().parse("Guild > [VIP] BridgeBot [Bot]: Alex: hi\u{200B}\u{2060}");
        assert!(msg.is_from_self);
        assert_eq!(msg.content, "Alex: hi");
        assert!(msg.raw_text.ends_with("\u{2060}"));
    }

    #[test]
    fn test_system_lines() {
        let msg = parser().parse("Guild > Steve joined.");
        assert!(msg.is_system());
        assert!(msg.author.is_none());
        assert!(!msg.is_spam);

        let msg = parser().parse("§cYou cannot say the same message twice!");
        assert!(msg.is_spam);

        let msg = parser().parse("We blocked your comment \"xyz\" as it is breaking our rules.");
        assert!(msg.is_blocked);
        assert!(!msg.is_spam);
    }

    #[test]
    fn test_spam_text_in_player_line_is_not_spam() {
        let msg = parser().parse("Guild > Steve [Member]: You cannot say the same message twice!");
        assert!(!msg.is_spam);
    }
}

//! Message formatting for display.
//!
//! Handles placeholder substitution in message format strings.
//! Supports placeholders: %time, %user, %message, %channel, %rank

use chrono::Local;

/// Default format for Discord -> Minecraft lines.
pub const DEFAULT_DISCORD_TO_MINECRAFT_FORMAT: &str = "%user: %message";

/// Default format for bot-sent Discord fallbacks when the webhook fails.
pub const DEFAULT_MINECRAFT_TO_DISCORD_FORMAT: &str = "**%user**: %message";

/// Message formatter that substitutes placeholders in format strings.
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    format: String,
}

impl MessageFormatter {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
        }
    }

    pub fn discord_to_minecraft_default() -> Self {
        Self::new(DEFAULT_DISCORD_TO_MINECRAFT_FORMAT)
    }

    pub fn minecraft_to_discord_default() -> Self {
        Self::new(DEFAULT_MINECRAFT_TO_DISCORD_FORMAT)
    }

    /// Format a message with the given context.
    ///
    /// - `%time` - Current time (HH:MM:SS)
    /// - `%user` - Sender name
    /// - `%message` - The message content
    /// - `%channel` - Channel name
    /// - `%rank` - Guild rank of the sender
    pub fn format(&self, ctx: &FormatContext) -> String {
        self.format
            .replace("%time", &get_time())
            .replace("%user", &ctx.user)
            .replace("%channel", &ctx.channel)
            .replace("%rank", &ctx.rank)
            // Last, so placeholder-like text inside the content is left alone.
            .replace("%message", &ctx.message)
    }
}

/// Context for message formatting.
#[derive(Debug, Clone, Default)]
pub struct FormatContext {
    pub user: String,
    pub message: String,
    pub channel: String,
    pub rank: String,
}

impl FormatContext {
    pub fn new(user: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_rank(mut self, rank: impl Into<String>) -> Self {
        self.rank = rank.into();
        self
    }
}

/// Get the current time as HH:MM:SS string.
fn get_time() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Byte offset of the `n`th character, or the string length.
fn char_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

/// Split a message into chunks of at most `max_chars` characters.
///
/// Splits on word boundaries when possible, otherwise hard-splits.
pub fn split_message(message: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if message.chars().count() <= max_chars {
        return vec![message.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = message;

    while !remaining.is_empty() {
        // Skip leading spaces left over from previous word-boundary splits
        remaining = remaining.trim_start();
        if remaining.is_empty() {
            break;
        }

        if remaining.chars().count() <= max_chars {
            chunks.push(remaining.to_string());
            break;
        }

        let split_at = char_offset(remaining, max_chars);
        // Include the character at the limit so a space right there counts.
        let window_end = char_offset(remaining, max_chars + 1);
        let window = &remaining[..window_end];

        match window.rfind(' ').filter(|&i| i > 0) {
            Some(space_idx) => {
                chunks.push(remaining[..space_idx].trim_end().to_string());
                remaining = &remaining[space_idx + 1..];
            }
            None => {
                // No space found, hard split at the limit
                chunks.push(remaining[..split_at].to_string());
                remaining = &remaining[split_at..];
            }
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_format() {
        let formatter = MessageFormatter::discord_to_minecraft_default();
        let ctx = FormatContext::new("Alex", "Hello world!");
        assert_eq!(formatter.format(&ctx), "Alex: Hello world!");
    }

    #[test]
    fn test_format_with_channel_and_rank() {
        let formatter = MessageFormatter::new("[%channel] %user (%rank): %message");
        let ctx = FormatContext::new("Steve", "hi")
            .with_channel("Officer")
            .with_rank("Elite");
        assert_eq!(formatter.format(&ctx), "[Officer] Steve (Elite): hi");
    }

    #[test]
    fn test_placeholders_inside_content_untouched() {
        let formatter = MessageFormatter::discord_to_minecraft_default();
        let ctx = FormatContext::new("Alex", "my %user is 100%");
        assert_eq!(formatter.format(&ctx), "Alex: my %user is 100%");
    }

    #[test]
    fn test_format_with_time() {
        let formatter = MessageFormatter::new("[%time] %user: %message");
        let result = formatter.format(&FormatContext::new("Player", "Test"));
        assert!(result.contains("Player: Test"));
        assert_eq!(result.find(']'), Some(9));
    }

    #[test]
    fn test_split_message_short() {
        assert_eq!(split_message("Hello world", 50), vec!["Hello world"]);
    }

    #[test]
    fn test_split_message_on_space() {
        assert_eq!(
            split_message("Hello beautiful world", 15),
            vec!["Hello beautiful", "world"]
        );
        assert_eq!(
            split_message("Hello beautiful world", 14),
            vec!["Hello", "beautiful", "world"]
        );
    }

    #[test]
    fn test_split_message_no_space() {
        assert_eq!(
            split_message("HelloBeautifulWorld", 10),
            vec!["HelloBeaut", "ifulWorld"]
        );
    }

    #[test]
    fn test_split_counts_characters_not_bytes() {
        let chunks = split_message("ééééé ééé", 5);
        assert_eq!(chunks, vec!["ééééé", "ééé"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 5));
    }
}

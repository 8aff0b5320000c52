//! Content translation between Minecraft chat and Discord markup.
//!
//! Minecraft -> Discord strips formatting codes, resolves `:emoji:`,
//! `#channel`, `@user`, `@!member` and `@&role` shorthand against the target
//! guild, and escapes markdown everywhere except inside resolved tokens.
//!
//! Discord -> Minecraft reduces emoji and mentions to plain shorthand and
//! applies the chat-filter workaround.

use fancy_regex::{Captures, Regex};
use tracing::warn;

use crate::discord::directory::GuildDirectory;
use crate::game::invisible::{strip_invisible, FILTER_BREAKER};
use crate::game::parser::strip_formatting;

/// Characters Discord interprets as markdown.
const MARKDOWN_CHARS: [char; 7] = ['\\', '*', '_', '~', '`', '|', '>'];

/// Longest emoji sequence (in chars) tried when converting Unicode emoji.
const MAX_EMOJI_CHARS: usize = 8;

/// Translates message content between the two platforms.
#[derive(Debug, Clone)]
pub struct ContentTranslator {
    /// `:emoji:`, `@&role`, `@!member`, `@user` and `#channel` shorthand in game text.
    shorthand_pattern: Regex,
    /// Discord custom emojis (<:name:id> or <a:name:id>).
    custom_emoji_pattern: Regex,
    /// Discord user mentions (<@123> or <@!123>).
    user_mention_pattern: Regex,
    /// Discord role mentions (<@&123>).
    role_mention_pattern: Regex,
    /// Discord channel mentions (<#123>).
    channel_mention_pattern: Regex,
    /// Standalone e-run followed by z-run.
    filter_word_pattern: Regex,
}

impl Default for ContentTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentTranslator {
    pub fn new() -> Self {
        Self {
            shorthand_pattern: Regex::new(
                r"(?P<emoji>:[A-Za-z0-9_+\-]{1,32}:)|@&(?P<role>[A-Za-z0-9_](?:[A-Za-z0-9_.\-]{0,98}[A-Za-z0-9_])?)|@!(?P<member>[A-Za-z0-9_](?:[A-Za-z0-9_.]{0,30}[A-Za-z0-9_])?)|@(?P<user>[A-Za-z0-9_](?:[A-Za-z0-9_.]{0,30}[A-Za-z0-9_])?)|#(?P<channel>[A-Za-z0-9_\-]{1,100})",
            )
            .unwrap(),
            custom_emoji_pattern: Regex::new(r"<a?:([A-Za-z0-9_]+):\d+>").unwrap(),
            user_mention_pattern: Regex::new(r"<@!?(\d+)>").unwrap(),
            role_mention_pattern: Regex::new(r"<@&(\d+)>").unwrap(),
            channel_mention_pattern: Regex::new(r"<#(\d+)>").unwrap(),
            filter_word_pattern: Regex::new(r"(?i)(?<![\w])(e+)(z+)(?![\w])").unwrap(),
        }
    }

    // ========================================================================
    // Minecraft -> Discord
    // ========================================================================

    /// Translate game text for a Discord channel in `directory`'s guild.
    pub fn minecraft_to_discord(&self, message: &str, directory: &GuildDirectory) -> String {
        let text = strip_formatting(&strip_invisible(message));

        let mut result = String::with_capacity(text.len() + 16);
        let mut last = 0;

        for caps in self.shorthand_pattern.captures_iter(&text) {
            let caps = match caps {
                Ok(caps) => caps,
                Err(e) => {
                    warn!("Shorthand match error: {}", e);
                    break;
                }
            };
            let Some(whole) = caps.get(0) else {
                continue;
            };

            result.push_str(&escape_markdown(&text[last..whole.start()]));
            match self.resolve_shorthand(&caps, directory) {
                Some(rendered) => result.push_str(&rendered),
                None => result.push_str(&escape_literal_token(whole.as_str())),
            }
            last = whole.end();
        }

        result.push_str(&escape_markdown(&text[last..]));
        result
    }

    /// Render one shorthand token, or `None` to leave it literal.
    fn resolve_shorthand(&self, caps: &Captures, directory: &GuildDirectory) -> Option<String> {
        if let Some(emoji) = caps.name("emoji") {
            let name = emoji.as_str().trim_matches(':');
            if let Some(custom) = directory.emoji_by_name(name) {
                return Some(custom.render());
            }
            return emojis::get_by_shortcode(&name.to_lowercase()).map(|e| e.as_str().to_string());
        }
        if let Some(role) = caps.name("role") {
            return directory
                .role_by_name(role.as_str())
                .map(|r| format!("<@&{}>", r.id));
        }
        if let Some(member) = caps.name("member") {
            return directory
                .member_by_display_name(member.as_str())
                .map(|m| format!("<@{}>", m.id));
        }
        if let Some(user) = caps.name("user") {
            return directory
                .member_by_name(user.as_str())
                .map(|m| format!("<@{}>", m.id));
        }
        if let Some(channel) = caps.name("channel") {
            return directory
                .channel_by_name(channel.as_str())
                .map(|c| format!("<#{}>", c.id));
        }
        None
    }

    // ========================================================================
    // Discord -> Minecraft
    // ========================================================================

    /// Translate Discord content for in-game chat.
    pub fn discord_to_minecraft(&self, message: &str, directory: &GuildDirectory) -> String {
        let step1 = strip_invisible(message);
        let step2 = self.resolve_custom_emojis_to_text(&step1);
        let step3 = self.resolve_mentions_to_text(&step2, directory);
        let step4 = resolve_unicode_emojis_to_text(&step3);
        let step5 = self.break_filtered_words(&step4);
        step5
            .split(['\n', '\r'])
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Convert Discord custom emojis to `:name:`.
    pub fn resolve_custom_emojis_to_text(&self, message: &str) -> String {
        self.custom_emoji_pattern
            .replace_all(message, ":$1:")
            .to_string()
    }

    /// Convert user, role and channel mentions to `@name` / `#name`.
    ///
    /// Unknown ids are left untouched.
    pub fn resolve_mentions_to_text(&self, message: &str, directory: &GuildDirectory) -> String {
        let users = self
            .user_mention_pattern
            .replace_all(message, |caps: &Captures| -> String {
                caps[1]
                    .parse::<u64>()
                    .ok()
                    .and_then(|id| directory.member_by_id(id))
                    .map(|m| format!("@{}", m.display_name))
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .to_string();

        let roles = self
            .role_mention_pattern
            .replace_all(&users, |caps: &Captures| -> String {
                caps[1]
                    .parse::<u64>()
                    .ok()
                    .and_then(|id| directory.role_by_id(id))
                    .map(|r| format!("@{}", r.name))
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .to_string();

        self.channel_mention_pattern
            .replace_all(&roles, |caps: &Captures| -> String {
                caps[1]
                    .parse::<u64>()
                    .ok()
                    .and_then(|id| directory.channel_by_id(id))
                    .map(|c| format!("#{}", c.name))
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .to_string()
    }

    /// Separate a standalone e-run from its z-run with a zero-width character.
    ///
    /// The upstream filter blocks this abbreviation because it also matches a slur.
    pub fn break_filtered_words(&self, message: &str) -> String {
        self.filter_word_pattern
            .replace_all(message, |caps: &Captures| -> String {
                format!("{}{}{}", &caps[1], FILTER_BREAKER, &caps[2])
            })
            .to_string()
    }
}

/// Convert Unicode emojis to `:shortcode:` (or `:name:` when there is no shortcode).
pub fn resolve_unicode_emojis_to_text(message: &str) -> String {
    let chars: Vec<char> = message.chars().collect();
    let mut result = String::with_capacity(message.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i].is_ascii() {
            result.push(chars[i]);
            i += 1;
            continue;
        }

        // Longest sequence starting here that is a known emoji.
        let longest = (1..=MAX_EMOJI_CHARS.min(chars.len() - i))
            .rev()
            .find_map(|len| {
                let candidate: String = chars[i..i + len].iter().collect();
                emojis::get(&candidate).map(|emoji| (len, emoji))
            });

        match longest {
            Some((len, emoji)) => {
                let alias = emoji.shortcode().unwrap_or_else(|| emoji.name());
                result.push(':');
                result.push_str(alias);
                result.push(':');
                i += len;
            }
            None => {
                result.push(chars[i]);
                i += 1;
            }
        }
    }

    result
}

/// Escape Discord markdown special characters.
pub fn escape_markdown(message: &str) -> String {
    let mut escaped = String::with_capacity(message.len());
    for c in message.chars() {
        if MARKDOWN_CHARS.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Escape an unresolved token, defusing mass mentions.
fn escape_literal_token(token: &str) -> String {
    let lower = token.to_lowercase();
    if lower == "@everyone" || lower == "@here" {
        return format!("@{}{}", FILTER_BREAKER, escape_markdown(&token[1..]));
    }
    escape_markdown(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discord::directory::{EmojiEntry, MemberEntry, NamedEntry};

    fn directory() -> GuildDirectory {
        GuildDirectory {
            members: vec![
                MemberEntry {
                    id: 100,
                    username: "steve".to_string(),
                    display_name: "Steve".to_string(),
                },
                MemberEntry {
                    id: 200,
                    username: "alex_m".to_string(),
                    display_name: "Alex".to_string(),
                },
            ],
            roles: vec![NamedEntry { id: 300, name: "Staff".to_string() }],
            channels: vec![NamedEntry { id: 400, name: "guild-chat".to_string() }],
            emojis: vec![EmojiEntry { id: 500, name: "Pog".to_string(), animated: false }],
        }
    }

    #[test]
    fn test_new_compiles_patterns() {
        let t = ContentTranslator::new();
        assert_eq!(t.minecraft_to_discord("plain", &GuildDirectory::default()), "plain");
        assert_eq!(t.minecraft_to_discord("@Staff.Team", &GuildDirectory::default()), "@Staff.Team");
    }

    #[test]
    fn test_unknown_user_left_literal() {
        let t = ContentTranslator::new();
        assert_eq!(t.minecraft_to_discord("hi @notch", &directory()), "hi @notch");
    }

    #[test]
    fn test_exact_member_becomes_mention() {
        let t = ContentTranslator::new();
        assert_eq!(t.minecraft_to_discord("hi @STEVE", &directory()), "hi <@100>");
        assert_eq!(t.minecraft_to_discord("hi @!alex", &directory()), "hi <@200>");
        // Prefix of a name is not a match.
        assert_eq!(t.minecraft_to_discord("hi @ste", &directory()), "hi @ste");
    }

    #[test]
    fn test_role_and_channel_mentions() {
        let t = ContentTranslator::new();
        assert_eq!(t.minecraft_to_discord("ping @&staff", &directory()), "ping <@&300>");
        assert_eq!(t.minecraft_to_discord("see #Guild-Chat", &directory()), "see <#400>");
        assert_eq!(t.minecraft_to_discord("see #general", &directory()), "see #general");
    }

    #[test]
    fn test_emoji_resolution() {
        let t = ContentTranslator::new();
        assert_eq!(t.minecraft_to_discord("nice :pog:", &directory()), "nice <:Pog:500>");
        assert_eq!(t.minecraft_to_discord(":smile:", &directory()), "😄");
        assert_eq!(t.minecraft_to_discord("time 12:30:00", &directory()), "time 12:30:00");
    }

    #[test]
    fn test_markdown_escaped_outside_tokens() {
        let t = ContentTranslator::new();
        assert_eq!(
            t.minecraft_to_discord("§a*bold* @alex_m", &directory()),
            "\\*bold\\* <@200>"
        );
        assert_eq!(
            t.minecraft_to_discord("under_score @no_body", &directory()),
            "under\\_score @no\\_body"
        );
    }

    #[test]
    fn test_mass_mentions_defused() {
        let t = ContentTranslator::new();
        let out = t.minecraft_to_discord("@everyone look", &directory());
        assert_eq!(out, format!("@{}everyone look", FILTER_BREAKER));
    }

    #[test]
    fn test_discord_mentions_to_text() {
        let t = ContentTranslator::new();
        let out = t.discord_to_minecraft("<@100> <@!200> <@&300> <#400> <@999>", &directory());
        assert_eq!(out, "@Steve @Alex @Staff #guild-chat <@999>");
    }

    #[test]
    fn test_discord_emojis_to_text() {
        let t = ContentTranslator::new();
        assert_eq!(t.discord_to_minecraft("gg <a:dance:123>", &directory()), "gg :dance:");
        assert_eq!(t.discord_to_minecraft("gg 😄", &directory()), "gg :smile:");
    }

    #[test]
    fn test_filter_word_broken() {
        let t = ContentTranslator::new();
        let out = t.discord_to_minecraft("ez gg EEZZ", &directory());
        assert_eq!(out, format!("e{0}z gg EE{0}ZZ", FILTER_BREAKER));
    }

    #[test]
    fn test_filter_workaround_leaves_other_words() {
        let t = ContentTranslator::new();
        let text = "easy breezy eze zeze freeze";
        assert_eq!(t.discord_to_minecraft(text, &directory()), text);
    }

    #[test]
    fn test_invisible_and_newlines_removed() {
        let t = ContentTranslator::new();
        assert_eq!(
            t.discord_to_minecraft("line\u{200B} one\n\nline two", &directory()),
            "line one line two"
        );
    }
}

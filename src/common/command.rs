//! Command/prefix parsing shared by both chat directions.

/// Where a piece of text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOrigin {
    /// Guild, officer or party chat. A prefix is required.
    GuildChat,
    /// In-game whisper. The prefix is optional.
    Whisper,
    /// Discord channel. A prefix is required.
    Discord,
}

impl CommandOrigin {
    fn requires_prefix(&self) -> bool {
        !matches!(self, CommandOrigin::Whisper)
    }
}

/// A parsed command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Lowercased command name.
    pub name: String,
    /// Positional arguments in order.
    pub args: Vec<String>,
    /// Flags without their dashes, lowercased.
    pub flags: Vec<String>,
}

impl ParsedCommand {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f.eq_ignore_ascii_case(flag))
    }
}

/// Extract a command from raw text.
///
/// Prefixes are the configured literals plus the `@BotIgn` mention form.
/// Returns `None` when the origin requires a prefix and none matched, or
/// when there is no command name.
pub fn parse_command(
    text: &str,
    prefixes: &[String],
    bot_ign: &str,
    origin: CommandOrigin,
) -> Option<ParsedCommand> {
    let text = text.trim();

    let body = match strip_prefix(text, prefixes, bot_ign) {
        Some(body) => body,
        None if origin.requires_prefix() => return None,
        None => text,
    };

    let mut tokens = body.split_whitespace();
    let name = tokens.next()?.to_lowercase();

    let mut args = Vec::new();
    let mut flags = Vec::new();
    for token in tokens {
        if token.len() > 1 && token.starts_with('-') {
            let flag = token.trim_start_matches('-');
            if !flag.is_empty() {
                flags.push(flag.to_lowercase());
                continue;
            }
        }
        args.push(token.to_string());
    }

    Some(ParsedCommand { name, args, flags })
}

/// Strip the first matching prefix, returning the remaining text.
fn strip_prefix<'a>(text: &'a str, prefixes: &[String], bot_ign: &str) -> Option<&'a str> {
    // "@BotIgn command ..."
    if !bot_ign.is_empty() {
        let mention_len = bot_ign.len() + 1;
        if text.len() > mention_len
            && text.is_char_boundary(mention_len)
            && text[..mention_len].eq_ignore_ascii_case(&format!("@{}", bot_ign))
        {
            let rest = &text[mention_len..];
            if rest.starts_with(char::is_whitespace) {
                return Some(rest.trim_start());
            }
        }
    }

    prefixes
        .iter()
        .filter(|p| !p.is_empty())
        .find_map(|p| text.strip_prefix(p.as_str()))
        .map(str::trim_start)
}

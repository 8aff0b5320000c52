//! Relay filters.
//!
//! Lines matching a configured pattern are not relayed in that direction.
//! Matching runs on visible text only, so zero-width padding cannot slip a
//! line past a pattern.

use fancy_regex::Regex;
use tracing::warn;

use crate::game::invisible::strip_invisible;

/// Which way a line is being relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDirection {
    MinecraftToDiscord,
    DiscordToMinecraft,
}

#[derive(Debug, Clone)]
struct Rule {
    source: String,
    regex: Regex,
}

/// Ordered rules for one direction.
#[derive(Debug, Clone, Default)]
struct RuleSet(Vec<Rule>);

impl RuleSet {
    fn compile(sources: &[String], direction: FilterDirection) -> Self {
        let rules = sources
            .iter()
            .filter_map(|source| match Regex::new(source) {
                Ok(regex) => Some(Rule {
                    source: source.clone(),
                    regex,
                }),
                Err(e) => {
                    warn!(?direction, "Skipping invalid filter '{}': {}", source, e);
                    None
                }
            })
            .collect();
        Self(rules)
    }

    fn first_match(&self, text: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|rule| match rule.regex.is_match(text) {
                Ok(matched) => matched,
                Err(e) => {
                    // Backtrack limit hit: treat as no match.
                    warn!("Filter '{}' failed on line: {}", rule.source, e);
                    false
                }
            })
            .map(|rule| rule.source.as_str())
    }
}

/// Per-direction relay filter.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    to_discord: RuleSet,
    to_minecraft: RuleSet,
}

impl MessageFilter {
    /// Compile both directions. Invalid patterns are logged and dropped.
    pub fn new(minecraft_to_discord: &[String], discord_to_minecraft: &[String]) -> Self {
        Self {
            to_discord: RuleSet::compile(minecraft_to_discord, FilterDirection::MinecraftToDiscord),
            to_minecraft: RuleSet::compile(discord_to_minecraft, FilterDirection::DiscordToMinecraft),
        }
    }

    /// A filter that relays everything.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Source of the first pattern that blocks `text`, if any.
    pub fn blocking_pattern(&self, direction: FilterDirection, text: &str) -> Option<&str> {
        let rules = match direction {
            FilterDirection::MinecraftToDiscord => &self.to_discord,
            FilterDirection::DiscordToMinecraft => &self.to_minecraft,
        };
        if rules.0.is_empty() {
            return None;
        }
        rules.first_match(&strip_invisible(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    impl MessageFilter {
        fn should_filter(&self, direction: FilterDirection, text: &str) -> bool {
            self.blocking_pattern(direction, text).is_some()
        }
    }

    #[test]
    fn test_empty_filter_relays_everything() {
        let filter = MessageFilter::empty();
        assert!(!filter.should_filter(FilterDirection::MinecraftToDiscord, "Guild > Steve: hi"));
        assert!(!filter.should_filter(FilterDirection::DiscordToMinecraft, "hi"));
    }

    #[test]
    fn test_directions_are_independent() {
        let filter = MessageFilter::new(&rules(&["(?i)discord\\.gg/"]), &rules(&["^!"]));
        assert!(filter.should_filter(FilterDirection::MinecraftToDiscord, "join Discord.gg/abc"));
        assert!(!filter.should_filter(FilterDirection::DiscordToMinecraft, "join discord.gg/abc"));
        assert!(filter.should_filter(FilterDirection::DiscordToMinecraft, "!help"));
    }

    #[test]
    fn test_reports_first_blocking_pattern() {
        let filter = MessageFilter::new(&rules(&["[unclosed", "^spam$", "sp.m"]), &[]);
        assert_eq!(
            filter.blocking_pattern(FilterDirection::MinecraftToDiscord, "spam"),
            Some("^spam$")
        );
        assert_eq!(
            filter.blocking_pattern(FilterDirection::MinecraftToDiscord, "[unclosed"),
            None
        );
    }

    #[test]
    fn test_zero_width_padding_does_not_evade() {
        let filter = MessageFilter::new(&[], &rules(&["(?i)\\bfree coins\\b"]));
        assert!(filter.should_filter(
            FilterDirection::DiscordToMinecraft,
            "get fr\u{200B}ee co\u{2060}ins here"
        ));
    }

    #[test]
    fn test_lookahead_excludes_guild_lines() {
        let filter = MessageFilter::new(&rules(&["^(?!Guild > ).*joined"]), &[]);
        assert!(filter.should_filter(FilterDirection::MinecraftToDiscord, "Steve joined the lobby"));
        assert!(!filter.should_filter(FilterDirection::MinecraftToDiscord, "Guild > Steve joined."));
    }
}

//! Shared types used across the application.

use uuid::Uuid;

/// A player known to the directory: Minecraft identity plus optional Discord link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRef {
    pub uuid: Uuid,
    pub ign: String,
    pub discord_id: Option<u64>,
}

/// In-game chat channel a Discord channel is mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Guild,
    Officer,
}

impl ChannelKind {
    /// Parse a channel kind from its config name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "guild" | "gc" => Some(Self::Guild),
            "officer" | "oc" => Some(Self::Officer),
            _ => None,
        }
    }

    /// Display name, as used in `%channel` formats.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Guild => "Guild",
            Self::Officer => "Officer",
        }
    }

    /// Chat command prefix that sends into this channel.
    pub fn chat_prefix(&self) -> &'static str {
        match self {
            Self::Guild => GUILD_CHAT_PREFIX,
            Self::Officer => OFFICER_CHAT_PREFIX,
        }
    }
}

/// Prefix for guild chat sends.
pub const GUILD_CHAT_PREFIX: &str = "/gc ";
/// Prefix for officer chat sends.
pub const OFFICER_CHAT_PREFIX: &str = "/oc ";
/// Prefix for party chat sends.
pub const PARTY_CHAT_PREFIX: &str = "/pc ";

/// Discord channel mapped to an in-game chat channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMapping {
    pub kind: ChannelKind,
    pub discord_channel_id: u64,
}

/// Everything the bridge needs to know about the guild it serves.
#[derive(Debug, Clone)]
pub struct GuildLinkConfig {
    /// In-game guild name.
    pub name: String,
    /// IGN of the bot account that sits in the guild.
    pub bot_ign: String,
    /// Literal command prefixes (e.g. "!").
    pub prefixes: Vec<String>,
    pub channel_mappings: Vec<ChannelMapping>,
}

impl GuildLinkConfig {
    /// Discord channel id bound to the given kind, if any.
    pub fn channel_for(&self, kind: ChannelKind) -> Option<u64> {
        self.channel_mappings
            .iter()
            .find(|m| m.kind == kind)
            .map(|m| m.discord_channel_id)
    }

    /// Kind mapped to a Discord channel id, if any.
    pub fn kind_for(&self, channel_id: u64) -> Option<ChannelKind> {
        self.channel_mappings
            .iter()
            .find(|m| m.discord_channel_id == channel_id)
            .map(|m| m.kind)
    }
}

/// Maximum chat line length the server accepts for a protocol version.
///
/// Servers before 1.11 (protocol 315) cap chat at 100 characters.
pub fn max_line_length(protocol_version: i32) -> usize {
    if protocol_version < 315 {
        100
    } else {
        256
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_line_length_by_protocol() {
        assert_eq!(max_line_length(47), 100);
        assert_eq!(max_line_length(314), 100);
        assert_eq!(max_line_length(315), 256);
        assert_eq!(max_line_length(765), 256);
    }

    #[test]
    fn test_channel_kind_parsing() {
        assert_eq!(ChannelKind::from_name("Guild"), Some(ChannelKind::Guild));
        assert_eq!(ChannelKind::from_name("oc"), Some(ChannelKind::Officer));
        assert_eq!(ChannelKind::from_name("party"), None);
        assert_eq!(ChannelKind::from_name(ChannelKind::Officer.name()), Some(ChannelKind::Officer));
    }

    #[test]
    fn test_mapping_lookup() {
        let config = GuildLinkConfig {
            name: "Test".to_string(),
            bot_ign: "BridgeBot".to_string(),
            prefixes: vec!["!".to_string()],
            channel_mappings: vec![
                ChannelMapping { kind: ChannelKind::Guild, discord_channel_id: 10 },
                ChannelMapping { kind: ChannelKind::Officer, discord_channel_id: 20 },
            ],
        };
        assert_eq!(config.channel_for(ChannelKind::Officer), Some(20));
        assert_eq!(config.kind_for(10), Some(ChannelKind::Guild));
        assert_eq!(config.kind_for(30), None);
    }
}

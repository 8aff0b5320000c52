//! Read-only lookups the bridge consumes: players and guild configuration.

use std::collections::HashMap;

use uuid::Uuid;

use crate::common::types::{GuildLinkConfig, PlayerRef};

/// Player directory: Minecraft identity <-> Discord member.
pub trait PlayerDirectory: Send + Sync {
    fn resolve_player_by_ign(&self, ign: &str) -> Option<PlayerRef>;
    fn resolve_player_by_uuid(&self, uuid: &Uuid) -> Option<PlayerRef>;
}

/// Guild configuration lookup: roles, prefixes, channel mappings.
pub trait GuildConfigLookup: Send + Sync {
    /// Guild configuration by in-game guild name (case-insensitive).
    fn resolve_guild_config(&self, name: &str) -> Option<GuildLinkConfig>;
    /// Guild configuration whose bot account is `bot_ign`.
    fn resolve_guild_for_member(&self, bot_ign: &str) -> Option<GuildLinkConfig>;
}

/// Player directory backed by a fixed list.
#[derive(Debug, Default)]
pub struct StaticPlayerDirectory {
    by_ign: HashMap<String, PlayerRef>,
    by_uuid: HashMap<Uuid, PlayerRef>,
}

impl StaticPlayerDirectory {
    pub fn new(players: impl IntoIterator<Item = PlayerRef>) -> Self {
        let mut directory = Self::default();
        for player in players {
            directory
                .by_ign
                .insert(player.ign.to_lowercase(), player.clone());
            directory.by_uuid.insert(player.uuid, player);
        }
        directory
    }

    pub fn len(&self) -> usize {
        self.by_uuid.len()
    }
}

impl PlayerDirectory for StaticPlayerDirectory {
    fn resolve_player_by_ign(&self, ign: &str) -> Option<PlayerRef> {
        self.by_ign.get(&ign.to_lowercase()).cloned()
    }

    fn resolve_player_by_uuid(&self, uuid: &Uuid) -> Option<PlayerRef> {
        self.by_uuid.get(uuid).cloned()
    }
}

/// Guild configuration lookup backed by a fixed list.
#[derive(Debug, Default)]
pub struct StaticGuildConfigs {
    guilds: Vec<GuildLinkConfig>,
}

impl StaticGuildConfigs {
    pub fn new(guilds: Vec<GuildLinkConfig>) -> Self {
        Self { guilds }
    }
}

impl GuildConfigLookup for StaticGuildConfigs {
    fn resolve_guild_config(&self, name: &str) -> Option<GuildLinkConfig> {
        self.guilds
            .iter()
            .find(|g| g.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    fn resolve_guild_for_member(&self, bot_ign: &str) -> Option<GuildLinkConfig> {
        self.guilds
            .iter()
            .find(|g| g.bot_ign.eq_ignore_ascii_case(bot_ign))
            .cloned()
    }
}

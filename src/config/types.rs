//! Configuration type definitions.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::bridge::filter::MessageFilter;
use crate::bridge::orchestrator::BridgeSettings;
use crate::common::types::{ChannelKind, ChannelMapping, GuildLinkConfig, PlayerRef};
use crate::game::formatter::MessageFormatter;
use crate::game::sender::SafetyDelays;
use crate::protocol::auth::SessionAuthenticator;
use crate::protocol::client::ClientOptions;

pub const DEFAULT_PORT: u16 = 25565;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_PREFIX: &str = "!";

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub discord: DiscordConfig,
    pub minecraft: MinecraftConfig,
    pub guilds: Vec<GuildConfig>,
    pub players: Option<Vec<PlayerConfig>>,
    pub chat: Option<ChatConfig>,
    pub filters: Option<FiltersConfig>,
}

/// Discord bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    pub token: String,
    pub guild_id: Option<u64>,
}

/// Game server and the accounts that join it.
#[derive(Debug, Clone, Deserialize)]
pub struct MinecraftConfig {
    pub host: String,
    pub port: Option<u16>,
    pub connect_timeout_secs: Option<u64>,
    pub accounts: Vec<AccountConfig>,
}

/// One bot account. Each account runs its own bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub username: String,
    /// Session token for online-mode servers.
    pub access_token: Option<String>,
    /// Profile UUID, required with `access_token`.
    pub uuid: Option<String>,
    /// Guild to link to; linked by membership when absent.
    pub guild: Option<String>,
}

/// In-game guild and the Discord channels it is bridged to.
#[derive(Debug, Clone, Deserialize)]
pub struct GuildConfig {
    pub name: String,
    pub bot_ign: String,
    pub prefixes: Option<Vec<String>>,
    pub channels: Vec<ChannelConfig>,
}

/// Maps a guild chat channel to a Discord channel.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// "guild" or "officer"
    pub kind: String,
    pub discord: u64,
}

/// Known player, used for lookups and mention translation.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerConfig {
    pub uuid: String,
    pub ign: String,
    pub discord_id: Option<u64>,
}

/// Chat formatting and pacing.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    pub max_parts: Option<usize>,
    pub ready_timeout_secs: Option<u64>,
    /// Placeholders: %user, %message, %channel, %rank, %time
    pub discord_to_minecraft_format: Option<String>,
    pub minecraft_to_discord_format: Option<String>,
    pub delays: Option<DelaysConfig>,
}

/// Per-channel pause after each send, in milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct DelaysConfig {
    pub guild_ms: Option<u64>,
    pub officer_ms: Option<u64>,
    pub party_ms: Option<u64>,
    pub whisper_ms: Option<u64>,
    pub command_ms: Option<u64>,
}

/// Message filtering configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FiltersConfig {
    /// Patterns dropping game lines before they reach Discord
    pub minecraft_to_discord: Option<Vec<String>>,
    /// Patterns dropping Discord messages before they reach the game
    pub discord_to_minecraft: Option<Vec<String>>,
}

impl Config {
    pub fn port(&self) -> u16 {
        self.minecraft.port.unwrap_or(DEFAULT_PORT)
    }

    /// Guild link configurations. Unknown channel kinds are skipped.
    pub fn guild_links(&self) -> Vec<GuildLinkConfig> {
        self.guilds
            .iter()
            .map(|guild| GuildLinkConfig {
                name: guild.name.clone(),
                bot_ign: guild.bot_ign.clone(),
                prefixes: guild
                    .prefixes
                    .clone()
                    .unwrap_or_else(|| vec![DEFAULT_PREFIX.to_string()]),
                channel_mappings: guild
                    .channels
                    .iter()
                    .filter_map(|channel| {
                        ChannelKind::from_name(&channel.kind).map(|kind| ChannelMapping {
                            kind,
                            discord_channel_id: channel.discord,
                        })
                    })
                    .collect(),
            })
            .collect()
    }

    /// Known players. Entries with an unparsable UUID are skipped.
    pub fn player_refs(&self) -> Vec<PlayerRef> {
        self.players
            .iter()
            .flatten()
            .filter_map(|player| {
                Uuid::from_str(&player.uuid).ok().map(|uuid| PlayerRef {
                    uuid,
                    ign: player.ign.clone(),
                    discord_id: player.discord_id,
                })
            })
            .collect()
    }

    pub fn message_filter(&self) -> MessageFilter {
        match &self.filters {
            Some(filters) => MessageFilter::new(
                filters.minecraft_to_discord.as_deref().unwrap_or_default(),
                filters.discord_to_minecraft.as_deref().unwrap_or_default(),
            ),
            None => MessageFilter::empty(),
        }
    }

    pub fn safety_delays(&self) -> SafetyDelays {
        let mut delays = SafetyDelays::default();
        let Some(configured) = self.chat.as_ref().and_then(|c| c.delays.as_ref()) else {
            return delays;
        };
        let apply = |slot: &mut Duration, ms: Option<u64>| {
            if let Some(ms) = ms {
                *slot = Duration::from_millis(ms);
            }
        };
        apply(&mut delays.guild, configured.guild_ms);
        apply(&mut delays.officer, configured.officer_ms);
        apply(&mut delays.party, configured.party_ms);
        apply(&mut delays.whisper, configured.whisper_ms);
        apply(&mut delays.command, configured.command_ms);
        delays
    }

    /// Bridge settings for one account.
    pub fn bridge_settings(&self, account: &AccountConfig) -> BridgeSettings {
        let mut settings = BridgeSettings::new(account.username.clone());
        settings.guild_name = account.guild.clone();
        settings.safety_delays = self.safety_delays();
        settings.filter = self.message_filter();

        if let Some(chat) = &self.chat {
            if let Some(max_parts) = chat.max_parts {
                settings.max_parts = max_parts;
            }
            if let Some(secs) = chat.ready_timeout_secs {
                settings.ready_timeout = Duration::from_secs(secs);
            }
            if let Some(format) = &chat.discord_to_minecraft_format {
                settings.discord_to_minecraft = MessageFormatter::new(format.clone());
            }
            if let Some(format) = &chat.minecraft_to_discord_format {
                settings.minecraft_to_discord = MessageFormatter::new(format.clone());
            }
        }
        settings
    }

    /// Connection options for one account.
    pub fn client_options(&self, account: &AccountConfig) -> ClientOptions {
        let auth = match (&account.access_token, &account.uuid) {
            (Some(token), Some(uuid)) => Some(SessionAuthenticator::new(token.clone(), uuid.clone())),
            _ => None,
        };
        ClientOptions {
            host: self.minecraft.host.clone(),
            port: self.port(),
            username: account.username.clone(),
            auth,
            connect_timeout: Duration::from_secs(
                self.minecraft
                    .connect_timeout_secs
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
        }
    }
}

impl std::fmt::Display for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = if self.access_token.is_some() { "online" } else { "offline" };
        match &self.guild {
            Some(guild) => write!(f, "{} ({}, guild {})", self.username, mode, guild),
            None => write!(f, "{} ({})", self.username, mode),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        Config {
            discord: DiscordConfig {
                token: "token".to_string(),
                guild_id: None,
            },
            minecraft: MinecraftConfig {
                host: "mc.hypixel.net".to_string(),
                port: None,
                connect_timeout_secs: None,
                accounts: vec![AccountConfig {
                    username: "BridgeBot".to_string(),
                    access_token: None,
                    uuid: None,
                    guild: Some("Elite".to_string()),
                }],
            },
            guilds: vec![GuildConfig {
                name: "Elite".to_string(),
                bot_ign: "BridgeBot".to_string(),
                prefixes: None,
                channels: vec![
                    ChannelConfig { kind: "guild".to_string(), discord: 10 },
                    ChannelConfig { kind: "officer".to_string(), discord: 20 },
                ],
            }],
            players: Some(vec![PlayerConfig {
                uuid: "069a79f4-44e9-4726-a5be-fca90e38aaf5".to_string(),
                ign: "Notch".to_string(),
                discord_id: Some(42),
            }]),
            chat: Some(ChatConfig {
                max_parts: Some(3),
                ready_timeout_secs: None,
                discord_to_minecraft_format: Some("[D] %user: %message".to_string()),
                minecraft_to_discord_format: None,
                delays: Some(DelaysConfig {
                    guild_ms: Some(1000),
                    officer_ms: None,
                    party_ms: None,
                    whisper_ms: None,
                    command_ms: None,
                }),
            }),
            filters: None,
        }
    }

    #[test]
    fn test_guild_links_default_prefix() {
        let links = sample_config().guild_links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].prefixes, vec!["!".to_string()]);
        assert_eq!(links[0].channel_for(ChannelKind::Officer), Some(20));
    }

    #[test]
    fn test_bridge_settings_overrides() {
        let config = sample_config();
        let settings = config.bridge_settings(&config.minecraft.accounts[0]);
        assert_eq!(settings.name, "BridgeBot");
        assert_eq!(settings.guild_name.as_deref(), Some("Elite"));
        assert_eq!(settings.max_parts, 3);
        assert_eq!(settings.safety_delays.guild, Duration::from_millis(1000));
        assert_eq!(settings.safety_delays.officer, SafetyDelays::default().officer);
    }

    #[test]
    fn test_client_options_offline() {
        let config = sample_config();
        let options = config.client_options(&config.minecraft.accounts[0]);
        assert_eq!(options.port, DEFAULT_PORT);
        assert!(options.auth.is_none());
        assert_eq!(options.connect_timeout, Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS));
    }

    #[test]
    fn test_player_refs() {
        let players = sample_config().player_refs();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].discord_id, Some(42));
    }
}

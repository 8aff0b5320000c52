//! Configuration validation.
//!
//! Validates configuration values and provides helpful error messages.

use std::collections::HashSet;
use std::str::FromStr;

use uuid::Uuid;

use crate::common::error::ConfigError;
use crate::common::types::ChannelKind;
use crate::config::types::Config;

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    // Discord
    if config.discord.token.is_empty() {
        errors.push("discord.token is required".to_string());
    }
    if config.discord.token == "YOUR_DISCORD_TOKEN_HERE" {
        errors.push("discord.token has not been configured (still using placeholder)".to_string());
    }

    // Server
    if config.minecraft.host.is_empty() {
        errors.push("minecraft.host is required".to_string());
    }
    if config.minecraft.port == Some(0) {
        errors.push("minecraft.port must be non-zero".to_string());
    }

    // Guilds
    if config.guilds.is_empty() {
        errors.push("guilds is empty - no guild to bridge".to_string());
    }
    let mut guild_names = HashSet::new();
    for (i, guild) in config.guilds.iter().enumerate() {
        if guild.name.is_empty() {
            errors.push(format!("guilds[{}].name is required", i));
        } else if !guild_names.insert(guild.name.to_lowercase()) {
            errors.push(format!("guilds[{}].name '{}' is duplicated", i, guild.name));
        }
        if !is_valid_ign(&guild.bot_ign) {
            errors.push(format!(
                "guilds[{}].bot_ign '{}' is not a valid username",
                i, guild.bot_ign
            ));
        }
        if let Some(ref prefixes) = guild.prefixes {
            if prefixes.iter().any(|p| p.trim().is_empty()) {
                errors.push(format!("guilds[{}].prefixes contains an empty prefix", i));
            }
        }
        if guild.channels.is_empty() {
            errors.push(format!("guilds[{}].channels is empty - nothing to relay to", i));
        }
        for (j, channel) in guild.channels.iter().enumerate() {
            if ChannelKind::from_name(&channel.kind).is_none() {
                errors.push(format!(
                    "guilds[{}].channels[{}].kind '{}' is invalid (use: guild, officer)",
                    i, j, channel.kind
                ));
            }
            if channel.discord == 0 {
                errors.push(format!("guilds[{}].channels[{}].discord must be non-zero", i, j));
            }
        }
    }

    // Accounts
    if config.minecraft.accounts.is_empty() {
        errors.push("minecraft.accounts is empty - no bot account configured".to_string());
    }
    for (i, account) in config.minecraft.accounts.iter().enumerate() {
        if !is_valid_ign(&account.username) {
            errors.push(format!(
                "minecraft.accounts[{}].username must be 3-16 letters, digits or underscores (got '{}')",
                i, account.username
            ));
        }
        match (&account.access_token, &account.uuid) {
            (Some(_), None) => errors.push(format!(
                "minecraft.accounts[{}].uuid is required with access_token",
                i
            )),
            (_, Some(uuid)) if Uuid::from_str(uuid).is_err() => errors.push(format!(
                "minecraft.accounts[{}].uuid '{}' is not a valid UUID",
                i, uuid
            )),
            _ => {}
        }
        if let Some(ref guild) = account.guild {
            if !guild_names.contains(&guild.to_lowercase()) {
                errors.push(format!(
                    "minecraft.accounts[{}].guild '{}' is not configured in guilds",
                    i, guild
                ));
            }
        }
    }

    // Players
    for (i, player) in config.players.iter().flatten().enumerate() {
        if Uuid::from_str(&player.uuid).is_err() {
            errors.push(format!("players[{}].uuid '{}' is not a valid UUID", i, player.uuid));
        }
        if !is_valid_ign(&player.ign) {
            errors.push(format!("players[{}].ign '{}' is not a valid username", i, player.ign));
        }
    }

    // Chat
    if let Some(ref chat) = config.chat {
        if chat.max_parts == Some(0) {
            errors.push("chat.max_parts must be at least 1".to_string());
        }
        if let Some(ref format) = chat.discord_to_minecraft_format {
            if !format.contains("%message") {
                errors.push("chat.discord_to_minecraft_format must contain %message".to_string());
            }
        }
        if let Some(ref format) = chat.minecraft_to_discord_format {
            if !format.contains("%message") {
                errors.push("chat.minecraft_to_discord_format must contain %message".to_string());
            }
        }
    }

    // Filter patterns (try to compile them)
    if let Some(ref filters) = config.filters {
        let sets = [
            ("minecraft_to_discord", &filters.minecraft_to_discord),
            ("discord_to_minecraft", &filters.discord_to_minecraft),
        ];
        for (name, patterns) in sets {
            for (i, pattern) in patterns.iter().flatten().enumerate() {
                if fancy_regex::Regex::new(pattern).is_err() {
                    errors.push(format!(
                        "filters.{}[{}] is not a valid regex: '{}'",
                        name, i, pattern
                    ));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}

/// Minecraft usernames: 3-16 of `[A-Za-z0-9_]`.
fn is_valid_ign(name: &str) -> bool {
    (3..=16).contains(&name.len()) && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

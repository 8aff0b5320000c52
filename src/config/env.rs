//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `GUILDLINK_DISCORD_TOKEN` - Discord bot token
//! - `GUILDLINK_DISCORD_GUILD_ID` - Discord server id
//! - `GUILDLINK_MINECRAFT_HOST` - Game server host
//! - `GUILDLINK_MINECRAFT_PORT` - Game server port
//! - `GUILDLINK_ACCESS_TOKEN_<USERNAME>` - Session token for one account

use std::env;

use crate::config::types::Config;

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "GUILDLINK";

/// Apply environment variable overrides to a config.
///
/// This allows tokens to be provided via environment variables instead of
/// the config file.
pub fn apply_env_overrides(config: Config) -> Config {
    apply_overrides(config, |name| env::var(name).ok())
}

fn apply_overrides(mut config: Config, var: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(token) = var(&format!("{}_DISCORD_TOKEN", ENV_PREFIX)) {
        config.discord.token = token;
    }
    if let Some(guild_id) = var(&format!("{}_DISCORD_GUILD_ID", ENV_PREFIX)) {
        if let Ok(id) = guild_id.parse() {
            config.discord.guild_id = Some(id);
        }
    }

    if let Some(host) = var(&format!("{}_MINECRAFT_HOST", ENV_PREFIX)) {
        config.minecraft.host = host;
    }
    if let Some(port) = var(&format!("{}_MINECRAFT_PORT", ENV_PREFIX)) {
        if let Ok(port) = port.parse() {
            config.minecraft.port = Some(port);
        }
    }

    for account in &mut config.minecraft.accounts {
        let name = format!(
            "{}_ACCESS_TOKEN_{}",
            ENV_PREFIX,
            account.username.to_uppercase()
        );
        if let Some(token) = var(&name) {
            account.access_token = Some(token);
        }
    }

    config
}

/// Check if any token variables are set but empty.
///
/// Returns a list of variable names that are set but empty.
pub fn check_empty_env_vars() -> Vec<String> {
    env::vars()
        .filter(|(name, value)| {
            value.is_empty()
                && (name == &format!("{}_DISCORD_TOKEN", ENV_PREFIX)
                    || name.starts_with(&format!("{}_ACCESS_TOKEN_", ENV_PREFIX)))
        })
        .map(|(name, _)| name)
        .collect()
}

/// Get the config file path from environment or use default.
///
/// Checks `GUILDLINK_CONFIG` environment variable, otherwise returns "guildlink.conf".
pub fn get_config_path() -> String {
    env::var(format!("{}_CONFIG", ENV_PREFIX)).unwrap_or_else(|_| "guildlink.conf".to_string())
}

//! Configuration file parsing (HOCON format).

use std::path::Path;

use crate::common::error::ConfigError;
use crate::config::types::Config;
use hocon::HoconLoader;

/// Load configuration from a HOCON file.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
        path: path.display().to_string(),
        source,
    })?;
    load_config_str(&content)
}

/// Load configuration from a HOCON string.
pub fn load_config_str(content: &str) -> Result<Config, ConfigError> {
    HoconLoader::new()
        .load_str(content)
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?
        .resolve()
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        discord {
            token = "abc"
        }
        minecraft {
            host = "mc.hypixel.net"
            accounts = [
                { username = "BridgeBot", guild = "Elite" }
            ]
        }
        guilds = [
            {
                name = "Elite"
                bot_ign = "BridgeBot"
                prefixes = ["!", "?"]
                channels = [
                    { kind = "guild", discord = 1234 },
                    { kind = "officer", discord = 5678 }
                ]
            }
        ]
        chat {
            max_parts = 3
        }
    "#;

    #[test]
    fn test_load_sample() {
        let config = load_config_str(SAMPLE).unwrap();
        assert_eq!(config.discord.token, "abc");
        assert_eq!(config.minecraft.accounts[0].username, "BridgeBot");
        assert_eq!(config.guilds[0].channels[1].discord, 5678);
        assert_eq!(config.chat.unwrap().max_parts, Some(3));
        assert!(config.filters.is_none());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config("/nonexistent/guildlink.conf").unwrap_err();
        assert!(matches!(err, ConfigError::IoError { .. }));
    }

    #[test]
    fn test_missing_section_fails() {
        assert!(load_config_str("discord { token = \"abc\" }").is_err());
    }
}

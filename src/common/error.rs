//! Error types for the application.

use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

/// Protocol-related errors (Minecraft wire format and login).
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid packet: {message}")]
    InvalidPacket { message: String },

    #[error("Packet too short: need {needed} bytes, got {got}")]
    PacketTooShort { needed: usize, got: usize },

    #[error("VarInt is too big")]
    VarIntTooBig,

    #[error("Packet of {size} bytes exceeds the protocol limit")]
    PacketTooLarge { size: usize },

    #[error("Invalid string encoding: {message}")]
    InvalidString { message: String },

    #[error("Compression error: {message}")]
    Compression { message: String },

    #[error("Encryption error: {message}")]
    EncryptionError { message: String },

    #[error("Authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("Login rejected by server: {reason}")]
    LoginRejected { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connection-related errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to connect to {host}:{port}: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("Connection timeout")]
    Timeout,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Discord-related errors.
#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("Failed to send message: {message}")]
    SendFailed { message: String },

    #[error("Channel not found: {channel_id}")]
    ChannelNotFound { channel_id: u64 },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Serenity error: {0}")]
    Serenity(#[from] serenity::Error),
}

/// Errors raised while linking a bridge to its guild configuration.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("No guild configuration matches '{0}'")]
    GuildNotFound(String),

    #[error("Guild '{0}' has no usable Discord channel")]
    NoUsableChannel(String),

    #[error("Discord error: {0}")]
    Discord(#[from] DiscordError),
}

impl LinkError {
    /// Whether retrying could ever succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            LinkError::Discord(DiscordError::PermissionDenied { .. })
        )
    }
}

/// Errors returned by the bridge public API.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Caller passed an invalid request. Programming error.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Bridge is not connected")]
    NotConnected,

    #[error("Bridge is not linked to a guild")]
    NotLinked,

    #[error("Timed out waiting for a response")]
    Timeout,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Discord error: {0}")]
    Discord(#[from] DiscordError),
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// Result type alias for Discord operations.
pub type DiscordResult<T> = std::result::Result<T, DiscordError>;

/// Result type alias for bridge operations.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_is_fatal() {
        let err = LinkError::Discord(DiscordError::PermissionDenied {
            message: "Missing Permissions".to_string(),
        });
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_lookup_failures_are_retryable() {
        assert!(LinkError::GuildNotFound("Foo".to_string()).is_retryable());
        assert!(LinkError::NoUsableChannel("Foo".to_string()).is_retryable());
        assert!(LinkError::Discord(DiscordError::ChannelNotFound { channel_id: 1 }).is_retryable());
    }
}

//! Connection lifecycle state for one bridge.
//!
//! The connection moves `Disconnected -> Connecting -> Ready` and back.
//! Linking and the reconnect policy are tracked alongside as flags.

use std::fmt;

/// Where the game connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Ready,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Lifecycle state plus the orthogonal flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeState {
    connection: ConnectionState,
    is_linked: bool,
    should_reconnect: bool,
}

impl Default for BridgeState {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            is_linked: false,
            should_reconnect: true,
        }
    }
}

impl BridgeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn is_ready(&self) -> bool {
        self.connection == ConnectionState::Ready
    }

    pub fn is_linked(&self) -> bool {
        self.is_linked
    }

    pub fn should_reconnect(&self) -> bool {
        self.should_reconnect
    }

    /// Start a connection attempt. Returns false if one is live or in flight.
    pub fn begin_connect(&mut self) -> bool {
        if self.connection != ConnectionState::Disconnected {
            return false;
        }
        self.connection = ConnectionState::Connecting;
        true
    }

    /// Mark the player spawned. Only valid while connecting.
    pub fn mark_ready(&mut self) -> bool {
        if self.connection != ConnectionState::Connecting {
            return false;
        }
        self.connection = ConnectionState::Ready;
        true
    }

    /// Go back to disconnected. Linking does not survive a disconnect.
    pub fn mark_disconnected(&mut self) -> ConnectionState {
        let previous = self.connection;
        self.connection = ConnectionState::Disconnected;
        self.is_linked = false;
        previous
    }

    pub fn set_linked(&mut self, linked: bool) {
        self.is_linked = linked;
    }

    /// Stop reconnecting for good.
    pub fn disable_reconnect(&mut self) {
        self.should_reconnect = false;
    }
}

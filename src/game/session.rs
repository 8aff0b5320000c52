//! Game session seam.
//!
//! A [`SessionConnector`] opens one logged-in session and hands back an
//! event receiver plus a command handle. The TCP client implements it; tests
//! substitute scripted sessions.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::common::error::ConnectionError;

/// Events raised by a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The player spawned in the world; chat may be sent.
    Spawn,
    /// One chat line, flattened to legacy text.
    Chat(String),
    /// The server closed the session with a reason.
    Kicked(String),
    /// The stream ended without a disconnect packet.
    End(String),
    /// A protocol or transport failure.
    Error(String),
}

impl SessionEvent {
    /// Whether this event terminates the session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionEvent::Kicked(_) | SessionEvent::End(_) | SessionEvent::Error(_)
        )
    }
}

/// Commands accepted by a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Chat(String),
    Quit,
}

/// Sending side of a session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    protocol_version: i32,
    username: String,
}

impl SessionHandle {
    pub fn new(
        commands: mpsc::UnboundedSender<SessionCommand>,
        protocol_version: i32,
        username: impl Into<String>,
    ) -> Self {
        Self {
            commands,
            protocol_version,
            username: username.into(),
        }
    }

    /// Queue a chat line. Fails only when the session is gone.
    pub fn chat(&self, text: impl Into<String>) -> Result<(), ConnectionError> {
        self.commands
            .send(SessionCommand::Chat(text.into()))
            .map_err(|_| ConnectionError::ConnectionClosed)
    }

    /// Ask the session to close.
    pub fn quit(&self) -> Result<(), ConnectionError> {
        self.commands
            .send(SessionCommand::Quit)
            .map_err(|_| ConnectionError::ConnectionClosed)
    }

    pub fn protocol_version(&self) -> i32 {
        self.protocol_version
    }

    /// Name the server assigned at login.
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// An open session.
#[derive(Debug)]
pub struct Session {
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub handle: SessionHandle,
}

/// Opens game sessions.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Connect and log in. Resolves once the session is in the play state.
    async fn open(&self) -> Result<Session, ConnectionError>;
}

#[cfg(test)]
pub mod testing {
    //! Scripted sessions for tests.

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Test-side end of a scripted session.
    pub struct ScriptedSession {
        pub events: mpsc::UnboundedSender<SessionEvent>,
        pub commands: mpsc::UnboundedReceiver<SessionCommand>,
    }

    impl ScriptedSession {
        /// Next chat line the bridge sent, skipping quits.
        pub async fn next_chat(&mut self) -> Option<String> {
            while let Some(command) = self.commands.recv().await {
                if let SessionCommand::Chat(text) = command {
                    return Some(text);
                }
            }
            None
        }

        pub fn emit(&self, event: SessionEvent) {
            let _ = self.events.send(event);
        }
    }

    /// Connector that hands out sessions and exposes their other ends.
    #[derive(Clone, Default)]
    pub struct ScriptedConnector {
        opened: Arc<Mutex<VecDeque<ScriptedSession>>>,
        failures: Arc<Mutex<usize>>,
        pub protocol_version: i32,
    }

    impl ScriptedConnector {
        pub fn new() -> Self {
            Self {
                protocol_version: 47,
                ..Default::default()
            }
        }

        /// Fail the next `count` open attempts.
        pub fn fail_next(&self, count: usize) {
            *self.failures.lock().unwrap() = count;
        }

        /// Take the oldest session opened so far.
        pub fn take_session(&self) -> Option<ScriptedSession> {
            self.opened.lock().unwrap().pop_front()
        }
    }

    #[async_trait]
    impl SessionConnector for ScriptedConnector {
        async fn open(&self) -> Result<Session, ConnectionError> {
            {
                let mut failures = self.failures.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(ConnectionError::Timeout);
                }
            }

            let (event_tx, event_rx) = mpsc::unbounded_channel();
            let (command_tx, command_rx) = mpsc::unbounded_channel();
            self.opened.lock().unwrap().push_back(ScriptedSession {
                events: event_tx,
                commands: command_rx,
            });
            Ok(Session {
                events: event_rx,
                handle: SessionHandle::new(command_tx, self.protocol_version, "BridgeBot"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_events() {
        assert!(SessionEvent::Kicked("bye".into()).is_terminal());
        assert!(SessionEvent::End("eof".into()).is_terminal());
        assert!(SessionEvent::Error("boom".into()).is_terminal());
        assert!(!SessionEvent::Spawn.is_terminal());
        assert!(!SessionEvent::Chat("hi".into()).is_terminal());
    }

    #[test]
    fn test_handle_fails_after_session_drop() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SessionHandle::new(tx, 47, "Bot");
        assert!(handle.chat("hello").is_ok());
        drop(rx);
        assert!(handle.is_closed());
        assert!(matches!(handle.chat("hello"), Err(ConnectionError::ConnectionClosed)));
    }
}

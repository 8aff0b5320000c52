//! A live game connection: session handle plus parsed event stream.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::common::error::ConnectionError;
use crate::common::messages::ChatMessage;
use crate::game::parser::ChatLineParser;
use crate::game::session::{Session, SessionEvent, SessionHandle};

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    Kicked(String),
    End(String),
    Error(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Kicked(reason) => write!(f, "kicked: {}", reason),
            CloseReason::End(reason) => write!(f, "end: {}", reason),
            CloseReason::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Parsed events from a game session.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Spawn,
    Message(Arc<ChatMessage>),
    Closed(CloseReason),
}

/// Sending side of a live connection.
#[derive(Debug, Clone)]
pub struct MinecraftConnection {
    handle: SessionHandle,
}

impl MinecraftConnection {
    /// Split an opened session into the connection and its event stream.
    pub fn start(session: Session, parser: Arc<ChatLineParser>) -> (Self, ConnectionEvents) {
        let Session { events, handle } = session;
        (
            Self { handle },
            ConnectionEvents {
                events,
                parser,
                closed: false,
            },
        )
    }

    /// Send one raw chat line (already prefixed and padded).
    pub fn chat(&self, text: impl Into<String>) -> Result<(), ConnectionError> {
        self.handle.chat(text)
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn protocol_version(&self) -> i32 {
        self.handle.protocol_version()
    }

    pub fn username(&self) -> &str {
        self.handle.username()
    }

    /// Close the session. Errors are logged, never returned.
    pub fn close(&self) {
        if let Err(e) = self.handle.quit() {
            debug!("Session already closed: {}", e);
        }
    }
}

/// Receiving side of a live connection.
pub struct ConnectionEvents {
    events: mpsc::UnboundedReceiver<SessionEvent>,
    parser: Arc<ChatLineParser>,
    closed: bool,
}

impl ConnectionEvents {
    /// Next event. After `Closed` (or if the session vanished) returns `None`.
    pub async fn next(&mut self) -> Option<ConnectionEvent> {
        if self.closed {
            return None;
        }

        let event = match self.events.recv().await {
            Some(event) => event,
            None => {
                self.closed = true;
                warn!("Session dropped without a close event");
                return Some(ConnectionEvent::Closed(CloseReason::End(
                    "session dropped".to_string(),
                )));
            }
        };

        let mapped = match event {
            SessionEvent::Spawn => ConnectionEvent::Spawn,
            SessionEvent::Chat(text) => {
                ConnectionEvent::Message(Arc::new(self.parser.parse(&text)))
            }
            SessionEvent::Kicked(reason) => ConnectionEvent::Closed(CloseReason::Kicked(reason)),
            SessionEvent::End(reason) => ConnectionEvent::Closed(CloseReason::End(reason)),
            SessionEvent::Error(message) => ConnectionEvent::Closed(CloseReason::Error(message)),
        };
        if matches!(mapped, ConnectionEvent::Closed(_)) {
            self.closed = true;
        }
        Some(mapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::directory::StaticPlayerDirectory;

    fn parser() -> Arc<ChatLineParser> {
        Arc::new(ChatLineParser::new(
            "BridgeBot",
            Arc::new(StaticPlayerDirectory::new(vec![])),
        ))
    }

    #[tokio::test]
    async fn test_events_are_parsed_and_end_after_close() {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, _command_rx) = mpsc::unbounded_channel();
        let session = Session {
            events: event_rx,
            handle: SessionHandle::new(command_tx, 47, "BridgeBot"),
        };
        let (connection, mut events) = MinecraftConnection::start(session, parser());
        assert_eq!(connection.protocol_version(), 47);

        event_tx.send(SessionEvent::Spawn).unwrap();
        event_tx
            .send(SessionEvent::Chat("Guild > Steve: hi".to_string()))
            .unwrap();
        event_tx.send(SessionEvent::Kicked("bye".to_string())).unwrap();
        event_tx.send(SessionEvent::Chat("late".to_string())).unwrap();

        assert!(matches!(events.next().await, Some(ConnectionEvent::Spawn)));
        match events.next().await {
            Some(ConnectionEvent::Message(msg)) => assert_eq!(msg.content, "hi"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            events.next().await,
            Some(ConnectionEvent::Closed(CloseReason::Kicked(_)))
        ));
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_session_reports_end() {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, _command_rx) = mpsc::unbounded_channel();
        let session = Session {
            events: event_rx,
            handle: SessionHandle::new(command_tx, 47, "BridgeBot"),
        };
        let (_connection, mut events) = MinecraftConnection::start(session, parser());
        drop(event_tx);
        assert!(matches!(
            events.next().await,
            Some(ConnectionEvent::Closed(CloseReason::End(_)))
        ));
    }
}

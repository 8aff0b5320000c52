//! Game side of the bridge.
//!
//! This module contains:
//! - The session seam and the live connection wrapper
//! - Chat line parsing and invisible-character padding
//! - Message formatting and the anti-spam sender

pub mod connection;
pub mod formatter;
pub mod invisible;
pub mod parser;
pub mod sender;
pub mod session;

pub use connection::{CloseReason, ConnectionEvent, ConnectionEvents, MinecraftConnection};
pub use parser::ChatLineParser;
pub use sender::{ChatSender, PendingResponse, SafetyDelays, SendOutcome};
pub use session::{Session, SessionConnector, SessionEvent, SessionHandle};

//! Bridge between in-game guild chat and Discord.
//!
//! ## Module Structure
//!
//! - `orchestrator`: one bridge per account (`ChatBridge`)
//! - `manager`: all bridges, Discord routing (`ChatBridgeManager`)
//! - `queue`: per-direction send serialization
//! - `collector`: filtered collection over bridge events
//! - `relay`: what reaches Discord and how
//! - `channels`, `state`, `events`, `filter`: supporting types

pub mod channels;
pub mod collector;
pub mod events;
pub mod filter;
pub mod manager;
pub mod orchestrator;
pub mod queue;
pub mod relay;
pub mod state;

pub use collector::{CollectorEnded, CollectorOptions, EndReason, MessageCollector};
pub use events::{BridgeEvent, EventHub, Subscription};
pub use filter::{FilterDirection, MessageFilter};
pub use manager::ChatBridgeManager;
pub use orchestrator::{BridgeServices, BridgeSettings, ChatBridge};
pub use state::ConnectionState;

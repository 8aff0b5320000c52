//! Guildlink - Discord bridge for Hypixel guild chat
//!
//! Runs one chat-only game client per configured account and relays
//! guild and officer chat to and from mapped Discord channels.

pub mod bridge;
pub mod common;
pub mod config;
pub mod discord;
pub mod game;
pub mod protocol;

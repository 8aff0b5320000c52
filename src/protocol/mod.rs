//! Minecraft network protocol (1.8.x, protocol 47).
//!
//! - `codec`: VarInt framing, compression and stream encryption
//! - `packets`: the packets the chat client reads and writes
//! - `text`: JSON chat components to legacy text
//! - `auth`: online-mode key exchange and session join
//! - `client`: TCP session connector

pub mod auth;
pub mod client;
pub mod codec;
pub mod packets;
pub mod text;

pub use client::{ClientOptions, TcpSessionConnector};
pub use codec::{MinecraftCodec, Packet, PacketDecode, PacketEncode};

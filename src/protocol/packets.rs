//! Packet definitions for protocol 47 (Minecraft 1.8.x).
//!
//! Only the packets the chat client needs are modeled; everything else is
//! skipped by id.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::common::error::ProtocolResult;
use crate::protocol::codec::{
    ensure_remaining, read_byte_array, read_string, read_varint, write_byte_array, write_string,
    write_varint, PacketDecode, PacketEncode, MAX_STRING_LENGTH,
};

/// Protocol version spoken by this client.
pub const PROTOCOL_VERSION: i32 = 47;

/// Longest chat line the server accepts from a protocol 47 client.
pub const MAX_CHAT_LENGTH: usize = 100;

/// Packet ids by connection state and direction.
pub mod ids {
    pub const HANDSHAKE: i32 = 0x00;

    pub const LOGIN_START: i32 = 0x00;
    pub const ENCRYPTION_RESPONSE: i32 = 0x01;

    pub const LOGIN_DISCONNECT: i32 = 0x00;
    pub const ENCRYPTION_REQUEST: i32 = 0x01;
    pub const LOGIN_SUCCESS: i32 = 0x02;
    pub const LOGIN_SET_COMPRESSION: i32 = 0x03;

    pub const CLIENTBOUND_KEEP_ALIVE: i32 = 0x00;
    pub const JOIN_GAME: i32 = 0x01;
    pub const CLIENTBOUND_CHAT: i32 = 0x02;
    pub const CLIENTBOUND_POSITION_AND_LOOK: i32 = 0x08;
    pub const PLAY_DISCONNECT: i32 = 0x40;
    pub const PLAY_SET_COMPRESSION: i32 = 0x46;

    pub const SERVERBOUND_KEEP_ALIVE: i32 = 0x00;
    pub const SERVERBOUND_CHAT: i32 = 0x01;
    pub const SERVERBOUND_POSITION_AND_LOOK: i32 = 0x06;
    pub const CLIENT_SETTINGS: i32 = 0x15;
}

/// Handshake `next_state` for a login connection.
const LOGIN_STATE: i32 = 2;

// ============================================================================
// Handshake / login
// ============================================================================

#[derive(Debug, Clone)]
pub struct Handshake {
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
}

impl PacketEncode for Handshake {
    const ID: i32 = ids::HANDSHAKE;

    fn encode(&self, buf: &mut BytesMut) {
        write_varint(buf, self.protocol_version);
        write_string(buf, &self.server_address);
        buf.put_u16(self.server_port);
        write_varint(buf, LOGIN_STATE);
    }
}

#[derive(Debug, Clone)]
pub struct LoginStart {
    pub username: String,
}

impl PacketEncode for LoginStart {
    const ID: i32 = ids::LOGIN_START;

    fn encode(&self, buf: &mut BytesMut) {
        write_string(buf, &self.username);
    }
}

#[derive(Debug, Clone)]
pub struct EncryptionRequest {
    pub server_id: String,
    /// DER-encoded RSA public key.
    pub public_key: Bytes,
    pub verify_token: Bytes,
}

impl PacketDecode for EncryptionRequest {
    fn decode(buf: &mut Bytes) -> ProtocolResult<Self> {
        let server_id = read_string(buf, 20)?;
        let public_key = read_byte_array(buf)?;
        let verify_token = read_byte_array(buf)?;
        Ok(Self {
            server_id,
            public_key,
            verify_token,
        })
    }
}

#[derive(Debug, Clone)]
pub struct EncryptionResponse {
    pub shared_secret: Vec<u8>,
    pub verify_token: Vec<u8>,
}

impl PacketEncode for EncryptionResponse {
    const ID: i32 = ids::ENCRYPTION_RESPONSE;

    fn encode(&self, buf: &mut BytesMut) {
        write_byte_array(buf, &self.shared_secret);
        write_byte_array(buf, &self.verify_token);
    }
}

#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub uuid: String,
    pub username: String,
}

impl PacketDecode for LoginSuccess {
    fn decode(buf: &mut Bytes) -> ProtocolResult<Self> {
        let uuid = read_string(buf, 36)?;
        let username = read_string(buf, 16)?;
        Ok(Self { uuid, username })
    }
}

/// Set Compression, in either the login or play state.
#[derive(Debug, Clone, Copy)]
pub struct SetCompression {
    pub threshold: i32,
}

impl PacketDecode for SetCompression {
    fn decode(buf: &mut Bytes) -> ProtocolResult<Self> {
        Ok(Self {
            threshold: read_varint(buf)?,
        })
    }
}

/// Disconnect, in either the login or play state. The reason is a chat component.
#[derive(Debug, Clone)]
pub struct Disconnect {
    pub reason_json: String,
}

impl PacketDecode for Disconnect {
    fn decode(buf: &mut Bytes) -> ProtocolResult<Self> {
        Ok(Self {
            reason_json: read_string(buf, MAX_STRING_LENGTH)?,
        })
    }
}

// ============================================================================
// Play
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    pub id: i32,
}

impl PacketDecode for KeepAlive {
    fn decode(buf: &mut Bytes) -> ProtocolResult<Self> {
        Ok(Self {
            id: read_varint(buf)?,
        })
    }
}

impl PacketEncode for KeepAlive {
    const ID: i32 = ids::SERVERBOUND_KEEP_ALIVE;

    fn encode(&self, buf: &mut BytesMut) {
        write_varint(buf, self.id);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct JoinGame {
    pub entity_id: i32,
    pub gamemode: u8,
}

impl PacketDecode for JoinGame {
    fn decode(buf: &mut Bytes) -> ProtocolResult<Self> {
        ensure_remaining(buf, 5)?;
        let entity_id = buf.get_i32();
        let gamemode = buf.get_u8();
        // Dimension, difficulty, max players, level type and debug flag are unused.
        Ok(Self {
            entity_id,
            gamemode,
        })
    }
}

/// Where a clientbound chat line is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPosition {
    Chat,
    System,
    ActionBar,
}

impl ChatPosition {
    fn from_byte(value: i8) -> Self {
        match value {
            1 => Self::System,
            2 => Self::ActionBar,
            _ => Self::Chat,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientboundChat {
    pub json: String,
    pub position: ChatPosition,
}

impl PacketDecode for ClientboundChat {
    fn decode(buf: &mut Bytes) -> ProtocolResult<Self> {
        let json = read_string(buf, MAX_STRING_LENGTH)?;
        let position = if buf.has_remaining() {
            ChatPosition::from_byte(buf.get_i8())
        } else {
            ChatPosition::Chat
        };
        Ok(Self { json, position })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionAndLook {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

impl PacketDecode for PositionAndLook {
    fn decode(buf: &mut Bytes) -> ProtocolResult<Self> {
        ensure_remaining(buf, 8 * 3 + 4 * 2)?;
        let x = buf.get_f64();
        let y = buf.get_f64();
        let z = buf.get_f64();
        let yaw = buf.get_f32();
        let pitch = buf.get_f32();
        // Relative-position flags follow; the first teleport is always absolute.
        Ok(Self {
            x,
            y,
            z,
            yaw,
            pitch,
        })
    }
}

/// Serverbound confirmation of the spawn position.
impl PacketEncode for PositionAndLook {
    const ID: i32 = ids::SERVERBOUND_POSITION_AND_LOOK;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_f64(self.x);
        buf.put_f64(self.y);
        buf.put_f64(self.z);
        buf.put_f32(self.yaw);
        buf.put_f32(self.pitch);
        buf.put_u8(0); // not on ground
    }
}

#[derive(Debug, Clone)]
pub struct ServerboundChat {
    pub message: String,
}

impl PacketEncode for ServerboundChat {
    const ID: i32 = ids::SERVERBOUND_CHAT;

    fn encode(&self, buf: &mut BytesMut) {
        write_string(buf, &self.message);
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub locale: String,
    pub view_distance: i8,
    /// 0 = full chat.
    pub chat_mode: i32,
    pub chat_colors: bool,
    pub skin_parts: u8,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            locale: "en_US".to_string(),
            view_distance: 2,
            chat_mode: 0,
            chat_colors: true,
            skin_parts: 0x7F,
        }
    }
}

impl PacketEncode for ClientSettings {
    const ID: i32 = ids::CLIENT_SETTINGS;

    fn encode(&self, buf: &mut BytesMut) {
        write_string(buf, &self.locale);
        buf.put_i8(self.view_distance);
        buf.put_i8(self.chat_mode as i8);
        buf.put_u8(self.chat_colors as u8);
        buf.put_u8(self.skin_parts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_layout() {
        let packet = Handshake {
            protocol_version: PROTOCOL_VERSION,
            server_address: "mc.hypixel.net".to_string(),
            server_port: 25565,
        }
        .to_packet();

        assert_eq!(packet.id, 0x00);
        let payload = &packet.payload[..];
        assert_eq!(payload[0], 47);
        assert_eq!(payload[1] as usize, "mc.hypixel.net".len());
        assert_eq!(&payload[2..16], b"mc.hypixel.net");
        assert_eq!(&payload[16..18], &25565u16.to_be_bytes());
        assert_eq!(payload[18], 2);
    }

    #[test]
    fn test_chat_decode_with_position() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, r#"{"text":"hi"}"#);
        buf.put_i8(2);
        let chat = ClientboundChat::decode(&mut buf.freeze()).unwrap();
        assert_eq!(chat.json, r#"{"text":"hi"}"#);
        assert_eq!(chat.position, ChatPosition::ActionBar);
    }

    #[test]
    fn test_encryption_request_decode() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "");
        write_byte_array(&mut buf, &[1, 2, 3]);
        write_byte_array(&mut buf, &[9, 9, 9, 9]);
        let request = EncryptionRequest::decode(&mut buf.freeze()).unwrap();
        assert_eq!(request.server_id, "");
        assert_eq!(&request.public_key[..], &[1, 2, 3]);
        assert_eq!(&request.verify_token[..], &[9, 9, 9, 9]);
    }

    #[test]
    fn test_position_echo_layout() {
        let mut buf = BytesMut::new();
        buf.put_f64(1.5);
        buf.put_f64(70.0);
        buf.put_f64(-3.25);
        buf.put_f32(90.0);
        buf.put_f32(0.0);
        buf.put_i8(0);
        let position = PositionAndLook::decode(&mut buf.freeze()).unwrap();
        assert_eq!(position.y, 70.0);

        let echo = position.to_packet();
        assert_eq!(echo.id, ids::SERVERBOUND_POSITION_AND_LOOK);
        assert_eq!(echo.payload.len(), 8 * 3 + 4 * 2 + 1);
    }

    #[test]
    fn test_short_join_game_is_error() {
        let mut buf = Bytes::from_static(&[0, 0, 1]);
        assert!(JoinGame::decode(&mut buf).is_err());
    }
}

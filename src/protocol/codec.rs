//! Minecraft packet framing.
//!
//! Frame layout: `VarInt length | body`. Once compression is enabled the body
//! is `VarInt data_length | data`, with `data` zlib-compressed when
//! `data_length` is non-zero. Once encryption is enabled the whole stream runs
//! through AES-128/CFB8 in both directions.

use std::io::{Read, Write};

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::common::error::{ProtocolError, ProtocolResult};

/// Largest frame the server may send (2^21 - 1, three VarInt bytes).
pub const MAX_PACKET_SIZE: usize = 2_097_151;

/// Maximum length of a protocol string, in characters.
pub const MAX_STRING_LENGTH: usize = 32_767;

type StreamEncryptor = cfb8::Encryptor<aes::Aes128>;
type StreamDecryptor = cfb8::Decryptor<aes::Aes128>;

/// A raw Minecraft packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub payload: Bytes,
}

impl Packet {
    /// Create a new packet with the given id and payload.
    pub fn new(id: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }
}

/// Trait for outgoing packet types.
pub trait PacketEncode {
    const ID: i32;

    fn encode(&self, buf: &mut BytesMut);

    fn to_packet(&self) -> Packet {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        Packet::new(Self::ID, buf.freeze())
    }
}

/// Trait for incoming packet types.
pub trait PacketDecode: Sized {
    fn decode(buf: &mut Bytes) -> ProtocolResult<Self>;
}

// ============================================================================
// Primitive types
// ============================================================================

pub fn write_varint(buf: &mut impl BufMut, value: i32) {
    let mut value = value as u32;
    loop {
        if value & !0x7F == 0 {
            buf.put_u8(value as u8);
            return;
        }
        buf.put_u8((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
}

pub fn read_varint(buf: &mut impl Buf) -> ProtocolResult<i32> {
    let mut value: u32 = 0;
    for position in 0..5 {
        if !buf.has_remaining() {
            return Err(ProtocolError::PacketTooShort {
                needed: position + 1,
                got: position,
            });
        }
        let byte = buf.get_u8();
        value |= ((byte & 0x7F) as u32) << (7 * position);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(ProtocolError::VarIntTooBig)
}

/// Read a VarInt from the front of `bytes` without consuming it.
///
/// Returns the value and its encoded size, or `None` when more bytes are needed.
pub fn peek_varint(bytes: &[u8]) -> ProtocolResult<Option<(i32, usize)>> {
    let mut value: u32 = 0;
    for (position, byte) in bytes.iter().take(5).enumerate() {
        value |= ((byte & 0x7F) as u32) << (7 * position);
        if byte & 0x80 == 0 {
            return Ok(Some((value as i32, position + 1)));
        }
    }
    if bytes.len() >= 5 {
        Err(ProtocolError::VarIntTooBig)
    } else {
        Ok(None)
    }
}

pub fn write_string(buf: &mut impl BufMut, value: &str) {
    write_varint(buf, value.len() as i32);
    buf.put_slice(value.as_bytes());
}

pub fn read_string(buf: &mut Bytes, max_chars: usize) -> ProtocolResult<String> {
    let len = read_varint(buf)?;
    if len < 0 || len as usize > max_chars * 4 {
        return Err(ProtocolError::InvalidString {
            message: format!("length {} out of range", len),
        });
    }
    let len = len as usize;
    if buf.remaining() < len {
        return Err(ProtocolError::PacketTooShort {
            needed: len,
            got: buf.remaining(),
        });
    }
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|e| ProtocolError::InvalidString {
        message: e.to_string(),
    })
}

/// Length-prefixed byte array (VarInt prefix).
pub fn read_byte_array(buf: &mut Bytes) -> ProtocolResult<Bytes> {
    let len = read_varint(buf)?;
    if len < 0 {
        return Err(ProtocolError::InvalidPacket {
            message: format!("negative array length {}", len),
        });
    }
    let len = len as usize;
    if buf.remaining() < len {
        return Err(ProtocolError::PacketTooShort {
            needed: len,
            got: buf.remaining(),
        });
    }
    Ok(buf.split_to(len))
}

pub fn write_byte_array(buf: &mut impl BufMut, value: &[u8]) {
    write_varint(buf, value.len() as i32);
    buf.put_slice(value);
}

/// Fail unless `buf` holds at least `needed` more bytes.
pub fn ensure_remaining(buf: &Bytes, needed: usize) -> ProtocolResult<()> {
    if buf.remaining() < needed {
        return Err(ProtocolError::PacketTooShort {
            needed,
            got: buf.remaining(),
        });
    }
    Ok(())
}

// ============================================================================
// Codec
// ============================================================================

/// Codec for Minecraft packets, with optional compression and encryption.
#[derive(Default)]
pub struct MinecraftCodec {
    compression_threshold: Option<usize>,
    encryptor: Option<StreamEncryptor>,
    decryptor: Option<StreamDecryptor>,
    /// Bytes at the front of the read buffer already decrypted.
    decrypted: usize,
}

impl MinecraftCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable (non-negative threshold) or disable compression.
    pub fn set_compression(&mut self, threshold: i32) {
        self.compression_threshold = (threshold >= 0).then_some(threshold as usize);
    }

    /// Enable stream encryption with the negotiated shared secret.
    ///
    /// The shared secret is both key and IV.
    pub fn enable_encryption(&mut self, shared_secret: &[u8]) -> ProtocolResult<()> {
        let encryptor = StreamEncryptor::new_from_slices(shared_secret, shared_secret).map_err(
            |e| ProtocolError::EncryptionError {
                message: e.to_string(),
            },
        )?;
        let decryptor = StreamDecryptor::new_from_slices(shared_secret, shared_secret).map_err(
            |e| ProtocolError::EncryptionError {
                message: e.to_string(),
            },
        )?;
        self.encryptor = Some(encryptor);
        self.decryptor = Some(decryptor);
        Ok(())
    }

    /// Decrypt whatever arrived since the last call.
    fn decrypt_incoming(&mut self, src: &mut BytesMut) {
        let Some(decryptor) = self.decryptor.as_mut() else {
            return;
        };
        if self.decrypted < src.len() {
            for byte in src[self.decrypted..].chunks_mut(1) {
                decryptor.decrypt_block_mut(GenericArray::from_mut_slice(byte));
            }
            self.decrypted = src.len();
        }
    }

    fn decompress(&self, mut body: Bytes, threshold: usize) -> ProtocolResult<Bytes> {
        let data_length = read_varint(&mut body)?;
        if data_length == 0 {
            return Ok(body);
        }
        if data_length < 0 || data_length as usize > MAX_PACKET_SIZE {
            return Err(ProtocolError::PacketTooLarge {
                size: data_length.max(0) as usize,
            });
        }
        let data_length = data_length as usize;
        if data_length < threshold {
            return Err(ProtocolError::Compression {
                message: format!(
                    "compressed packet of {} bytes is below threshold {}",
                    data_length, threshold
                ),
            });
        }

        let mut inflated = Vec::with_capacity(data_length);
        ZlibDecoder::new(&body[..])
            .read_to_end(&mut inflated)
            .map_err(|e| ProtocolError::Compression {
                message: e.to_string(),
            })?;
        if inflated.len() != data_length {
            return Err(ProtocolError::Compression {
                message: format!(
                    "declared {} bytes, inflated {}",
                    data_length,
                    inflated.len()
                ),
            });
        }
        Ok(Bytes::from(inflated))
    }

    fn compress(&self, data: &[u8]) -> ProtocolResult<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(data)
            .and_then(|_| encoder.finish())
            .map_err(|e| ProtocolError::Compression {
                message: e.to_string(),
            })
    }
}

impl Decoder for MinecraftCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decrypt_incoming(src);

        let Some((length, header_len)) = peek_varint(&src[..])? else {
            return Ok(None);
        };
        if length < 0 || length as usize > MAX_PACKET_SIZE {
            return Err(ProtocolError::PacketTooLarge {
                size: length.max(0) as usize,
            });
        }

        let frame_len = header_len + length as usize;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let mut body = src.split_to(frame_len).freeze();
        body.advance(header_len);
        self.decrypted = self.decrypted.saturating_sub(frame_len);

        let mut data = match self.compression_threshold {
            Some(threshold) => self.decompress(body, threshold)?,
            None => body,
        };

        let id = read_varint(&mut data)?;
        Ok(Some(Packet { id, payload: data }))
    }
}

impl Encoder<Packet> for MinecraftCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut data = BytesMut::with_capacity(5 + item.payload.len());
        write_varint(&mut data, item.id);
        data.put_slice(&item.payload);

        let body = match self.compression_threshold {
            Some(threshold) if data.len() >= threshold => {
                let compressed = self.compress(&data)?;
                let mut body = BytesMut::with_capacity(5 + compressed.len());
                write_varint(&mut body, data.len() as i32);
                body.put_slice(&compressed);
                body
            }
            Some(_) => {
                let mut body = BytesMut::with_capacity(1 + data.len());
                write_varint(&mut body, 0);
                body.put_slice(&data);
                body
            }
            None => data,
        };

        if body.len() > MAX_PACKET_SIZE {
            return Err(ProtocolError::PacketTooLarge { size: body.len() });
        }

        let start = dst.len();
        dst.reserve(5 + body.len());
        write_varint(dst, body.len() as i32);
        dst.put_slice(&body);

        if let Some(encryptor) = self.encryptor.as_mut() {
            for byte in dst[start..].chunks_mut(1) {
                encryptor.encrypt_block_mut(GenericArray::from_mut_slice(byte));
            }
        }

        Ok(())
    }
}

/// A framed Minecraft connection.
pub type FramedConnection<S> = Framed<S, MinecraftCodec>;

/// Create a new framed connection from a stream.
pub fn new_connection<S: AsyncRead + AsyncWrite>(stream: S) -> FramedConnection<S> {
    Framed::new(stream, MinecraftCodec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(encoder: &mut MinecraftCodec, decoder: &mut MinecraftCodec, packet: Packet) -> Packet {
        let mut wire = BytesMut::new();
        encoder.encode(packet, &mut wire).unwrap();
        decoder.decode(&mut wire).unwrap().unwrap()
    }

    #[test]
    fn test_varint_known_values() {
        let cases: [(i32, &[u8]); 5] = [
            (0, &[0x00]),
            (127, &[0x7F]),
            (300, &[0xAC, 0x02]),
            (2_097_151, &[0xFF, 0xFF, 0x7F]),
            (-1, &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]),
        ];
        for (value, bytes) in cases {
            let mut buf = BytesMut::new();
            write_varint(&mut buf, value);
            assert_eq!(&buf[..], bytes);
            assert_eq!(read_varint(&mut buf.freeze()).unwrap(), value);
        }
    }

    #[test]
    fn test_peek_varint_incomplete_and_oversized() {
        assert_eq!(peek_varint(&[0xAC]).unwrap(), None);
        assert_eq!(peek_varint(&[0xAC, 0x02, 0x99]).unwrap(), Some((300, 2)));
        assert!(matches!(
            peek_varint(&[0xFF; 5]),
            Err(ProtocolError::VarIntTooBig)
        ));
    }

    #[test]
    fn test_partial_frame_waits_for_more() {
        let mut codec = MinecraftCodec::new();
        let mut wire = BytesMut::new();
        codec
            .encode(Packet::new(0x02, vec![1u8, 2, 3, 4]), &mut wire)
            .unwrap();

        let mut partial = BytesMut::from(&wire[..3]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
        partial.extend_from_slice(&wire[3..]);
        let packet = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(packet.id, 0x02);
        assert_eq!(&packet.payload[..], &[1, 2, 3, 4]);
        assert!(partial.is_empty());
    }

    #[test]
    fn test_compression_above_and_below_threshold() {
        let mut encoder = MinecraftCodec::new();
        let mut decoder = MinecraftCodec::new();
        encoder.set_compression(64);
        decoder.set_compression(64);

        let small = Packet::new(0x01, vec![7u8; 10]);
        assert_eq!(roundtrip(&mut encoder, &mut decoder, small.clone()), small);

        let large = Packet::new(0x02, vec![b'a'; 1000]);
        let mut wire = BytesMut::new();
        encoder.encode(large.clone(), &mut wire).unwrap();
        assert!(wire.len() < 1000);
        assert_eq!(decoder.decode(&mut wire).unwrap().unwrap(), large);
    }

    #[test]
    fn test_encrypted_stream_across_split_reads() {
        let secret = [9u8; 16];
        let mut encoder = MinecraftCodec::new();
        let mut decoder = MinecraftCodec::new();
        encoder.enable_encryption(&secret).unwrap();
        decoder.enable_encryption(&secret).unwrap();

        let first = Packet::new(0x02, b"hello".to_vec());
        let second = Packet::new(0x00, vec![0xAC, 0x02]);
        let mut wire = BytesMut::new();
        encoder.encode(first.clone(), &mut wire).unwrap();
        encoder.encode(second.clone(), &mut wire).unwrap();

        // Deliver in two chunks that split the second frame.
        let tail = wire.split_off(wire.len() - 1);
        assert_eq!(decoder.decode(&mut wire).unwrap().unwrap(), first);
        assert!(decoder.decode(&mut wire).unwrap().is_none());
        wire.extend_from_slice(&tail);
        assert_eq!(decoder.decode(&mut wire).unwrap().unwrap(), second);
    }

    #[test]
    fn test_string_roundtrip_and_bounds() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "Guild > hi");
        let mut bytes = buf.freeze();
        assert_eq!(read_string(&mut bytes, 256).unwrap(), "Guild > hi");

        let mut buf = BytesMut::new();
        write_string(&mut buf, &"x".repeat(20));
        assert!(read_string(&mut buf.freeze(), 4).is_err());
    }
}

//! # Serialization
//!
//! Codecs for durable range state and offline recovery data. Binary payloads
//! are wrapped in a checksummed frame:
//!
//! ```text
//! +-------+---------+--------+-------+---------+
//! | magic | version | crc32  |  len  | payload |
//! |  4 B  |   1 B   |  4 B   |  4 B  |  len B  |
//! +-------+---------+--------+-------+---------+
//! ```
//!
//! All integers are little-endian and the checksum covers the payload only.

use crate::{LeaseError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

pub const FRAME_MAGIC: [u8; 4] = *b"RLSE";
pub const FRAME_VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 4 + 4;

/// Trait for value serialization
pub trait ValueSerializer {
    fn serialize<T>(&self, data: &T) -> Result<Vec<u8>>
    where
        T: Serialize;

    fn deserialize<T>(&self, bytes: &[u8]) -> Result<T>
    where
        T: for<'de> Deserialize<'de>;
}

/// JSON serializer, used for human-inspectable recovery files
#[derive(Debug, Default, Clone)]
pub struct JsonSerializer;

impl ValueSerializer for JsonSerializer {
    fn serialize<T>(&self, data: &T) -> Result<Vec<u8>>
    where
        T: Serialize,
    {
        serde_json::to_vec(data)
            .map_err(|e| LeaseError::serialization(format!("JSON serialization failed: {}", e)))
    }

    fn deserialize<T>(&self, bytes: &[u8]) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        serde_json::from_slice(bytes)
            .map_err(|e| LeaseError::serialization(format!("JSON deserialization failed: {}", e)))
    }
}

/// Binary serializer using bincode
#[derive(Debug, Default, Clone)]
pub struct BinarySerializer;

impl ValueSerializer for BinarySerializer {
    fn serialize<T>(&self, data: &T) -> Result<Vec<u8>>
    where
        T: Serialize,
    {
        bincode::serialize(data)
            .map_err(|e| LeaseError::serialization(format!("Binary serialization failed: {}", e)))
    }

    fn deserialize<T>(&self, bytes: &[u8]) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        bincode::deserialize(bytes).map_err(|e| {
            LeaseError::serialization(format!("Binary deserialization failed: {}", e))
        })
    }
}

/// Enum-based serializer that avoids trait object issues
#[derive(Debug, Clone)]
pub enum Serializer {
    Json(JsonSerializer),
    Binary(BinarySerializer),
}

impl Default for Serializer {
    fn default() -> Self {
        Self::Binary(BinarySerializer)
    }
}

impl ValueSerializer for Serializer {
    fn serialize<T>(&self, data: &T) -> Result<Vec<u8>>
    where
        T: Serialize,
    {
        match self {
            Self::Json(s) => s.serialize(data),
            Self::Binary(s) => s.serialize(data),
        }
    }

    fn deserialize<T>(&self, bytes: &[u8]) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        match self {
            Self::Json(s) => s.deserialize(bytes),
            Self::Binary(s) => s.deserialize(bytes),
        }
    }
}

impl Serializer {
    pub fn json() -> Self {
        Self::Json(JsonSerializer)
    }

    pub fn binary() -> Self {
        Self::Binary(BinarySerializer)
    }

    /// Serializes `data` and wraps it in a checksummed frame.
    pub fn encode_framed<T: Serialize>(&self, data: &T) -> Result<Bytes> {
        let payload = self.serialize(data)?;
        Ok(encode_frame(&payload))
    }

    /// Verifies a frame produced by [`Serializer::encode_framed`] and
    /// deserializes its payload.
    pub fn decode_framed<T>(&self, frame: &[u8]) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let payload = decode_frame(frame)?;
        self.deserialize(&payload)
    }
}

/// Wraps `payload` in a frame header carrying its length and CRC32.
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_slice(&FRAME_MAGIC);
    buf.put_u8(FRAME_VERSION);
    buf.put_u32_le(crc32fast::hash(payload));
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

/// Validates a frame and returns its payload.
pub fn decode_frame(frame: &[u8]) -> Result<Bytes> {
    if frame.len() < HEADER_LEN {
        return Err(LeaseError::serialization(format!(
            "frame too short: {} bytes",
            frame.len()
        )));
    }
    let mut buf = frame;
    let mut magic = [0u8; 4];
    buf.copy_to_slice(&mut magic);
    if magic != FRAME_MAGIC {
        return Err(LeaseError::serialization("bad frame magic"));
    }
    let version = buf.get_u8();
    if version != FRAME_VERSION {
        return Err(LeaseError::serialization(format!(
            "unsupported frame version {}",
            version
        )));
    }
    let expected = buf.get_u32_le();
    let len = buf.get_u32_le() as usize;
    if buf.remaining() != len {
        return Err(LeaseError::serialization(format!(
            "frame length mismatch: header says {}, found {}",
            len,
            buf.remaining()
        )));
    }
    let actual = crc32fast::hash(buf);
    if actual != expected {
        return Err(LeaseError::ChecksumMismatch { expected, actual });
    }
    Ok(Bytes::copy_from_slice(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hlc::Timestamp;

    #[test]
    fn test_framed_binary_value() {
        let serializer = Serializer::binary();
        let ts = Timestamp::new(1_234, 5);
        let frame = serializer.encode_framed(&ts).unwrap();
        assert_eq!(&frame[..4], b"RLSE");
        let decoded: Timestamp = serializer.decode_framed(&frame).unwrap();
        assert_eq!(decoded, ts);
    }

    #[test]
    fn test_corrupted_payload_fails_checksum() {
        let frame = encode_frame(b"lease payload");
        let mut corrupted = frame.to_vec();
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xff;
        let err = decode_frame(&corrupted).unwrap_err();
        assert!(matches!(err, LeaseError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let frame = encode_frame(b"lease payload");
        assert!(decode_frame(&frame[..frame.len() - 2]).is_err());
        assert!(decode_frame(&frame[..3]).is_err());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut frame = encode_frame(b"x").to_vec();
        frame[0] = b'X';
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn test_json_serializer() {
        let serializer = Serializer::json();
        let bytes = serializer.serialize(&Timestamp::new(9, 1)).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("wall_time"));
        let ts: Timestamp = serializer.deserialize(&bytes).unwrap();
        assert_eq!(ts, Timestamp::new(9, 1));
    }
}

//! Binary codec for datagrams, with optional JSON for the message schema.
//!
//! All binary encoding goes through one bincode configuration
//! (`standard()` with fixed-size integers) so both peers agree on the layout.
//!
//! ```
//! use year_duel::network::codec::{encode, decode, encode_into};
//!
//! let data: u32 = 42;
//! let bytes = encode(&data).expect("encoding should succeed");
//!
//! let (decoded, _bytes_read): (u32, _) = decode(&bytes).expect("decoding should succeed");
//! assert_eq!(data, decoded);
//!
//! let mut buffer = [0u8; 256];
//! let len = encode_into(&data, &mut buffer).expect("encoding should succeed");
//! assert_eq!(&buffer[..len], bytes.as_slice());
//! ```

use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// What was being encoded or decoded when a codec error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecOperation {
    /// Encoding a datagram.
    EncodePacket,
    /// Decoding a datagram.
    DecodePacket,
    /// Encoding into a caller-provided buffer.
    EncodeIntoBuffer,
    /// A generic encoding operation.
    Encode,
    /// A generic decoding operation.
    Decode,
    /// JSON serialization.
    ToJson,
    /// JSON deserialization.
    FromJson,
}

impl fmt::Display for CodecOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodePacket => write!(f, "encoding packet"),
            Self::DecodePacket => write!(f, "decoding packet"),
            Self::EncodeIntoBuffer => write!(f, "encoding into buffer"),
            Self::Encode => write!(f, "encoding"),
            Self::Decode => write!(f, "decoding"),
            Self::ToJson => write!(f, "writing json"),
            Self::FromJson => write!(f, "reading json"),
        }
    }
}

/// Errors that can occur during encoding or decoding.
///
/// Messages are strings because bincode and serde_json errors expose no
/// structured failure reason.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// The encoding operation failed.
    EncodeError {
        /// The underlying error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// The decoding operation failed.
    DecodeError {
        /// The underlying error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// The provided buffer was too small for encoding.
    BufferTooSmall {
        /// The actual buffer size provided.
        provided: usize,
    },
}

impl CodecError {
    /// Creates a new encode error with the given message and operation.
    pub fn encode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::EncodeError {
            message: message.into(),
            operation,
        }
    }

    /// Creates a new decode error with the given message and operation.
    pub fn decode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::DecodeError {
            message: message.into(),
            operation,
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeError { message, operation } => {
                write!(f, "encoding failed while {operation}: {message}")
            },
            Self::DecodeError { message, operation } => {
                write!(f, "decoding failed while {operation}: {message}")
            },
            Self::BufferTooSmall { provided } => {
                write!(f, "buffer too small: only {provided} bytes provided")
            },
        }
    }
}

impl std::error::Error for CodecError {}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Encodes a value into a new `Vec<u8>`.
pub fn encode<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, config())
        .map_err(|e| CodecError::encode(e.to_string(), CodecOperation::Encode))
}

/// Encodes a value into an existing byte slice and returns the number of bytes written.
///
/// # Errors
///
/// Returns [`CodecError::BufferTooSmall`] if the buffer is not large enough.
pub fn encode_into<T: Serialize>(value: &T, buffer: &mut [u8]) -> CodecResult<usize> {
    bincode::serde::encode_into_slice(value, buffer, config()).map_err(|e| match e {
        bincode::error::EncodeError::UnexpectedEnd => CodecError::BufferTooSmall {
            provided: buffer.len(),
        },
        other => CodecError::encode(other.to_string(), CodecOperation::EncodeIntoBuffer),
    })
}

/// Decodes a value from a byte slice, returning it with the number of bytes consumed.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<(T, usize)> {
    bincode::serde::decode_from_slice(bytes, config())
        .map_err(|e| CodecError::decode(e.to_string(), CodecOperation::Decode))
}

/// Decodes a value from a byte slice, ignoring the bytes consumed.
pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    decode(bytes).map(|(value, _)| value)
}

/// Serializes a value as JSON, for transports that carry text.
///
/// ```
/// use year_duel::network::codec::{from_json, to_json};
/// use year_duel::Message;
///
/// let msg = Message::Reset { game: 4 };
/// let text = to_json(&msg).unwrap();
/// assert_eq!(text, r#"{"reset":{"game":4}}"#);
/// assert_eq!(from_json::<Message>(&text).unwrap(), msg);
/// ```
#[cfg(feature = "json")]
pub fn to_json<T: Serialize>(value: &T) -> CodecResult<String> {
    serde_json::to_string(value).map_err(|e| CodecError::encode(e.to_string(), CodecOperation::ToJson))
}

/// Parses a JSON value produced by [`to_json`].
#[cfg(feature = "json")]
pub fn from_json<T: DeserializeOwned>(text: &str) -> CodecResult<T> {
    serde_json::from_str(text).map_err(|e| CodecError::decode(e.to_string(), CodecOperation::FromJson))
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::catalog::InventionFact;
    use crate::game_state::Role;
    use crate::network::messages::{Message, Packet, PacketBody};

    fn game_start() -> Packet {
        Packet {
            magic: 0xABCD,
            body: PacketBody::App(Message::GameStart {
                game: 1,
                item: InventionFact::new("Zipper", 1893, "clasp locker"),
                host_name: "Ada".to_owned(),
                guest_name: "Brook".to_owned(),
                total_rounds: 5,
            }),
        }
    }

    #[test]
    fn test_packet_roundtrip() {
        let original = game_start();
        let bytes = encode(&original).unwrap();
        let (decoded, len): (Packet, _) = decode(&bytes).unwrap();
        assert_eq!(original, decoded);
        assert_eq!(len, bytes.len());
    }

    #[test]
    fn test_negative_years_survive_encoding() {
        let packet = Packet {
            magic: 1,
            body: PacketBody::App(Message::Guess {
                game: 9,
                round_index: 2,
                role: Role::Guest,
                value: -6500,
            }),
        };
        let decoded: Packet = decode_value(&encode(&packet).unwrap()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_encode_into_buffer_too_small() {
        let mut buffer = [0u8; 4];
        let result = encode_into(&game_start(), &mut buffer);
        assert_eq!(result, Err(CodecError::BufferTooSmall { provided: 4 }));
    }

    #[test]
    fn test_decode_truncated_packet_fails() {
        let bytes = encode(&game_start()).unwrap();
        let result: CodecResult<Packet> = decode_value(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(CodecError::DecodeError { .. })));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result: CodecResult<Packet> = decode_value(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(result.is_err());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        assert_eq!(encode(&game_start()).unwrap(), encode(&game_start()).unwrap());
    }

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::decode("unexpected end", CodecOperation::DecodePacket);
        assert_eq!(
            err.to_string(),
            "decoding failed while decoding packet: unexpected end"
        );
        let err = CodecError::BufferTooSmall { provided: 10 };
        assert!(err.to_string().contains("10 bytes"));
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_uses_camel_case_wire_names() {
        let msg = Message::GuestJoined {
            guest_name: "Brook".to_owned(),
        };
        let text = to_json(&msg).unwrap();
        assert_eq!(text, r#"{"guestJoined":{"guestName":"Brook"}}"#);
        assert_eq!(from_json::<Message>(&text).unwrap(), msg);
    }
}

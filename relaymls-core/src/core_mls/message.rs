//! Wire format for group messages
//!
//! A serialized message exposes only what a relay or receiver needs to route
//! and select keys: the content type, group id and epoch. Sender and counter
//! travel inside the encrypted sender data.

use super::codec;
use super::errors::{MlsError, MlsResult};
use super::types::GroupId;
use serde::{Deserialize, Serialize};

const MESSAGE_MAGIC: &[u8; 4] = b"RMMS";

/// Current message format version
pub const MESSAGE_VERSION: u8 = 1;

/// Kind of payload carried by a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    /// Application payload
    Application,
    /// Signed commit advancing the epoch
    Commit,
}

impl ContentType {
    /// Byte bound into the AEAD associated data
    pub fn as_u8(self) -> u8 {
        match self {
            ContentType::Application => 1,
            ContentType::Commit => 2,
        }
    }
}

/// Encrypted group message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedMessage {
    pub content_type: ContentType,
    pub group_id: GroupId,
    /// Epoch the message was encrypted in
    pub epoch: u64,
    pub nonce: Vec<u8>,
    pub encrypted_sender_data: Vec<u8>,
    /// Ciphertext (includes AEAD tag)
    pub ciphertext: Vec<u8>,
}

impl SerializedMessage {
    pub fn to_bytes(&self) -> MlsResult<Vec<u8>> {
        codec::encode_framed(MESSAGE_MAGIC, MESSAGE_VERSION, self)
    }

    /// Parse a message; any framing problem is `DecryptionFailed`
    pub fn from_bytes(bytes: &[u8]) -> MlsResult<Self> {
        codec::decode_framed(MESSAGE_MAGIC, MESSAGE_VERSION, bytes)
            .map_err(|e| MlsError::DecryptionFailed(format!("Malformed message: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> SerializedMessage {
        SerializedMessage {
            content_type: ContentType::Application,
            group_id: GroupId::new(vec![1; 32]),
            epoch: 7,
            nonce: vec![2; 12],
            encrypted_sender_data: vec![3; 28],
            ciphertext: vec![4; 21],
        }
    }

    #[test]
    fn test_message_encoding() {
        let msg = message();
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"RMMS");
        assert_eq!(SerializedMessage::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_malformed_message_is_decryption_failure() {
        let mut bytes = message().to_bytes().unwrap();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            SerializedMessage::from_bytes(&bytes),
            Err(MlsError::DecryptionFailed(_))
        ));
        assert!(matches!(SerializedMessage::from_bytes(&[]), Err(MlsError::DecryptionFailed(_))));
    }

    #[test]
    fn test_content_type_bytes_distinct() {
        assert_ne!(ContentType::Application.as_u8(), ContentType::Commit.as_u8());
    }
}

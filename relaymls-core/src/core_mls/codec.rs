//! Canonical binary encoding shared by every wire and storage record
//!
//! Records are `magic (4) || version (1) || bincode body`. The bincode
//! configuration is fixed-width integers with a size limit and no trailing
//! bytes, so encodings are deterministic and safe to hash or sign.

use super::errors::{MlsError, MlsResult};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Upper bound on any decoded record
const MAX_RECORD_SIZE: u64 = 16 * 1024 * 1024;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_RECORD_SIZE)
        .reject_trailing_bytes()
}

/// Encode a value without framing (used for signed and hashed content)
pub(crate) fn encode<T: Serialize>(value: &T) -> MlsResult<Vec<u8>> {
    Ok(options().serialize(value)?)
}

/// Decode a value encoded with [`encode`]
pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> MlsResult<T> {
    Ok(options().deserialize(bytes)?)
}

/// Encode a value behind a magic/version header
pub(crate) fn encode_framed<T: Serialize>(
    magic: &[u8; 4],
    version: u8,
    value: &T,
) -> MlsResult<Vec<u8>> {
    let body = encode(value)?;
    let mut bytes = Vec::with_capacity(5 + body.len());
    bytes.extend_from_slice(magic);
    bytes.push(version);
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Decode a value framed by [`encode_framed`]
pub(crate) fn decode_framed<T: DeserializeOwned>(
    magic: &[u8; 4],
    version: u8,
    bytes: &[u8],
) -> MlsResult<T> {
    if bytes.len() < 5 {
        return Err(MlsError::Serialization("record too short".to_string()));
    }
    if &bytes[0..4] != magic {
        return Err(MlsError::Serialization("invalid magic bytes".to_string()));
    }
    if bytes[4] != version {
        return Err(MlsError::Serialization(format!(
            "unsupported record version: {}",
            bytes[4]
        )));
    }
    decode(&bytes[5..])
}

/// Length-prefixed concatenation used for KDF contexts and AAD
pub(crate) fn concat_prefixed(parts: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for part in parts {
        out.extend_from_slice(&(part.len() as u32).to_be_bytes());
        out.extend_from_slice(part);
    }
    out
}

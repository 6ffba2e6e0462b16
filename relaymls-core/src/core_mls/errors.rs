//! Error types for MLS operations

use thiserror::Error;

/// Result type for MLS operations
pub type MlsResult<T> = Result<T, MlsError>;

/// Errors that can occur in MLS operations
#[derive(Debug, Error)]
pub enum MlsError {
    /// Key package failed to decode or its signature did not verify
    #[error("Malformed key package: {0}")]
    MalformedKeyPackage(String),

    /// Key package is outside its lifetime
    #[error("Key package expired: {0}")]
    KeyPackageExpired(String),

    /// Group creation without any invited member
    #[error("Group must contain at least one member besides the creator")]
    EmptyMembership,

    /// The same identity appears twice in a roster
    #[error("Duplicate member: {0}")]
    DuplicateMember(String),

    /// Group is not held by this session
    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    /// Group is already held by this session
    #[error("Group already exists: {0}")]
    DuplicateGroup(String),

    /// Key package was already consumed by a previous create/add
    #[error("Key package already consumed: {0}")]
    UnspentPackageRequired(String),

    /// No local private key matches the welcome target
    #[error("No matching key package for welcome: {0}")]
    NoMatchingKeyPackage(String),

    /// Welcome failed integrity checks
    #[error("Welcome decryption failed: {0}")]
    WelcomeDecryptFailed(String),

    /// Message failed integrity checks
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Epoch mismatch between message and local state
    #[error("Epoch mismatch: expected {expected}, got {actual}")]
    EpochMismatch { expected: u64, actual: u64 },

    /// Counter already consumed for this sender
    #[error("Replayed counter {counter} from sender {sender}")]
    ReplayedCounter { sender: u32, counter: u64 },

    /// No signing capability registered for identity
    #[error("Identity unavailable: {0}")]
    IdentityUnavailable(String),

    /// Unauthorized operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Cryptographic operation failed
    #[error("Crypto error: {0}")]
    CryptoError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),
}

impl MlsError {
    /// Errors that indicate tampering, replay or a wrong recipient.
    ///
    /// These must reach the caller unchanged and are never retried.
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            MlsError::WelcomeDecryptFailed(_)
                | MlsError::DecryptionFailed(_)
                | MlsError::EpochMismatch { .. }
                | MlsError::ReplayedCounter { .. }
                | MlsError::NoMatchingKeyPackage(_)
        )
    }

    /// Validation and state errors the caller may fix and retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MlsError::MalformedKeyPackage(_)
                | MlsError::KeyPackageExpired(_)
                | MlsError::EmptyMembership
                | MlsError::DuplicateMember(_)
                | MlsError::UnknownGroup(_)
                | MlsError::DuplicateGroup(_)
                | MlsError::UnspentPackageRequired(_)
                | MlsError::IdentityUnavailable(_)
                | MlsError::InvalidInput(_)
        )
    }
}

impl From<serde_json::Error> for MlsError {
    fn from(e: serde_json::Error) -> Self {
        MlsError::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for MlsError {
    fn from(e: bincode::Error) -> Self {
        MlsError::Serialization(e.to_string())
    }
}

impl From<hex::FromHexError> for MlsError {
    fn from(e: hex::FromHexError) -> Self {
        MlsError::InvalidInput(format!("invalid hex: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MlsError::UnknownGroup("abcd".to_string());
        assert_eq!(err.to_string(), "Unknown group: abcd");

        let err = MlsError::EpochMismatch { expected: 5, actual: 3 };
        assert_eq!(err.to_string(), "Epoch mismatch: expected 5, got 3");

        let err = MlsError::ReplayedCounter { sender: 1, counter: 7 };
        assert_eq!(err.to_string(), "Replayed counter 7 from sender 1");
    }

    #[test]
    fn test_error_classification() {
        assert!(MlsError::DecryptionFailed("tag".into()).is_integrity_error());
        assert!(MlsError::ReplayedCounter { sender: 0, counter: 0 }.is_integrity_error());
        assert!(!MlsError::DecryptionFailed("tag".into()).is_recoverable());

        assert!(MlsError::EmptyMembership.is_recoverable());
        assert!(MlsError::UnspentPackageRequired("ref".into()).is_recoverable());
        assert!(!MlsError::EmptyMembership.is_integrity_error());

        assert!(!MlsError::Storage("disk".into()).is_recoverable());
        assert!(!MlsError::Storage("disk".into()).is_integrity_error());
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<i32>("invalid").unwrap_err();
        let mls_err: MlsError = json_err.into();
        assert!(matches!(mls_err, MlsError::Serialization(_)));

        let hex_err = hex::decode("zz").unwrap_err();
        let mls_err: MlsError = hex_err.into();
        assert!(matches!(mls_err, MlsError::InvalidInput(_)));
    }
}

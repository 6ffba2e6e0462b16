//! relaymls: MLS-style secure group sessions for a Nostr relay transport
//!
//! Start from [`MlsSession`]: issue key packages, create or join groups,
//! and encrypt or process messages for them.

pub mod config;
pub mod core_mls;
pub mod logging;
pub mod metrics;

pub use config::{Config, SessionConfig, StorageBackend};
pub use core_mls::{
    CommitOutput, CreateGroupParams, GroupCreated, GroupId, GroupJoined, GroupState, MlsError,
    MlsResult, MlsSession, ProcessedMessage, SerializedMessage, WelcomeArtifact, WelcomePreview,
};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogLevel};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let _ = LogLevel::Info;
        let _ = StorageBackend::Memory;
        assert!(Config::default().validate().is_ok());
    }
}

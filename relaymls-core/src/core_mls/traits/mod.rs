//! Collaborator traits consumed by the engine
//!
//! - [`ciphersuite::CiphersuiteProvider`]: primitive cryptography
//! - [`identity::IdentityProvider`]: signing keys per local identity
//! - [`storage::StorageProvider`]: durable, transactional persistence

pub mod ciphersuite;
pub mod identity;
pub mod storage;

pub use ciphersuite::{CiphersuiteProvider, HpkeCiphertext, HpkeKeyPair, SignatureKeyPair};
pub use identity::IdentityProvider;
pub use storage::{StorageProvider, StorageTransaction, StoredGroup, StoredKeyPackage};

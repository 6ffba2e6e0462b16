//! MLS-style group sessions over a relay transport
//!
//! This module provides secure group messaging with:
//! - Signed, single-use key packages
//! - Group creation with HPKE-sealed welcomes
//! - Epoch-scoped encryption with per-sender replay protection
//! - Signed commits for add, remove and key rotation
//! - Transactional persistence of group and key state
//!
//! ## Core Components
//!
//! - `MlsSession`: session handle; every operation is a method on it
//! - `KeyPackageStore`: issue, parse and delete key packages
//! - `GroupState`: roster, epoch secrets and counters of one group
//! - `WelcomeArtifact`: new member onboarding
//! - `SerializedMessage`: wire format for application messages and commits
//!
//! ## Security Invariants
//!
//! - Epoch monotonicity: each commit moves the group to exactly epoch + 1
//! - Forward secrecy: epoch secrets derive one-way from the previous init secret
//! - Replay protection: per-sender counter watermarks
//! - Signature verification: key packages, group info and commits are signed

// Core types and errors
pub mod errors;
pub mod types;
pub(crate) mod codec;
pub mod crypto;

// Collaborator traits and their implementations
pub mod traits;
pub mod providers;
pub mod storage;

// Protocol
pub mod key_package;
pub mod extension;
pub mod encryption;
pub mod message;
pub mod group;
pub mod welcome;
pub mod commit;

// Session surface
pub mod session;
pub mod interchange;

pub use commit::Proposal;
pub use errors::{MlsError, MlsResult};
pub use extension::NostrGroupData;
pub use group::GroupState;
pub use interchange::{
    GroupCreatedRecord, GroupJoinedRecord, NostrGroupDataRecord, WelcomePreviewRecord,
};
pub use key_package::{EncodedKeyPackage, KeyPackage, KeyPackageStore, Lifetime};
pub use message::{ContentType, SerializedMessage};
pub use providers::{MemoryIdentityProvider, RustCryptoProvider};
pub use session::{
    CommitOutput, CreateGroupParams, GroupCreated, GroupJoined, MlsSession, ProcessedMessage,
};
pub use storage::{MemoryStorageProvider, SqlStorageProvider};
pub use traits::{CiphersuiteProvider, IdentityProvider, StorageProvider, StorageTransaction};
pub use types::{GroupId, KeyPackageRef, LeafIndex, Member, NostrGroupId};
pub use welcome::{WelcomeArtifact, WelcomePreview};

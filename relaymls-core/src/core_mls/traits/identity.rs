//! Identity Provider Trait
//!
//! Binds local identity strings to the Ed25519 keys that sign key packages,
//! group info and commits.

use crate::core_mls::errors::MlsResult;
use async_trait::async_trait;

/// Signing collaborator for local identities
///
/// Every method fails with `MlsError::IdentityUnavailable` when no key is
/// registered for `identity`.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Ed25519 public key registered for `identity`
    async fn verifying_key(&self, identity: &str) -> MlsResult<Vec<u8>>;

    /// Sign `message` with the key registered for `identity`
    async fn sign(&self, identity: &str, message: &[u8]) -> MlsResult<Vec<u8>>;

    /// Whether a signing key exists for `identity`
    async fn has_identity(&self, identity: &str) -> bool {
        self.verifying_key(identity).await.is_ok()
    }
}

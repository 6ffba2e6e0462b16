//! In-Memory Identity Provider
//!
//! Holds Ed25519 signing keys per identity string for the lifetime of the
//! process. Keys are zeroized when the provider is dropped.

use crate::core_mls::crypto::MlsSigningKey;
use crate::core_mls::errors::{MlsError, MlsResult};
use crate::core_mls::traits::identity::IdentityProvider;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory identity provider
#[derive(Clone, Default)]
pub struct MemoryIdentityProvider {
    keys: Arc<RwLock<HashMap<String, Arc<MlsSigningKey>>>>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh random key for `identity`, replacing any existing one
    ///
    /// Returns the public key.
    pub async fn register(&self, identity: &str) -> Vec<u8> {
        self.insert(identity, MlsSigningKey::generate()).await
    }

    /// Register a deterministic key derived from a 32-byte seed
    pub async fn register_seed(&self, identity: &str, seed: &[u8; 32]) -> Vec<u8> {
        self.insert(identity, MlsSigningKey::from_bytes(seed)).await
    }

    /// Drop the key for `identity`
    pub async fn remove(&self, identity: &str) -> bool {
        self.keys.write().await.remove(identity).is_some()
    }

    async fn insert(&self, identity: &str, key: MlsSigningKey) -> Vec<u8> {
        let public = key.verifying_key().to_bytes().to_vec();
        self.keys.write().await.insert(identity.to_string(), Arc::new(key));
        tracing::debug!(identity, "Registered signing identity");
        public
    }

    async fn key_for(&self, identity: &str) -> MlsResult<Arc<MlsSigningKey>> {
        self.keys
            .read()
            .await
            .get(identity)
            .cloned()
            .ok_or_else(|| MlsError::IdentityUnavailable(identity.to_string()))
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn verifying_key(&self, identity: &str) -> MlsResult<Vec<u8>> {
        Ok(self.key_for(identity).await?.verifying_key().to_bytes().to_vec())
    }

    async fn sign(&self, identity: &str, message: &[u8]) -> MlsResult<Vec<u8>> {
        Ok(self.key_for(identity).await?.sign(message))
    }

    async fn has_identity(&self, identity: &str) -> bool {
        self.keys.read().await.contains_key(identity)
    }
}

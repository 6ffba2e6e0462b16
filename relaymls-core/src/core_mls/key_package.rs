//! Key packages: signed, single-use invitations to a group
//!
//! A key package advertises an identity's Ed25519 key and a fresh X25519
//! init key. The issuer keeps the init private key in storage, keyed by the
//! SHA-256 of the package encoding, until a welcome addressed to that
//! reference is joined or the package is deleted.

use super::codec;
use super::errors::{MlsError, MlsResult};
use super::traits::ciphersuite::{CiphersuiteId, CiphersuiteProvider, ExtensionType};
use super::traits::identity::IdentityProvider;
use super::traits::storage::{StorageProvider, StorageTransaction, StoredKeyPackage};
use super::types::{current_timestamp, KeyPackageRef};
use crate::metrics::{self, record_counter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const KEY_PACKAGE_MAGIC: &[u8; 4] = b"RMKP";

/// Current key package format version
pub const KEY_PACKAGE_VERSION: u8 = 1;

/// Validity window in Unix seconds, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifetime {
    pub not_before: u64,
    pub not_after: u64,
}

impl Lifetime {
    /// Window starting now and lasting `duration`
    pub fn from_now(duration: Duration) -> Self {
        let now = current_timestamp();
        Self { not_before: now, not_after: now.saturating_add(duration.as_secs()) }
    }

    pub fn is_valid_at(&self, timestamp: u64) -> bool {
        self.not_before <= timestamp && timestamp <= self.not_after
    }
}

/// Signed key package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPackage {
    pub version: u8,
    pub ciphersuite: CiphersuiteId,
    /// Identity string the package was issued for
    pub identity: String,
    /// Ed25519 public key of `identity`
    pub identity_key: Vec<u8>,
    /// X25519 HPKE public key welcomes are sealed to
    pub init_key: Vec<u8>,
    pub extensions: Vec<ExtensionType>,
    /// Relays where the issuer can be reached
    pub relays: Vec<String>,
    pub lifetime: Lifetime,
    pub signature: Vec<u8>,
}

/// Fields covered by the key package signature
#[derive(Serialize)]
struct KeyPackageTbs<'a> {
    version: u8,
    ciphersuite: CiphersuiteId,
    identity: &'a str,
    identity_key: &'a [u8],
    init_key: &'a [u8],
    extensions: &'a [ExtensionType],
    relays: &'a [String],
    lifetime: Lifetime,
}

impl KeyPackage {
    fn to_be_signed(&self) -> MlsResult<Vec<u8>> {
        codec::encode(&KeyPackageTbs {
            version: self.version,
            ciphersuite: self.ciphersuite,
            identity: &self.identity,
            identity_key: &self.identity_key,
            init_key: &self.init_key,
            extensions: &self.extensions,
            relays: &self.relays,
            lifetime: self.lifetime,
        })
    }

    /// Canonical export encoding
    pub fn encode(&self) -> MlsResult<EncodedKeyPackage> {
        codec::encode_framed(KEY_PACKAGE_MAGIC, KEY_PACKAGE_VERSION, self).map(EncodedKeyPackage)
    }

    /// Decode without verifying the signature
    pub fn decode(bytes: &[u8]) -> MlsResult<Self> {
        codec::decode_framed(KEY_PACKAGE_MAGIC, KEY_PACKAGE_VERSION, bytes)
            .map_err(|e| MlsError::MalformedKeyPackage(e.to_string()))
    }

    /// Check suite, key sizes and signature
    ///
    /// The lifetime is checked separately by [`KeyPackage::check_lifetime`].
    pub fn verify(&self, provider: &dyn CiphersuiteProvider) -> MlsResult<()> {
        if self.version != KEY_PACKAGE_VERSION {
            return Err(MlsError::MalformedKeyPackage(format!(
                "unsupported version {}",
                self.version
            )));
        }
        if self.ciphersuite != provider.suite_id() {
            return Err(MlsError::MalformedKeyPackage(format!(
                "unsupported ciphersuite 0x{:04x}",
                self.ciphersuite
            )));
        }
        if self.identity.is_empty() {
            return Err(MlsError::MalformedKeyPackage("empty identity".to_string()));
        }
        if self.init_key.len() != 32 || self.identity_key.len() != 32 {
            return Err(MlsError::MalformedKeyPackage("invalid key length".to_string()));
        }

        let tbs = self.to_be_signed()?;
        provider
            .verify(&self.identity_key, &tbs, &self.signature)
            .map_err(|_| MlsError::MalformedKeyPackage("signature verification failed".to_string()))
    }

    pub fn check_lifetime(&self, timestamp: u64) -> MlsResult<()> {
        if self.lifetime.is_valid_at(timestamp) {
            Ok(())
        } else {
            Err(MlsError::KeyPackageExpired(format!(
                "valid {}..={}, now {}",
                self.lifetime.not_before, self.lifetime.not_after, timestamp
            )))
        }
    }
}

/// Export encoding of a [`KeyPackage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedKeyPackage(pub Vec<u8>);

impl EncodedKeyPackage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> MlsResult<Self> {
        Ok(Self(hex::decode(s.trim())?))
    }

    /// Content-hash reference of this encoding
    pub fn key_package_ref(&self, provider: &dyn CiphersuiteProvider) -> KeyPackageRef {
        key_package_ref(provider, &self.0)
    }
}

impl AsRef<[u8]> for EncodedKeyPackage {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Reference of an encoded key package
pub fn key_package_ref(provider: &dyn CiphersuiteProvider, encoded: &[u8]) -> KeyPackageRef {
    KeyPackageRef(provider.hash(encoded))
}

/// Issues, parses and deletes key packages for one storage area
#[derive(Clone)]
pub struct KeyPackageStore {
    storage: Arc<dyn StorageProvider>,
    identities: Arc<dyn IdentityProvider>,
    provider: Arc<dyn CiphersuiteProvider>,
    lifetime: Duration,
    default_relays: Vec<String>,
}

impl KeyPackageStore {
    pub fn new(
        storage: Arc<dyn StorageProvider>,
        identities: Arc<dyn IdentityProvider>,
        provider: Arc<dyn CiphersuiteProvider>,
        lifetime: Duration,
        default_relays: Vec<String>,
    ) -> Self {
        Self { storage, identities, provider, lifetime, default_relays }
    }

    /// Issue a key package advertising the configured relays
    pub async fn issue(&self, identity: &str) -> MlsResult<(KeyPackage, EncodedKeyPackage)> {
        let relays = self.default_relays.clone();
        self.issue_with_relays(identity, relays).await
    }

    /// Issue a key package advertising `relays`
    pub async fn issue_with_relays(
        &self,
        identity: &str,
        relays: Vec<String>,
    ) -> MlsResult<(KeyPackage, EncodedKeyPackage)> {
        let identity_key = self.identities.verifying_key(identity).await?;
        let init = self.provider.generate_hpke_keypair();

        let mut key_package = KeyPackage {
            version: KEY_PACKAGE_VERSION,
            ciphersuite: self.provider.suite_id(),
            identity: identity.to_string(),
            identity_key,
            init_key: init.public.clone(),
            extensions: self.provider.supported_extensions(),
            relays,
            lifetime: Lifetime::from_now(self.lifetime),
            signature: Vec::new(),
        };
        let tbs = key_package.to_be_signed()?;
        key_package.signature = self.identities.sign(identity, &tbs).await?;

        let encoded = key_package.encode()?;
        let key_package_ref = encoded.key_package_ref(self.provider.as_ref());

        self.storage
            .commit(StorageTransaction::new().put_key_package(StoredKeyPackage {
                key_package_ref: key_package_ref.clone(),
                identity: identity.to_string(),
                encoded: encoded.0.clone(),
                init_private_key: init.private.clone(),
                expires_at: key_package.lifetime.not_after,
            }))
            .await?;

        record_counter(metrics::KEY_PACKAGES_ISSUED, 1);
        tracing::info!(identity, key_package_ref = %key_package_ref, "Issued key package");

        Ok((key_package, encoded))
    }

    /// Decode and validate a foreign key package
    pub fn parse(&self, encoded: &[u8]) -> MlsResult<KeyPackage> {
        let key_package = KeyPackage::decode(encoded)?;
        key_package.verify(self.provider.as_ref())?;
        key_package.check_lifetime(current_timestamp())?;
        Ok(key_package)
    }

    /// Remove a local key package and its private key; absent is not an error
    pub async fn delete(&self, encoded: &[u8]) -> MlsResult<()> {
        let key_package_ref = key_package_ref(self.provider.as_ref(), encoded);
        let existed = self.storage.load_key_package(&key_package_ref).await?.is_some();

        self.storage
            .commit(StorageTransaction::new().delete_key_package(key_package_ref.clone()))
            .await?;

        if existed {
            record_counter(metrics::KEY_PACKAGES_DELETED, 1);
        }
        tracing::debug!(key_package_ref = %key_package_ref, existed, "Deleted key package");
        Ok(())
    }

    /// References of every local key package
    pub async fn list(&self) -> MlsResult<Vec<KeyPackageRef>> {
        Ok(self
            .storage
            .list_key_packages()
            .await?
            .iter()
            .map(|stored| stored.key_package_ref.clone())
            .collect())
    }

    /// Delete local key packages whose lifetime has ended
    pub async fn purge_expired(&self) -> MlsResult<usize> {
        let now = current_timestamp();
        let expired: Vec<KeyPackageRef> = self
            .storage
            .list_key_packages()
            .await?
            .iter()
            .filter(|stored| stored.expires_at < now)
            .map(|stored| stored.key_package_ref.clone())
            .collect();

        if expired.is_empty() {
            return Ok(0);
        }

        let count = expired.len();
        let tx = expired
            .into_iter()
            .fold(StorageTransaction::new(), |tx, key_package_ref| {
                tx.delete_key_package(key_package_ref)
            });
        self.storage.commit(tx).await?;

        tracing::info!(count, "Purged expired key packages");
        Ok(count)
    }

    /// Local record for `key_package_ref`, including its private key
    pub(crate) async fn load_local(
        &self,
        key_package_ref: &KeyPackageRef,
    ) -> MlsResult<Option<StoredKeyPackage>> {
        self.storage.load_key_package(key_package_ref).await
    }
}

//! Storage Provider Trait
//!
//! Defines the interface for persisting group state, local key packages and
//! the ledger of consumed key packages.

use crate::core_mls::errors::MlsResult;
use crate::core_mls::types::{GroupId, KeyPackageRef};
use async_trait::async_trait;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Encoded group state for one group
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StoredGroup {
    #[zeroize(skip)]
    pub group_id: GroupId,
    #[zeroize(skip)]
    pub epoch: u64,
    /// Engine-encoded state, contains epoch secrets
    pub state: Vec<u8>,
}

impl std::fmt::Debug for StoredGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredGroup")
            .field("group_id", &self.group_id)
            .field("epoch", &self.epoch)
            .field("state_len", &self.state.len())
            .finish()
    }
}

/// A locally issued key package and its HPKE private key
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StoredKeyPackage {
    #[zeroize(skip)]
    pub key_package_ref: KeyPackageRef,
    #[zeroize(skip)]
    pub identity: String,
    #[zeroize(skip)]
    pub encoded: Vec<u8>,
    pub init_private_key: Vec<u8>,
    /// Unix seconds after which the package is no longer valid
    #[zeroize(skip)]
    pub expires_at: u64,
}

impl std::fmt::Debug for StoredKeyPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredKeyPackage")
            .field("key_package_ref", &self.key_package_ref)
            .field("identity", &self.identity)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// A batch of writes applied all-or-nothing by [`StorageProvider::commit`]
///
/// Deletions are applied before insertions, so a transaction may replace a
/// record it also deletes.
#[derive(Debug, Default)]
pub struct StorageTransaction {
    pub put_groups: Vec<StoredGroup>,
    pub delete_groups: Vec<GroupId>,
    pub put_key_packages: Vec<StoredKeyPackage>,
    pub delete_key_packages: Vec<KeyPackageRef>,
    pub consume_key_packages: Vec<KeyPackageRef>,
}

impl StorageTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_group(mut self, group: StoredGroup) -> Self {
        self.put_groups.push(group);
        self
    }

    pub fn delete_group(mut self, group_id: GroupId) -> Self {
        self.delete_groups.push(group_id);
        self
    }

    pub fn put_key_package(mut self, key_package: StoredKeyPackage) -> Self {
        self.put_key_packages.push(key_package);
        self
    }

    pub fn delete_key_package(mut self, key_package_ref: KeyPackageRef) -> Self {
        self.delete_key_packages.push(key_package_ref);
        self
    }

    /// Record a key package as spent by a create or add
    pub fn consume_key_package(mut self, key_package_ref: KeyPackageRef) -> Self {
        self.consume_key_packages.push(key_package_ref);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.put_groups.is_empty()
            && self.delete_groups.is_empty()
            && self.put_key_packages.is_empty()
            && self.delete_key_packages.is_empty()
            && self.consume_key_packages.is_empty()
    }
}

/// Storage provider trait for MLS state persistence
///
/// Implementations must ensure:
/// - Atomic writes (a transaction is applied fully or not at all)
/// - Durability (survive crashes)
/// - Consistency (reads see latest committed writes)
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Apply every write in `tx` atomically
    async fn commit(&self, tx: StorageTransaction) -> MlsResult<()>;

    /// Load the stored state for a group, if any
    async fn load_group(&self, group_id: &GroupId) -> MlsResult<Option<StoredGroup>>;

    /// List all group IDs currently stored
    async fn list_groups(&self) -> MlsResult<Vec<GroupId>>;

    /// Load a local key package by reference
    async fn load_key_package(
        &self,
        key_package_ref: &KeyPackageRef,
    ) -> MlsResult<Option<StoredKeyPackage>>;

    /// List every local key package
    async fn list_key_packages(&self) -> MlsResult<Vec<StoredKeyPackage>>;

    /// Whether a key package has been spent by a create or add
    async fn is_consumed(&self, key_package_ref: &KeyPackageRef) -> MlsResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_builder() {
        let tx = StorageTransaction::new();
        assert!(tx.is_empty());

        let tx = tx
            .delete_group(GroupId::new(vec![1]))
            .consume_key_package(KeyPackageRef(vec![2]));
        assert!(!tx.is_empty());
        assert_eq!(tx.delete_groups.len(), 1);
        assert_eq!(tx.consume_key_packages.len(), 1);
    }

    #[test]
    fn test_debug_hides_private_key() {
        let stored = StoredKeyPackage {
            key_package_ref: KeyPackageRef(vec![0xab]),
            identity: "alice".to_string(),
            encoded: vec![1, 2, 3],
            init_private_key: vec![0x42; 32],
            expires_at: 0,
        };
        let debug = format!("{:?}", stored);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("66, 66"));
    }
}

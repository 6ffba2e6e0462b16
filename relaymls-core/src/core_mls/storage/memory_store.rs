//! In-Memory Storage Provider
//!
//! Simple in-memory implementation for testing. A single lock covers every
//! table so a transaction is observed either fully or not at all.

use crate::core_mls::errors::MlsResult;
use crate::core_mls::traits::storage::{
    StorageProvider, StorageTransaction, StoredGroup, StoredKeyPackage,
};
use crate::core_mls::types::{GroupId, KeyPackageRef};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    groups: HashMap<GroupId, StoredGroup>,
    key_packages: HashMap<KeyPackageRef, StoredKeyPackage>,
    consumed: HashSet<KeyPackageRef>,
}

/// In-memory storage provider (for testing)
#[derive(Clone, Default)]
pub struct MemoryStorageProvider {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStorageProvider {
    /// Create a new in-memory storage provider
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageProvider for MemoryStorageProvider {
    async fn commit(&self, tx: StorageTransaction) -> MlsResult<()> {
        let mut tables = self.tables.write().await;

        for group_id in &tx.delete_groups {
            tables.groups.remove(group_id);
        }
        for key_package_ref in &tx.delete_key_packages {
            tables.key_packages.remove(key_package_ref);
        }
        for group in &tx.put_groups {
            tables.groups.insert(group.group_id.clone(), group.clone());
        }
        for key_package in &tx.put_key_packages {
            tables
                .key_packages
                .insert(key_package.key_package_ref.clone(), key_package.clone());
        }
        for key_package_ref in &tx.consume_key_packages {
            tables.consumed.insert(key_package_ref.clone());
        }

        Ok(())
    }

    async fn load_group(&self, group_id: &GroupId) -> MlsResult<Option<StoredGroup>> {
        Ok(self.tables.read().await.groups.get(group_id).cloned())
    }

    async fn list_groups(&self) -> MlsResult<Vec<GroupId>> {
        let mut groups: Vec<GroupId> = self.tables.read().await.groups.keys().cloned().collect();
        groups.sort();
        Ok(groups)
    }

    async fn load_key_package(
        &self,
        key_package_ref: &KeyPackageRef,
    ) -> MlsResult<Option<StoredKeyPackage>> {
        Ok(self.tables.read().await.key_packages.get(key_package_ref).cloned())
    }

    async fn list_key_packages(&self) -> MlsResult<Vec<StoredKeyPackage>> {
        Ok(self.tables.read().await.key_packages.values().cloned().collect())
    }

    async fn is_consumed(&self, key_package_ref: &KeyPackageRef) -> MlsResult<bool> {
        Ok(self.tables.read().await.consumed.contains(key_package_ref))
    }
}

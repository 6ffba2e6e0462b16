//! Shared fixtures for the integration tests

#![allow(dead_code)]

use relaymls_core::core_mls::MemoryIdentityProvider;
use relaymls_core::{CreateGroupParams, GroupCreated, MlsSession, SessionConfig, StorageBackend};
use std::path::Path;
use std::sync::Arc;

pub fn memory_config() -> SessionConfig {
    SessionConfig { storage: StorageBackend::Memory, ..SessionConfig::default() }
}

pub fn sqlite_config(dir: &Path) -> SessionConfig {
    SessionConfig {
        data_dir: dir.to_path_buf(),
        storage: StorageBackend::Sqlite,
        ..SessionConfig::default()
    }
}

/// In-memory session with a fresh signing key
pub async fn memory_session(identity: &str) -> MlsSession {
    MlsSession::init("unused", identity, memory_config()).await.unwrap()
}

/// SQLite session whose signing key is derived from `seed`
pub async fn sqlite_session(dir: &Path, identity: &str, seed: u8) -> MlsSession {
    let identities = MemoryIdentityProvider::new();
    identities.register_seed(identity, &[seed; 32]).await;
    MlsSession::init_with_identities(dir, identity, sqlite_config(dir), Arc::new(identities))
        .unwrap()
}

pub fn params(creator: &str, members: Vec<Vec<u8>>) -> CreateGroupParams {
    CreateGroupParams {
        name: "Test Group".to_string(),
        description: "integration".to_string(),
        member_key_packages: members,
        creator_identity: creator.to_string(),
        admin_identities: vec![],
        relays: vec!["wss://relay.example".to_string()],
    }
}

/// `creator` creates a group with every session in `members`, who all join
pub async fn group_of(creator: &MlsSession, members: &[&MlsSession]) -> GroupCreated {
    let mut key_packages = Vec::new();
    for member in members {
        let (_, kp) = member.issue_key_package(member.identity()).await.unwrap();
        key_packages.push(kp.0);
    }

    let created = creator.create_group(params(creator.identity(), key_packages)).await.unwrap();
    for (member, welcome) in members.iter().zip(&created.welcomes) {
        let joined = member.join_from_welcome(&welcome.to_bytes().unwrap()).await.unwrap();
        assert_eq!(joined.group_id(), created.group_id());
    }
    created
}

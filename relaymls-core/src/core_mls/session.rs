//! Session handle owning storage, identity and ciphersuite collaborators
//!
//! Every engine operation is a method on [`MlsSession`]. Operations on one
//! group hold that group's lock for the whole load, mutate and persist
//! cycle; distinct groups and key-package calls run in parallel.

use super::commit::{apply_commit, create_commit, CommitOutcome, Proposal};
use super::encryption::EpochSecrets;
use super::errors::{MlsError, MlsResult};
use super::extension::NostrGroupData;
use super::group::{group_context_hash, GroupState};
use super::key_package::{key_package_ref, EncodedKeyPackage, KeyPackage, KeyPackageStore};
use super::message::{ContentType, SerializedMessage};
use super::providers::{MemoryIdentityProvider, RustCryptoProvider};
use super::storage::{MemoryStorageProvider, SqlStorageProvider};
use super::traits::ciphersuite::{CiphersuiteId, CiphersuiteProvider, ExtensionType};
use super::traits::identity::IdentityProvider;
use super::traits::storage::{StorageProvider, StorageTransaction, StoredKeyPackage};
use super::types::{GroupId, KeyPackageRef, LeafIndex, Member};
use super::welcome::{open_welcome, seal_welcomes, VerifiedWelcome, WelcomeArtifact, WelcomePreview, WelcomeTarget};
use crate::config::{SessionConfig, StorageBackend};
use crate::metrics::{self, record_counter, record_gauge, Timer};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Inputs for [`MlsSession::create_group`]
#[derive(Debug, Clone, Default)]
pub struct CreateGroupParams {
    pub name: String,
    pub description: String,
    /// Encoded key packages of the invited members, in leaf order
    pub member_key_packages: Vec<Vec<u8>>,
    pub creator_identity: String,
    /// The creator is added when missing
    pub admin_identities: Vec<String>,
    pub relays: Vec<String>,
}

/// A created group and one welcome per invited member
#[derive(Debug)]
pub struct GroupCreated {
    pub state: GroupState,
    /// Same order as `CreateGroupParams::member_key_packages`
    pub welcomes: Vec<WelcomeArtifact>,
}

impl GroupCreated {
    pub fn group_id(&self) -> &GroupId {
        self.state.group_id()
    }
}

/// A group joined from a welcome
#[derive(Debug)]
pub struct GroupJoined {
    pub state: GroupState,
    pub preview: WelcomePreview,
}

impl GroupJoined {
    pub fn group_id(&self) -> &GroupId {
        self.state.group_id()
    }
}

/// Result of an epoch-advancing operation
#[derive(Debug)]
pub struct CommitOutput {
    /// Commit to deliver to the other members
    pub commit: SerializedMessage,
    /// Welcomes for members added by this commit
    pub welcomes: Vec<WelcomeArtifact>,
    /// Epoch the committer is now in
    pub epoch: u64,
}

/// Outcome of processing an incoming message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessedMessage {
    /// Decrypted application payload
    Application {
        sender_identity: String,
        sender_leaf: LeafIndex,
        payload: Vec<u8>,
    },
    /// A commit moved the group to `epoch`
    Commit { epoch: u64 },
    /// A commit removed this member; the group was deleted locally
    Removed,
}

/// Per-group critical sections
#[derive(Default)]
struct GroupLocks {
    locks: Mutex<HashMap<GroupId, Arc<Mutex<()>>>>,
}

impl GroupLocks {
    /// Lock `group_id`, dropping entries nobody holds or waits on
    ///
    /// Group ids arrive from the relay, so idle entries must not outlive
    /// the call that created them.
    async fn acquire(&self, group_id: &GroupId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(group_id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    async fn forget(&self, group_id: &GroupId) {
        self.locks.lock().await.remove(group_id);
    }
}

/// A member-side session bound to one storage area and local identity
pub struct MlsSession {
    identity: String,
    config: SessionConfig,
    storage: Arc<dyn StorageProvider>,
    identities: Arc<dyn IdentityProvider>,
    provider: Arc<dyn CiphersuiteProvider>,
    key_packages: KeyPackageStore,
    group_locks: GroupLocks,
    /// Serializes the consumed-ledger check with the write that spends
    consume_lock: Mutex<()>,
}

impl std::fmt::Debug for MlsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MlsSession")
            .field("identity", &self.identity)
            .field("storage", &self.config.storage)
            .finish_non_exhaustive()
    }
}

impl MlsSession {
    /// Open a session rooted at `path` for `identity`
    ///
    /// The identity gets a fresh in-memory signing key. Use
    /// [`MlsSession::init_with_identities`] when the key must survive the
    /// process.
    pub async fn init(
        path: impl AsRef<Path>,
        identity: &str,
        config: SessionConfig,
    ) -> MlsResult<Self> {
        let identities = MemoryIdentityProvider::new();
        identities.register(identity).await;
        Self::init_with_identities(path, identity, config, Arc::new(identities))
    }

    /// Open a session with a caller-supplied identity collaborator
    pub fn init_with_identities(
        path: impl AsRef<Path>,
        identity: &str,
        config: SessionConfig,
        identities: Arc<dyn IdentityProvider>,
    ) -> MlsResult<Self> {
        let storage: Arc<dyn StorageProvider> = match config.storage {
            StorageBackend::Sqlite => Arc::new(SqlStorageProvider::open(path, identity)?),
            StorageBackend::Memory => Arc::new(MemoryStorageProvider::new()),
        };
        Ok(Self::from_parts(identity, config, storage, identities, Arc::new(RustCryptoProvider::new())))
    }

    /// Assemble a session from explicit collaborators
    pub fn from_parts(
        identity: &str,
        config: SessionConfig,
        storage: Arc<dyn StorageProvider>,
        identities: Arc<dyn IdentityProvider>,
        provider: Arc<dyn CiphersuiteProvider>,
    ) -> Self {
        let key_packages = KeyPackageStore::new(
            storage.clone(),
            identities.clone(),
            provider.clone(),
            config.key_package_lifetime,
            config.relays.clone(),
        );

        info!(identity, storage = ?config.storage, "Initialized MLS session");

        Self {
            identity: identity.to_string(),
            config,
            storage,
            identities,
            provider,
            key_packages,
            group_locks: GroupLocks::default(),
            consume_lock: Mutex::new(()),
        }
    }

    /// Local identity this session was opened for
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn ciphersuite(&self) -> CiphersuiteId {
        self.provider.suite_id()
    }

    pub fn ciphersuite_name(&self) -> &'static str {
        self.provider.suite_name()
    }

    pub fn extensions(&self) -> Vec<ExtensionType> {
        self.provider.supported_extensions()
    }

    // ---- key packages ----

    /// Issue and persist a key package for `identity`
    pub async fn issue_key_package(
        &self,
        identity: &str,
    ) -> MlsResult<(KeyPackage, EncodedKeyPackage)> {
        self.key_packages.issue(identity).await
    }

    /// Issue a key package advertising `relays` instead of the configured ones
    pub async fn issue_key_package_with_relays(
        &self,
        identity: &str,
        relays: Vec<String>,
    ) -> MlsResult<(KeyPackage, EncodedKeyPackage)> {
        self.key_packages.issue_with_relays(identity, relays).await
    }

    pub fn parse_key_package(&self, encoded: &[u8]) -> MlsResult<KeyPackage> {
        self.key_packages.parse(encoded)
    }

    pub async fn delete_key_package(&self, encoded: &[u8]) -> MlsResult<()> {
        self.key_packages.delete(encoded).await
    }

    pub async fn list_key_packages(&self) -> MlsResult<Vec<KeyPackageRef>> {
        self.key_packages.list().await
    }

    pub async fn purge_expired_key_packages(&self) -> MlsResult<usize> {
        self.key_packages.purge_expired().await
    }

    // ---- create / join ----

    /// Create a group with the creator at leaf 0 and one welcome per member
    pub async fn create_group(&self, params: CreateGroupParams) -> MlsResult<GroupCreated> {
        let timer = Timer::new(metrics::CREATE_DURATION);
        let provider = self.provider.as_ref();

        if params.member_key_packages.is_empty() {
            return Err(MlsError::EmptyMembership);
        }
        if params.member_key_packages.len() + 1 > self.config.max_group_size {
            return Err(MlsError::InvalidInput(format!(
                "Group of {} exceeds the maximum of {} members",
                params.member_key_packages.len() + 1,
                self.config.max_group_size
            )));
        }

        let mut seen = HashSet::from([params.creator_identity.clone()]);
        let mut invited = Vec::with_capacity(params.member_key_packages.len());
        for encoded in &params.member_key_packages {
            let key_package = self.key_packages.parse(encoded)?;
            if !seen.insert(key_package.identity.clone()) {
                return Err(MlsError::DuplicateMember(key_package.identity));
            }
            invited.push((key_package_ref(provider, encoded), key_package));
        }

        let mut admins = params.admin_identities.clone();
        if !admins.contains(&params.creator_identity) {
            admins.insert(0, params.creator_identity.clone());
        }
        if let Some(outsider) = admins.iter().find(|admin| !seen.contains(*admin)) {
            return Err(MlsError::InvalidInput(format!("Admin {} is not a group member", outsider)));
        }

        let creator_key = self.identities.verifying_key(&params.creator_identity).await?;

        let _consume = self.consume_lock.lock().await;
        self.ensure_unspent(invited.iter().map(|(r, _)| r)).await?;

        let leaf = provider.generate_hpke_keypair();
        let mut roster = vec![Member {
            leaf_index: 0,
            identity: params.creator_identity.clone(),
            identity_key: creator_key,
            encryption_key: leaf.public.clone(),
        }];
        let mut targets = Vec::with_capacity(invited.len());
        for (position, (key_package_ref, key_package)) in invited.iter().enumerate() {
            let leaf_index = LeafIndex::try_from(position + 1)
                .map_err(|_| MlsError::InvalidInput("Too many members".to_string()))?;
            roster.push(Member {
                leaf_index,
                identity: key_package.identity.clone(),
                identity_key: key_package.identity_key.clone(),
                encryption_key: key_package.init_key.clone(),
            });
            targets.push(WelcomeTarget {
                leaf_index,
                key_package_ref: key_package_ref.clone(),
                init_key: key_package.init_key.clone(),
            });
        }

        let group_id = GroupId::random();
        let group_data =
            NostrGroupData::new(params.name.clone(), params.description.clone(), admins, params.relays.clone());
        let context_hash = group_context_hash(provider, &group_id, 0, &roster, &group_data)?;
        let init_secret = Zeroizing::new(provider.random_bytes(provider.hash_len()));
        let zero_commit = Zeroizing::new(vec![0u8; provider.hash_len()]);
        let secrets = EpochSecrets::derive(provider, &init_secret, &zero_commit, &context_hash)?;

        let state = GroupState::new(
            group_id.clone(),
            0,
            provider.suite_id(),
            roster,
            0,
            leaf.private.clone(),
            secrets,
            group_data,
        );

        let welcomes = seal_welcomes(
            provider,
            self.identities.as_ref(),
            &params.creator_identity,
            &state,
            &targets,
        )
        .await?;

        let tx = invited.into_iter().fold(
            StorageTransaction::new().put_group(state.to_stored()?),
            |tx, (key_package_ref, _)| tx.consume_key_package(key_package_ref),
        );
        self.storage.commit(tx).await?;

        record_counter(metrics::GROUPS_CREATED, 1);
        self.refresh_active_groups().await;
        timer.stop();

        info!(
            group_id = %group_id,
            name = %params.name,
            members = state.members().len(),
            "Created group"
        );

        Ok(GroupCreated { state, welcomes })
    }

    /// Inspect a welcome without joining or consuming the key package
    pub async fn preview_welcome(&self, welcome: &[u8]) -> MlsResult<WelcomePreview> {
        let artifact = WelcomeArtifact::from_bytes(welcome)?;
        let (_, verified) = self.unseal_welcome(&artifact).await?;
        let preview = WelcomePreview::from(&verified);

        debug!(group_id = %preview.group_id, epoch = preview.epoch, "Previewed welcome");
        Ok(preview)
    }

    /// Join a group from a welcome, spending the local key package
    pub async fn join_from_welcome(&self, welcome: &[u8]) -> MlsResult<GroupJoined> {
        let timer = Timer::new(metrics::JOIN_DURATION);

        let artifact = WelcomeArtifact::from_bytes(welcome)?;
        let (stored, verified) = self.unseal_welcome(&artifact).await?;
        let preview = WelcomePreview::from(&verified);

        let local = KeyPackage::decode(&stored.encoded)
            .map_err(|e| MlsError::Storage(format!("Local key package unreadable: {}", e)))?;
        let joiner = verified
            .roster
            .iter()
            .find(|m| m.leaf_index == verified.joiner_leaf)
            .ok_or_else(|| MlsError::WelcomeDecryptFailed("joiner not in roster".to_string()))?;
        if joiner.identity != local.identity || joiner.encryption_key != local.init_key {
            return Err(MlsError::WelcomeDecryptFailed(
                "joiner leaf does not match the key package".to_string(),
            ));
        }

        let _guard = self.group_locks.acquire(&verified.group_id).await;
        if self.storage.load_group(&verified.group_id).await?.is_some() {
            return Err(MlsError::DuplicateGroup(verified.group_id.to_hex()));
        }

        let VerifiedWelcome { group_id, epoch, ciphersuite, roster, joiner_leaf, secrets, group_data } =
            verified;
        let state = GroupState::new(
            group_id,
            epoch,
            ciphersuite,
            roster,
            joiner_leaf,
            stored.init_private_key.clone(),
            secrets,
            group_data,
        );

        self.storage
            .commit(
                StorageTransaction::new()
                    .put_group(state.to_stored()?)
                    .delete_key_package(stored.key_package_ref.clone()),
            )
            .await?;

        record_counter(metrics::GROUPS_JOINED, 1);
        self.refresh_active_groups().await;
        timer.stop();

        info!(
            group_id = %state.group_id(),
            epoch = state.epoch(),
            leaf = state.own_leaf_index(),
            "Joined group from welcome"
        );

        Ok(GroupJoined { state, preview })
    }

    async fn unseal_welcome(
        &self,
        artifact: &WelcomeArtifact,
    ) -> MlsResult<(StoredKeyPackage, VerifiedWelcome)> {
        let stored = self
            .key_packages
            .load_local(&artifact.key_package_ref)
            .await?
            .ok_or_else(|| MlsError::NoMatchingKeyPackage(artifact.key_package_ref.to_string()))?;
        let verified = open_welcome(self.provider.as_ref(), artifact, &stored.init_private_key)?;
        Ok((stored, verified))
    }

    // ---- message path ----

    /// Encrypt an application payload at the group's current epoch
    pub async fn encrypt_message(
        &self,
        group_id: &GroupId,
        payload: &[u8],
    ) -> MlsResult<SerializedMessage> {
        let timer = Timer::new(metrics::ENCRYPTION_DURATION);
        let _guard = self.group_locks.acquire(group_id).await;

        let mut state = self.load_state(group_id).await?;
        let message = state.seal(self.provider.as_ref(), ContentType::Application, payload)?;
        self.storage.commit(StorageTransaction::new().put_group(state.to_stored()?)).await?;

        record_counter(metrics::MESSAGES_ENCRYPTED, 1);
        timer.stop();
        debug!(
            group_id = %group_id,
            epoch = state.epoch(),
            counter = state.send_counter,
            bytes = payload.len(),
            "Encrypted message"
        );

        Ok(message)
    }

    /// Decrypt an incoming message or apply an incoming commit
    pub async fn process_message(
        &self,
        group_id: &GroupId,
        message: &[u8],
    ) -> MlsResult<ProcessedMessage> {
        let timer = Timer::new(metrics::DECRYPTION_DURATION);
        let _guard = self.group_locks.acquire(group_id).await;

        let state = self.load_state(group_id).await?;
        let result = self.process_locked(state, message).await;
        match &result {
            Ok(_) => {
                record_counter(metrics::MESSAGES_DECRYPTED, 1);
                timer.stop();
            }
            Err(e) => {
                record_counter(metrics::MESSAGES_REJECTED, 1);
                warn!(group_id = %group_id, error = %e, "Rejected message");
            }
        }
        result
    }

    async fn process_locked(
        &self,
        mut state: GroupState,
        message: &[u8],
    ) -> MlsResult<ProcessedMessage> {
        let provider = self.provider.as_ref();
        let message = SerializedMessage::from_bytes(message)?;
        let (sender, payload) = state.open(provider, &message)?;

        match message.content_type {
            ContentType::Application => {
                let sender_identity = state
                    .member(sender.leaf_index)
                    .map(|m| m.identity.clone())
                    .unwrap_or_default();
                self.storage.commit(StorageTransaction::new().put_group(state.to_stored()?)).await?;

                debug!(
                    group_id = %state.group_id(),
                    sender = sender.leaf_index,
                    counter = sender.counter,
                    "Decrypted message"
                );
                Ok(ProcessedMessage::Application {
                    sender_identity,
                    sender_leaf: sender.leaf_index,
                    payload,
                })
            }
            ContentType::Commit => match apply_commit(provider, &state, sender, &payload)? {
                CommitOutcome::Advanced(next) => {
                    self.storage
                        .commit(StorageTransaction::new().put_group(next.to_stored()?))
                        .await?;
                    record_counter(metrics::COMMITS_APPLIED, 1);
                    info!(
                        group_id = %next.group_id(),
                        epoch = next.epoch(),
                        committer = sender.leaf_index,
                        "Applied commit"
                    );
                    Ok(ProcessedMessage::Commit { epoch: next.epoch() })
                }
                CommitOutcome::Removed => {
                    self.storage
                        .commit(StorageTransaction::new().delete_group(state.group_id().clone()))
                        .await?;
                    record_counter(metrics::GROUPS_DELETED, 1);
                    self.refresh_active_groups().await;
                    info!(group_id = %state.group_id(), "Removed from group");
                    Ok(ProcessedMessage::Removed)
                }
            },
        }
    }

    // ---- epoch advancement ----

    /// Add the holders of `key_packages` in one commit
    pub async fn add_members(
        &self,
        group_id: &GroupId,
        key_packages: &[Vec<u8>],
    ) -> MlsResult<CommitOutput> {
        if key_packages.is_empty() {
            return Err(MlsError::EmptyMembership);
        }
        let mut refs = Vec::with_capacity(key_packages.len());
        for encoded in key_packages {
            self.key_packages.parse(encoded)?;
            refs.push(key_package_ref(self.provider.as_ref(), encoded));
        }

        let proposals =
            key_packages.iter().map(|kp| Proposal::Add { key_package: kp.clone() }).collect();
        self.commit(group_id, |_| Ok(proposals), None, refs).await
    }

    /// Remove the members holding `identities` in one commit
    pub async fn remove_members(
        &self,
        group_id: &GroupId,
        identities: &[String],
    ) -> MlsResult<CommitOutput> {
        if identities.is_empty() {
            return Err(MlsError::InvalidInput("No members to remove".to_string()));
        }
        let build = |state: &GroupState| {
            identities
                .iter()
                .map(|identity| {
                    state
                        .member_by_identity(identity)
                        .map(|m| Proposal::Remove { leaf_index: m.leaf_index })
                        .ok_or_else(|| MlsError::InvalidInput(format!("{} is not a member", identity)))
                })
                .collect::<MlsResult<Vec<_>>>()
        };
        self.commit(group_id, build, None, Vec::new()).await
    }

    /// Rotate this member's leaf encryption key
    pub async fn self_update(&self, group_id: &GroupId) -> MlsResult<CommitOutput> {
        let leaf = self.provider.generate_hpke_keypair();
        let proposals = vec![Proposal::Update { encryption_key: leaf.public.clone() }];
        self.commit(group_id, |_| Ok(proposals), Some(leaf.private.clone()), Vec::new()).await
    }

    /// Build proposals against the locked state, then commit and persist
    async fn commit<F>(
        &self,
        group_id: &GroupId,
        build: F,
        new_leaf_private_key: Option<Vec<u8>>,
        spent: Vec<KeyPackageRef>,
    ) -> MlsResult<CommitOutput>
    where
        F: FnOnce(&GroupState) -> MlsResult<Vec<Proposal>>,
    {
        let provider = self.provider.as_ref();
        let _guard = self.group_locks.acquire(group_id).await;
        let mut state = self.load_state(group_id).await?;
        let proposals = build(&state)?;

        let _consume = self.consume_lock.lock().await;
        self.ensure_unspent(spent.iter()).await?;

        let prepared =
            create_commit(provider, self.identities.as_ref(), &state, proposals, new_leaf_private_key)
                .await?;
        if prepared.next_state.members().len() > self.config.max_group_size {
            return Err(MlsError::InvalidInput(format!(
                "Group would exceed the maximum of {} members",
                self.config.max_group_size
            )));
        }

        let commit = state.seal(provider, ContentType::Commit, &prepared.commit.to_bytes()?)?;
        let signer = prepared
            .next_state
            .own_identity()
            .ok_or_else(|| MlsError::InvalidInput("Own leaf missing from roster".to_string()))?
            .to_string();
        let welcomes = seal_welcomes(
            provider,
            self.identities.as_ref(),
            &signer,
            &prepared.next_state,
            &prepared.added,
        )
        .await?;

        let tx = spent.into_iter().fold(
            StorageTransaction::new().put_group(prepared.next_state.to_stored()?),
            |tx, key_package_ref| tx.consume_key_package(key_package_ref),
        );
        self.storage.commit(tx).await?;

        let epoch = prepared.next_state.epoch();
        record_counter(metrics::COMMITS_CREATED, 1);
        info!(
            group_id = %group_id,
            epoch,
            added = prepared.added.len(),
            removed = prepared.removed.len(),
            "Created commit"
        );

        Ok(CommitOutput { commit, welcomes, epoch })
    }

    // ---- queries and lifecycle ----

    pub async fn group(&self, group_id: &GroupId) -> MlsResult<GroupState> {
        self.load_state(group_id).await
    }

    pub async fn groups(&self) -> MlsResult<Vec<GroupId>> {
        self.storage.list_groups().await
    }

    pub async fn members(&self, group_id: &GroupId) -> MlsResult<Vec<Member>> {
        Ok(self.load_state(group_id).await?.members().to_vec())
    }

    /// Exporter secret of the current epoch and that epoch
    pub async fn exporter_secret(&self, group_id: &GroupId) -> MlsResult<(Vec<u8>, u64)> {
        let state = self.load_state(group_id).await?;
        Ok((state.exporter_secret().to_vec(), state.epoch()))
    }

    /// Derive a labelled secret from the current epoch's exporter secret
    pub async fn export_secret(
        &self,
        group_id: &GroupId,
        label: &str,
        context: &[u8],
        len: usize,
    ) -> MlsResult<Vec<u8>> {
        let state = self.load_state(group_id).await?;
        state.secrets().export(self.provider.as_ref(), label, context, len)
    }

    /// Drop a group and its secrets
    pub async fn delete_group(&self, group_id: &GroupId) -> MlsResult<()> {
        {
            let _guard = self.group_locks.acquire(group_id).await;
            let state = self.load_state(group_id).await?;
            self.storage
                .commit(StorageTransaction::new().delete_group(group_id.clone()))
                .await?;
            drop(state);
        }
        self.group_locks.forget(group_id).await;

        record_counter(metrics::GROUPS_DELETED, 1);
        self.refresh_active_groups().await;
        info!(group_id = %group_id, "Deleted group");
        Ok(())
    }

    async fn load_state(&self, group_id: &GroupId) -> MlsResult<GroupState> {
        let stored = self
            .storage
            .load_group(group_id)
            .await?
            .ok_or_else(|| MlsError::UnknownGroup(group_id.to_hex()))?;
        GroupState::from_stored(&stored)
    }

    async fn ensure_unspent(
        &self,
        refs: impl Iterator<Item = &KeyPackageRef>,
    ) -> MlsResult<()> {
        for key_package_ref in refs {
            if self.storage.is_consumed(key_package_ref).await? {
                return Err(MlsError::UnspentPackageRequired(key_package_ref.to_string()));
            }
        }
        Ok(())
    }

    async fn refresh_active_groups(&self) {
        match self.storage.list_groups().await {
            Ok(groups) => record_gauge(metrics::GROUPS_ACTIVE, groups.len() as f64),
            Err(e) => debug!(error = %e, "Could not count active groups"),
        }
    }
}

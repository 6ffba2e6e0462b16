//! Group state - the durable source of truth for one group
//!
//! GroupState ties together:
//! - Roster and own leaf key
//! - Epoch tracking and epoch secrets
//! - Send counter and per-sender replay watermarks
//! - Nostr group data

use super::codec;
use super::encryption::{
    open_message, open_sender_data, seal_message, EpochSecrets, MessageContext, SenderData,
};
use super::errors::{MlsError, MlsResult};
use super::extension::NostrGroupData;
use super::message::{ContentType, SerializedMessage};
use super::traits::ciphersuite::{CiphersuiteId, CiphersuiteProvider};
use super::traits::storage::StoredGroup;
use super::types::{GroupId, LeafIndex, Member};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeroize::Zeroize;

const GROUP_STATE_MAGIC: &[u8; 4] = b"RMGS";
const GROUP_STATE_VERSION: u8 = 1;

/// Fields hashed into the group context
#[derive(Serialize)]
struct GroupContext<'a> {
    group_id: &'a GroupId,
    epoch: u64,
    ciphersuite: CiphersuiteId,
    roster: &'a [Member],
    group_data: &'a [u8],
}

/// Hash of the group context for `epoch`
///
/// Binds the group id, the roster (including every leaf encryption key)
/// and the encoded group data.
pub(crate) fn group_context_hash(
    provider: &dyn CiphersuiteProvider,
    group_id: &GroupId,
    epoch: u64,
    roster: &[Member],
    group_data: &NostrGroupData,
) -> MlsResult<Vec<u8>> {
    let group_data = group_data.encode()?;
    let context = codec::encode(&GroupContext {
        group_id,
        epoch,
        ciphersuite: provider.suite_id(),
        roster,
        group_data: &group_data,
    })?;
    Ok(provider.hash(&context))
}

/// Local state of one group
#[derive(Clone, Serialize, Deserialize)]
pub struct GroupState {
    pub(crate) group_id: GroupId,
    pub(crate) epoch: u64,
    pub(crate) ciphersuite: CiphersuiteId,
    /// Ordered by leaf index
    pub(crate) roster: Vec<Member>,
    pub(crate) own_leaf: LeafIndex,
    pub(crate) own_leaf_private_key: Vec<u8>,
    pub(crate) secrets: EpochSecrets,
    /// Last counter used by this member in the current epoch
    pub(crate) send_counter: u64,
    /// Highest counter accepted per sender in the current epoch
    pub(crate) receive_watermarks: BTreeMap<LeafIndex, u64>,
    pub(crate) group_data: NostrGroupData,
}

impl Drop for GroupState {
    fn drop(&mut self) {
        self.own_leaf_private_key.zeroize();
    }
}

impl std::fmt::Debug for GroupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupState")
            .field("group_id", &self.group_id)
            .field("epoch", &self.epoch)
            .field("members", &self.roster.len())
            .field("own_leaf", &self.own_leaf)
            .field("name", &self.group_data.name)
            .finish_non_exhaustive()
    }
}

impl GroupState {
    /// State at a freshly derived epoch
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        group_id: GroupId,
        epoch: u64,
        ciphersuite: CiphersuiteId,
        roster: Vec<Member>,
        own_leaf: LeafIndex,
        own_leaf_private_key: Vec<u8>,
        secrets: EpochSecrets,
        group_data: NostrGroupData,
    ) -> Self {
        Self {
            group_id,
            epoch,
            ciphersuite,
            roster,
            own_leaf,
            own_leaf_private_key,
            secrets,
            send_counter: 0,
            receive_watermarks: BTreeMap::new(),
            group_data,
        }
    }

    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn ciphersuite(&self) -> CiphersuiteId {
        self.ciphersuite
    }

    pub fn members(&self) -> &[Member] {
        &self.roster
    }

    pub fn own_leaf_index(&self) -> LeafIndex {
        self.own_leaf
    }

    pub fn own_identity(&self) -> Option<&str> {
        self.member(self.own_leaf).map(|m| m.identity.as_str())
    }

    pub fn group_data(&self) -> &NostrGroupData {
        &self.group_data
    }

    /// Exporter secret of the current epoch
    pub fn exporter_secret(&self) -> &[u8] {
        self.secrets.exporter_secret()
    }

    pub(crate) fn secrets(&self) -> &EpochSecrets {
        &self.secrets
    }

    pub fn member(&self, leaf_index: LeafIndex) -> Option<&Member> {
        self.roster.iter().find(|m| m.leaf_index == leaf_index)
    }

    /// Counter of the last message this member sent in the current epoch
    pub fn send_counter(&self) -> u64 {
        self.send_counter
    }

    pub fn member_by_identity(&self, identity: &str) -> Option<&Member> {
        self.roster.iter().find(|m| m.identity == identity)
    }

    /// Leaf index assigned to the next added member
    pub(crate) fn next_leaf_index(&self) -> LeafIndex {
        self.roster.iter().map(|m| m.leaf_index + 1).max().unwrap_or(0)
    }

    pub(crate) fn context_hash(&self, provider: &dyn CiphersuiteProvider) -> MlsResult<Vec<u8>> {
        group_context_hash(provider, &self.group_id, self.epoch, &self.roster, &self.group_data)
    }

    /// Encrypt a payload at the next own counter
    ///
    /// The counter is advanced in this state; callers persist it.
    pub(crate) fn seal(
        &mut self,
        provider: &dyn CiphersuiteProvider,
        content_type: ContentType,
        payload: &[u8],
    ) -> MlsResult<SerializedMessage> {
        let counter = self
            .send_counter
            .checked_add(1)
            .ok_or_else(|| MlsError::InvalidInput("Send counter exhausted".to_string()))?;
        let sender = SenderData { leaf_index: self.own_leaf, counter };
        let context = MessageContext {
            group_id: &self.group_id,
            epoch: self.epoch,
            content_type: content_type.as_u8(),
        };

        let sealed = seal_message(provider, &self.secrets, context, sender, payload)?;
        self.send_counter = counter;

        Ok(SerializedMessage {
            content_type,
            group_id: self.group_id.clone(),
            epoch: self.epoch,
            nonce: sealed.nonce,
            encrypted_sender_data: sealed.encrypted_sender_data,
            ciphertext: sealed.ciphertext,
        })
    }

    /// Decrypt a message for the current epoch and advance the sender's
    /// watermark
    pub(crate) fn open(
        &mut self,
        provider: &dyn CiphersuiteProvider,
        message: &SerializedMessage,
    ) -> MlsResult<(SenderData, Vec<u8>)> {
        if message.group_id != self.group_id {
            return Err(MlsError::DecryptionFailed("Message is for another group".to_string()));
        }
        if message.epoch != self.epoch {
            return Err(MlsError::EpochMismatch { expected: self.epoch, actual: message.epoch });
        }

        let context = MessageContext {
            group_id: &self.group_id,
            epoch: self.epoch,
            content_type: message.content_type.as_u8(),
        };

        let sender = open_sender_data(
            provider,
            &self.secrets,
            context,
            &message.nonce,
            &message.encrypted_sender_data,
        )?;
        if self.member(sender.leaf_index).is_none() {
            return Err(MlsError::DecryptionFailed(format!(
                "Unknown sender leaf {}",
                sender.leaf_index
            )));
        }

        let plaintext = open_message(
            provider,
            &self.secrets,
            context,
            sender,
            &message.nonce,
            &message.ciphertext,
        )?;

        let watermark = self.receive_watermarks.get(&sender.leaf_index).copied().unwrap_or(0);
        if sender.counter <= watermark {
            return Err(MlsError::ReplayedCounter {
                sender: sender.leaf_index,
                counter: sender.counter,
            });
        }
        self.receive_watermarks.insert(sender.leaf_index, sender.counter);

        Ok((sender, plaintext))
    }

    /// Move to the next epoch with a new roster and secrets
    ///
    /// Counters and watermarks restart; the previous epoch's secrets are
    /// dropped (and zeroized).
    pub(crate) fn enter_epoch(
        &mut self,
        epoch: u64,
        roster: Vec<Member>,
        secrets: EpochSecrets,
        own_leaf_private_key: Option<Vec<u8>>,
    ) {
        self.epoch = epoch;
        self.roster = roster;
        self.secrets = secrets;
        if let Some(key) = own_leaf_private_key {
            self.own_leaf_private_key.zeroize();
            self.own_leaf_private_key = key;
        }
        self.send_counter = 0;
        self.receive_watermarks.clear();
    }

    pub fn to_bytes(&self) -> MlsResult<Vec<u8>> {
        codec::encode_framed(GROUP_STATE_MAGIC, GROUP_STATE_VERSION, self)
    }

    pub fn from_bytes(bytes: &[u8]) -> MlsResult<Self> {
        codec::decode_framed(GROUP_STATE_MAGIC, GROUP_STATE_VERSION, bytes)
    }

    pub(crate) fn to_stored(&self) -> MlsResult<StoredGroup> {
        Ok(StoredGroup {
            group_id: self.group_id.clone(),
            epoch: self.epoch,
            state: self.to_bytes()?,
        })
    }

    pub(crate) fn from_stored(stored: &StoredGroup) -> MlsResult<Self> {
        let state = Self::from_bytes(&stored.state)?;
        if state.group_id != stored.group_id || state.epoch != stored.epoch {
            return Err(MlsError::Storage(format!(
                "Stored state for {} does not match its record",
                stored.group_id
            )));
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_mls::providers::RustCryptoProvider;

    fn member(leaf_index: LeafIndex, identity: &str) -> Member {
        Member {
            leaf_index,
            identity: identity.to_string(),
            identity_key: vec![leaf_index as u8; 32],
            encryption_key: vec![0x10 + leaf_index as u8; 32],
        }
    }

    fn state_pair(provider: &RustCryptoProvider) -> (GroupState, GroupState) {
        let group_id = GroupId::random();
        let roster = vec![member(0, "alice"), member(1, "bob")];
        let group_data = NostrGroupData::new("Test Group", "", vec!["alice".to_string()], vec![]);
        let hash = group_context_hash(provider, &group_id, 0, &roster, &group_data).unwrap();
        let secrets = EpochSecrets::derive(provider, &[3u8; 32], &[0u8; 32], &hash).unwrap();

        let alice = GroupState::new(
            group_id.clone(),
            0,
            provider.suite_id(),
            roster.clone(),
            0,
            vec![1; 32],
            secrets.clone(),
            group_data.clone(),
        );
        let bob = GroupState::new(group_id, 0, provider.suite_id(), roster, 1, vec![2; 32], secrets, group_data);
        (alice, bob)
    }

    #[test]
    fn test_seal_open_between_members() {
        let provider = RustCryptoProvider::new();
        let (mut alice, mut bob) = state_pair(&provider);

        let msg = alice.seal(&provider, ContentType::Application, b"hello").unwrap();
        assert_eq!(alice.send_counter, 1);
        assert_eq!(msg.epoch, 0);

        let (sender, plaintext) = bob.open(&provider, &msg).unwrap();
        assert_eq!(sender.leaf_index, 0);
        assert_eq!(plaintext, b"hello");
        assert_eq!(bob.epoch(), 0);
    }

    #[test]
    fn test_replay_rejected() {
        let provider = RustCryptoProvider::new();
        let (mut alice, mut bob) = state_pair(&provider);

        let msg = alice.seal(&provider, ContentType::Application, b"once").unwrap();
        bob.open(&provider, &msg).unwrap();
        assert!(matches!(
            bob.open(&provider, &msg),
            Err(MlsError::ReplayedCounter { sender: 0, counter: 1 })
        ));
    }

    #[test]
    fn test_own_message_processable_once() {
        let provider = RustCryptoProvider::new();
        let (mut alice, _) = state_pair(&provider);

        let first = alice.seal(&provider, ContentType::Application, b"a").unwrap();
        let second = alice.seal(&provider, ContentType::Application, b"b").unwrap();
        assert_eq!(alice.open(&provider, &first).unwrap().1, b"a");
        assert_eq!(alice.open(&provider, &second).unwrap().1, b"b");
        assert!(alice.open(&provider, &first).is_err());
    }

    #[test]
    fn test_epoch_and_group_checks() {
        let provider = RustCryptoProvider::new();
        let (mut alice, mut bob) = state_pair(&provider);
        let msg = alice.seal(&provider, ContentType::Application, b"x").unwrap();

        let mut wrong_epoch = msg.clone();
        wrong_epoch.epoch = 1;
        assert!(matches!(
            bob.open(&provider, &wrong_epoch),
            Err(MlsError::EpochMismatch { expected: 0, actual: 1 })
        ));

        let mut wrong_group = msg.clone();
        wrong_group.group_id = GroupId::random();
        assert!(matches!(bob.open(&provider, &wrong_group), Err(MlsError::DecryptionFailed(_))));

        let mut wrong_type = msg;
        wrong_type.content_type = ContentType::Commit;
        assert!(matches!(bob.open(&provider, &wrong_type), Err(MlsError::DecryptionFailed(_))));
    }

    #[test]
    fn test_state_bytes_and_stored_record() {
        let provider = RustCryptoProvider::new();
        let (mut alice, _) = state_pair(&provider);
        alice.seal(&provider, ContentType::Application, b"x").unwrap();

        let stored = alice.to_stored().unwrap();
        let restored = GroupState::from_stored(&stored).unwrap();
        assert_eq!(restored.send_counter, 1);
        assert_eq!(restored.members(), alice.members());
        assert_eq!(restored.exporter_secret(), alice.exporter_secret());

        let mismatched = StoredGroup { group_id: GroupId::random(), epoch: 0, state: stored.state.clone() };
        assert!(GroupState::from_stored(&mismatched).is_err());
    }

    #[test]
    fn test_next_leaf_index_skips_gaps() {
        let provider = RustCryptoProvider::new();
        let (mut alice, _) = state_pair(&provider);
        alice.roster.retain(|m| m.leaf_index != 1);
        alice.roster.push(member(4, "dave"));
        assert_eq!(alice.next_leaf_index(), 5);
    }
}

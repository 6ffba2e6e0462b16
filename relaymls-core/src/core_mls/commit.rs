//! Commits for applying group state changes
//!
//! A commit:
//! - Carries the proposals it applies (add, remove, update)
//! - Distributes a fresh commit secret to every remaining member
//! - Is signed by the committer
//! - Advances the group to exactly the next epoch
//!
//! Commits travel as `ContentType::Commit` messages encrypted under the
//! epoch they leave, so only current members can read them.

use super::codec::{self, concat_prefixed};
use super::encryption::{EpochSecrets, SenderData};
use super::errors::{MlsError, MlsResult};
use super::group::{group_context_hash, GroupState};
use super::key_package::{key_package_ref, KeyPackage};
use super::traits::ciphersuite::{CiphersuiteProvider, HpkeCiphertext};
use super::traits::identity::IdentityProvider;
use super::types::{LeafIndex, Member};
use super::welcome::WelcomeTarget;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

/// HPKE info string for commit secrets
const COMMIT_HPKE_INFO: &[u8] = b"relaymls 1.0 commit secret";

/// A single change to the roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Proposal {
    /// Add the holder of an encoded key package
    Add { key_package: Vec<u8> },
    /// Remove the member at a leaf
    Remove { leaf_index: LeafIndex },
    /// Replace the committer's leaf encryption key
    Update { encryption_key: Vec<u8> },
}

impl Proposal {
    fn changes_membership(&self) -> bool {
        !matches!(self, Proposal::Update { .. })
    }
}

/// Commit secret sealed to one remaining member
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EncryptedCommitSecret {
    recipient: LeafIndex,
    ciphertext: HpkeCiphertext,
}

/// Signed commit carried in a `Commit` message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Commit {
    committer: LeafIndex,
    /// Epoch being left
    epoch: u64,
    proposals: Vec<Proposal>,
    secrets: Vec<EncryptedCommitSecret>,
    /// Confirmation tag of the new epoch
    confirmation_tag: Vec<u8>,
    signature: Vec<u8>,
}

#[derive(Serialize)]
struct CommitTbs<'a> {
    committer: LeafIndex,
    epoch: u64,
    proposals: &'a [Proposal],
    secrets: &'a [EncryptedCommitSecret],
    confirmation_tag: &'a [u8],
}

impl Commit {
    fn to_be_signed(&self) -> MlsResult<Vec<u8>> {
        codec::encode(&CommitTbs {
            committer: self.committer,
            epoch: self.epoch,
            proposals: &self.proposals,
            secrets: &self.secrets,
            confirmation_tag: &self.confirmation_tag,
        })
    }

    pub(crate) fn to_bytes(&self) -> MlsResult<Vec<u8>> {
        codec::encode(self)
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> MlsResult<Self> {
        codec::decode(bytes).map_err(|e| MlsError::DecryptionFailed(format!("Malformed commit: {}", e)))
    }
}

/// Roster after applying proposals, plus the leaves that were added
struct RosterChange {
    roster: Vec<Member>,
    added: Vec<WelcomeTarget>,
    removed: Vec<Member>,
}

/// Apply proposals in MLS order: removes, then updates, then adds
fn apply_proposals(
    provider: &dyn CiphersuiteProvider,
    state: &GroupState,
    committer: LeafIndex,
    proposals: &[Proposal],
) -> MlsResult<RosterChange> {
    let mut roster = state.members().to_vec();
    let mut removed = Vec::new();

    for proposal in proposals {
        if let Proposal::Remove { leaf_index } = proposal {
            if *leaf_index == committer {
                return Err(MlsError::InvalidInput("Committer cannot remove itself".to_string()));
            }
            let position = roster
                .iter()
                .position(|m| m.leaf_index == *leaf_index)
                .ok_or_else(|| MlsError::InvalidInput(format!("No member at leaf {}", leaf_index)))?;
            removed.push(roster.remove(position));
        }
    }

    for proposal in proposals {
        if let Proposal::Update { encryption_key } = proposal {
            if encryption_key.len() != 32 {
                return Err(MlsError::InvalidInput("Invalid leaf key length".to_string()));
            }
            let member = roster
                .iter_mut()
                .find(|m| m.leaf_index == committer)
                .ok_or_else(|| MlsError::InvalidInput("Committer not in roster".to_string()))?;
            member.encryption_key = encryption_key.clone();
        }
    }

    let mut next_leaf = state.next_leaf_index();
    let mut added = Vec::new();
    for proposal in proposals {
        if let Proposal::Add { key_package } = proposal {
            let parsed = KeyPackage::decode(key_package)?;
            parsed.verify(provider)?;
            if roster.iter().any(|m| m.identity == parsed.identity) {
                return Err(MlsError::DuplicateMember(parsed.identity));
            }

            let leaf_index = next_leaf;
            next_leaf = next_leaf
                .checked_add(1)
                .ok_or_else(|| MlsError::InvalidInput("Leaf index space exhausted".to_string()))?;

            added.push(WelcomeTarget {
                leaf_index,
                key_package_ref: key_package_ref(provider, key_package),
                init_key: parsed.init_key.clone(),
            });
            roster.push(Member {
                leaf_index,
                identity: parsed.identity,
                identity_key: parsed.identity_key,
                encryption_key: parsed.init_key,
            });
        }
    }

    Ok(RosterChange { roster, added, removed })
}

fn commit_secret_aad(state: &GroupState, recipient: LeafIndex) -> Vec<u8> {
    concat_prefixed(&[
        state.group_id().as_bytes(),
        &state.epoch().to_be_bytes(),
        &recipient.to_be_bytes(),
    ])
}

fn next_epoch(state: &GroupState) -> MlsResult<u64> {
    state
        .epoch()
        .checked_add(1)
        .ok_or_else(|| MlsError::InvalidInput("Epoch counter exhausted".to_string()))
}

/// A commit built locally, ready to be sent
pub(crate) struct PreparedCommit {
    pub(crate) commit: Commit,
    /// Committer's state at the new epoch
    pub(crate) next_state: GroupState,
    pub(crate) added: Vec<WelcomeTarget>,
    pub(crate) removed: Vec<Member>,
}

/// Build and sign a commit from the state's own leaf
///
/// `new_leaf_private_key` must accompany an `Update` proposal.
pub(crate) async fn create_commit(
    provider: &dyn CiphersuiteProvider,
    identities: &dyn IdentityProvider,
    state: &GroupState,
    proposals: Vec<Proposal>,
    new_leaf_private_key: Option<Vec<u8>>,
) -> MlsResult<PreparedCommit> {
    if proposals.is_empty() {
        return Err(MlsError::InvalidInput("Commit without proposals".to_string()));
    }
    let committer = state.own_leaf_index();
    let identity = state
        .own_identity()
        .ok_or_else(|| MlsError::InvalidInput("Own leaf missing from roster".to_string()))?
        .to_string();
    if proposals.iter().any(Proposal::changes_membership) && !state.group_data().is_admin(&identity)
    {
        return Err(MlsError::Unauthorized(format!("{} is not a group admin", identity)));
    }

    let change = apply_proposals(provider, state, committer, &proposals)?;
    let epoch = next_epoch(state)?;

    let commit_secret = Zeroizing::new(provider.random_bytes(provider.hash_len()));
    let context_hash =
        group_context_hash(provider, state.group_id(), epoch, &change.roster, state.group_data())?;
    let secrets =
        EpochSecrets::derive(provider, &state.secrets().init_secret, &commit_secret, &context_hash)?;
    let confirmation_tag = secrets.confirmation_tag(provider, &context_hash)?;

    let mut sealed = Vec::new();
    for member in &change.roster {
        let pre_existing = state.member(member.leaf_index).is_some();
        if member.leaf_index == committer || !pre_existing {
            continue;
        }
        sealed.push(EncryptedCommitSecret {
            recipient: member.leaf_index,
            ciphertext: provider.hpke_seal(
                &member.encryption_key,
                COMMIT_HPKE_INFO,
                &commit_secret_aad(state, member.leaf_index),
                &commit_secret,
            )?,
        });
    }

    let mut commit = Commit {
        committer,
        epoch: state.epoch(),
        proposals,
        secrets: sealed,
        confirmation_tag,
        signature: Vec::new(),
    };
    commit.signature = identities.sign(&identity, &commit.to_be_signed()?).await?;

    let mut next_state = state.clone();
    next_state.enter_epoch(epoch, change.roster, secrets, new_leaf_private_key);

    Ok(PreparedCommit { commit, next_state, added: change.added, removed: change.removed })
}

/// Result of processing a remote commit
pub(crate) enum CommitOutcome {
    /// State at the new epoch
    Advanced(GroupState),
    /// This member was removed by the commit
    Removed,
}

/// Verify and apply a commit received from `sender`
///
/// Integrity failures are `DecryptionFailed`; a membership change from a
/// non-admin is `Unauthorized`.
pub(crate) fn apply_commit(
    provider: &dyn CiphersuiteProvider,
    state: &GroupState,
    sender: SenderData,
    payload: &[u8],
) -> MlsResult<CommitOutcome> {
    let commit = Commit::from_bytes(payload)?;
    if commit.committer != sender.leaf_index || commit.epoch != state.epoch() {
        return Err(MlsError::DecryptionFailed("Commit header mismatch".to_string()));
    }

    let committer = state
        .member(commit.committer)
        .ok_or_else(|| MlsError::DecryptionFailed("Unknown committer".to_string()))?;
    provider
        .verify(&committer.identity_key, &commit.to_be_signed()?, &commit.signature)
        .map_err(|_| MlsError::DecryptionFailed("Commit signature invalid".to_string()))?;

    if commit.proposals.iter().any(Proposal::changes_membership)
        && !state.group_data().is_admin(&committer.identity)
    {
        return Err(MlsError::Unauthorized(format!(
            "{} is not a group admin",
            committer.identity
        )));
    }

    let change = apply_proposals(provider, state, commit.committer, &commit.proposals)
        .map_err(|e| MlsError::DecryptionFailed(format!("Invalid commit: {}", e)))?;
    if change.removed.iter().any(|m| m.leaf_index == state.own_leaf_index()) {
        return Ok(CommitOutcome::Removed);
    }

    let own = state.own_leaf_index();
    let encrypted = commit
        .secrets
        .iter()
        .find(|s| s.recipient == own)
        .ok_or_else(|| MlsError::DecryptionFailed("No commit secret for this member".to_string()))?;
    let commit_secret = Zeroizing::new(
        provider
            .hpke_open(
                &state.own_leaf_private_key,
                COMMIT_HPKE_INFO,
                &commit_secret_aad(state, own),
                &encrypted.ciphertext,
            )
            .map_err(|_| MlsError::DecryptionFailed("Commit secret integrity check failed".to_string()))?,
    );

    let epoch = next_epoch(state)?;
    let context_hash =
        group_context_hash(provider, state.group_id(), epoch, &change.roster, state.group_data())?;
    let secrets =
        EpochSecrets::derive(provider, &state.secrets().init_secret, &commit_secret, &context_hash)?;
    let mut expected_tag = secrets.confirmation_tag(provider, &context_hash)?;
    let tag_matches = expected_tag == commit.confirmation_tag;
    expected_tag.zeroize();
    if !tag_matches {
        return Err(MlsError::DecryptionFailed("Confirmation tag mismatch".to_string()));
    }

    let mut next_state = state.clone();
    next_state.enter_epoch(epoch, change.roster, secrets, None);
    Ok(CommitOutcome::Advanced(next_state))
}

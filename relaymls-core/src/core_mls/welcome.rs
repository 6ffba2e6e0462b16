//! Welcome messages for onboarding new members
//!
//! When a new member is added to a group, they receive a welcome artifact
//! addressed to one of their key packages. It contains a signed group info,
//! HPKE-sealed to the key package's init key:
//! - Roster and Nostr group data
//! - The epoch secret and confirmation tag
//! - The joiner's own leaf index
//!
//! This allows the new member to rebuild the exact epoch state the sender
//! holds and participate in the group.

use super::codec;
use super::encryption::EpochSecrets;
use super::errors::{MlsError, MlsResult};
use super::extension::NostrGroupData;
use super::group::{group_context_hash, GroupState};
use super::traits::ciphersuite::{CiphersuiteId, CiphersuiteProvider, HpkeCiphertext};
use super::traits::identity::IdentityProvider;
use super::types::{GroupId, KeyPackageRef, LeafIndex, Member};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

const WELCOME_MAGIC: &[u8; 4] = b"RMWL";

/// Current welcome format version
pub const WELCOME_VERSION: u8 = 1;

/// HPKE info string for welcomes
const WELCOME_HPKE_INFO: &[u8] = b"relaymls 1.0 welcome";

/// Encrypted welcome for one new member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WelcomeArtifact {
    pub ciphersuite: CiphersuiteId,
    /// Key package the group info is sealed to
    pub key_package_ref: KeyPackageRef,
    pub encrypted_group_info: HpkeCiphertext,
}

impl WelcomeArtifact {
    pub fn to_bytes(&self) -> MlsResult<Vec<u8>> {
        codec::encode_framed(WELCOME_MAGIC, WELCOME_VERSION, self)
    }

    /// Parse a welcome; malformed input is `WelcomeDecryptFailed`
    pub fn from_bytes(bytes: &[u8]) -> MlsResult<Self> {
        codec::decode_framed(WELCOME_MAGIC, WELCOME_VERSION, bytes)
            .map_err(|e| MlsError::WelcomeDecryptFailed(format!("Malformed welcome: {}", e)))
    }
}

/// Group info sealed inside a welcome
#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct GroupInfo {
    pub(crate) group_id: GroupId,
    pub(crate) epoch: u64,
    pub(crate) ciphersuite: CiphersuiteId,
    pub(crate) roster: Vec<Member>,
    pub(crate) group_data: Vec<u8>,
    pub(crate) epoch_secret: Vec<u8>,
    pub(crate) confirmation_tag: Vec<u8>,
    pub(crate) joiner_leaf: LeafIndex,
    pub(crate) signer_leaf: LeafIndex,
    pub(crate) signature: Vec<u8>,
}

impl Drop for GroupInfo {
    fn drop(&mut self) {
        self.epoch_secret.zeroize();
    }
}

#[derive(Serialize)]
struct GroupInfoTbs<'a> {
    group_id: &'a GroupId,
    epoch: u64,
    ciphersuite: CiphersuiteId,
    roster: &'a [Member],
    group_data: &'a [u8],
    epoch_secret: &'a [u8],
    confirmation_tag: &'a [u8],
    joiner_leaf: LeafIndex,
    signer_leaf: LeafIndex,
}

impl GroupInfo {
    fn to_be_signed(&self) -> MlsResult<Vec<u8>> {
        codec::encode(&GroupInfoTbs {
            group_id: &self.group_id,
            epoch: self.epoch,
            ciphersuite: self.ciphersuite,
            roster: &self.roster,
            group_data: &self.group_data,
            epoch_secret: &self.epoch_secret,
            confirmation_tag: &self.confirmation_tag,
            joiner_leaf: self.joiner_leaf,
            signer_leaf: self.signer_leaf,
        })
    }
}

/// Addressing for one welcome: the joiner's leaf and key package
#[derive(Debug, Clone)]
pub(crate) struct WelcomeTarget {
    pub(crate) leaf_index: LeafIndex,
    pub(crate) key_package_ref: KeyPackageRef,
    pub(crate) init_key: Vec<u8>,
}

/// Seal one welcome per target for the state's current epoch
///
/// `signer_identity` must be the identity at the state's own leaf.
pub(crate) async fn seal_welcomes(
    provider: &dyn CiphersuiteProvider,
    identities: &dyn IdentityProvider,
    signer_identity: &str,
    state: &GroupState,
    targets: &[WelcomeTarget],
) -> MlsResult<Vec<WelcomeArtifact>> {
    let context_hash = state.context_hash(provider)?;
    let confirmation_tag = state.secrets().confirmation_tag(provider, &context_hash)?;
    let group_data = state.group_data().encode()?;

    let mut welcomes = Vec::with_capacity(targets.len());
    for target in targets {
        let mut info = GroupInfo {
            group_id: state.group_id().clone(),
            epoch: state.epoch(),
            ciphersuite: state.ciphersuite(),
            roster: state.members().to_vec(),
            group_data: group_data.clone(),
            epoch_secret: state.secrets().epoch_secret.clone(),
            confirmation_tag: confirmation_tag.clone(),
            joiner_leaf: target.leaf_index,
            signer_leaf: state.own_leaf_index(),
            signature: Vec::new(),
        };
        info.signature = identities.sign(signer_identity, &info.to_be_signed()?).await?;

        let mut plaintext = codec::encode(&info)?;
        let sealed = provider.hpke_seal(
            &target.init_key,
            WELCOME_HPKE_INFO,
            target.key_package_ref.as_bytes(),
            &plaintext,
        );
        plaintext.zeroize();

        welcomes.push(WelcomeArtifact {
            ciphersuite: state.ciphersuite(),
            key_package_ref: target.key_package_ref.clone(),
            encrypted_group_info: sealed?,
        });
    }

    Ok(welcomes)
}

/// Group info that passed every welcome check
pub(crate) struct VerifiedWelcome {
    pub(crate) group_id: GroupId,
    pub(crate) epoch: u64,
    pub(crate) ciphersuite: CiphersuiteId,
    pub(crate) roster: Vec<Member>,
    pub(crate) joiner_leaf: LeafIndex,
    pub(crate) secrets: EpochSecrets,
    pub(crate) group_data: NostrGroupData,
}

/// Unseal and verify a welcome with the key package's init private key
///
/// Every failure, including a bad signature or confirmation tag, is
/// `WelcomeDecryptFailed`.
pub(crate) fn open_welcome(
    provider: &dyn CiphersuiteProvider,
    artifact: &WelcomeArtifact,
    init_private_key: &[u8],
) -> MlsResult<VerifiedWelcome> {
    verify_welcome(provider, artifact, init_private_key).map_err(|e| match e {
        MlsError::WelcomeDecryptFailed(_) => e,
        other => MlsError::WelcomeDecryptFailed(other.to_string()),
    })
}

fn verify_welcome(
    provider: &dyn CiphersuiteProvider,
    artifact: &WelcomeArtifact,
    init_private_key: &[u8],
) -> MlsResult<VerifiedWelcome> {
    if artifact.ciphersuite != provider.suite_id() {
        return Err(MlsError::WelcomeDecryptFailed(format!(
            "unsupported ciphersuite 0x{:04x}",
            artifact.ciphersuite
        )));
    }

    let mut plaintext = provider.hpke_open(
        init_private_key,
        WELCOME_HPKE_INFO,
        artifact.key_package_ref.as_bytes(),
        &artifact.encrypted_group_info,
    )?;
    let decoded = codec::decode::<GroupInfo>(&plaintext);
    plaintext.zeroize();
    let info = decoded?;

    if info.ciphersuite != artifact.ciphersuite {
        return Err(MlsError::WelcomeDecryptFailed("ciphersuite mismatch".to_string()));
    }

    let signer = info
        .roster
        .iter()
        .find(|m| m.leaf_index == info.signer_leaf)
        .ok_or_else(|| MlsError::WelcomeDecryptFailed("signer not in roster".to_string()))?;
    provider.verify(&signer.identity_key, &info.to_be_signed()?, &info.signature)?;

    if !info.roster.iter().any(|m| m.leaf_index == info.joiner_leaf) {
        return Err(MlsError::WelcomeDecryptFailed("joiner not in roster".to_string()));
    }

    let group_data = NostrGroupData::decode(&info.group_data)?;
    let secrets = EpochSecrets::from_epoch_secret(provider, info.epoch_secret.clone())?;
    let context_hash =
        group_context_hash(provider, &info.group_id, info.epoch, &info.roster, &group_data)?;
    if secrets.confirmation_tag(provider, &context_hash)? != info.confirmation_tag {
        return Err(MlsError::WelcomeDecryptFailed("confirmation tag mismatch".to_string()));
    }

    Ok(VerifiedWelcome {
        group_id: info.group_id.clone(),
        epoch: info.epoch,
        ciphersuite: info.ciphersuite,
        roster: info.roster.clone(),
        joiner_leaf: info.joiner_leaf,
        secrets,
        group_data,
    })
}

/// What an invitation reveals before it is accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WelcomePreview {
    pub group_id: GroupId,
    pub epoch: u64,
    pub member_count: usize,
    pub group_data: NostrGroupData,
}

impl From<&VerifiedWelcome> for WelcomePreview {
    fn from(welcome: &VerifiedWelcome) -> Self {
        Self {
            group_id: welcome.group_id.clone(),
            epoch: welcome.epoch,
            member_count: welcome.roster.len(),
            group_data: welcome.group_data.clone(),
        }
    }
}

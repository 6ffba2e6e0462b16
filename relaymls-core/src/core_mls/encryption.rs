//! Key schedule and message protection
//!
//! This module implements:
//! - The per-epoch key schedule (init secret + commit secret -> epoch secrets)
//! - Per-(sender, counter) message keys
//! - Sender data encryption, so relays never see who sent what

use super::codec::concat_prefixed;
use super::errors::{MlsError, MlsResult};
use super::traits::ciphersuite::CiphersuiteProvider;
use super::types::{GroupId, LeafIndex};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Prefix for every key schedule label
const LABEL_PREFIX: &str = "relaymls 1.0 ";

/// Size of serialized sender data: leaf (4) || counter (8)
const SENDER_DATA_SIZE: usize = 12;

/// HKDF-Expand with a labelled, length-bound info string
pub(crate) fn expand_with_label(
    provider: &dyn CiphersuiteProvider,
    secret: &[u8],
    label: &str,
    context: &[u8],
    len: usize,
) -> MlsResult<Vec<u8>> {
    let full_label = format!("{}{}", LABEL_PREFIX, label);
    let length = u16::try_from(len)
        .map_err(|_| {
            MlsError::InvalidInput(format!("Derived secret length {} exceeds {}", len, u16::MAX))
        })?
        .to_be_bytes();
    let info = concat_prefixed(&[&length, full_label.as_bytes(), context]);
    provider.kdf_expand(secret, &info, len)
}

/// Secrets of one epoch
///
/// Zeroized when dropped. Nothing here can be used to recover the secrets
/// of an earlier epoch.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct EpochSecrets {
    pub(crate) epoch_secret: Vec<u8>,
    pub(crate) sender_data_secret: Vec<u8>,
    pub(crate) encryption_secret: Vec<u8>,
    pub(crate) exporter_secret: Vec<u8>,
    pub(crate) confirmation_key: Vec<u8>,
    /// Input to the next epoch's key schedule
    pub(crate) init_secret: Vec<u8>,
}

impl std::fmt::Debug for EpochSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EpochSecrets(..)")
    }
}

impl EpochSecrets {
    /// Run the key schedule for a new epoch
    ///
    /// `init_secret` comes from the previous epoch (random for epoch 0) and
    /// `commit_secret` is fresh entropy distributed by the committer.
    pub fn derive(
        provider: &dyn CiphersuiteProvider,
        init_secret: &[u8],
        commit_secret: &[u8],
        group_context_hash: &[u8],
    ) -> MlsResult<Self> {
        let joiner_secret = Zeroizing::new(provider.kdf_extract(init_secret, commit_secret));
        let epoch_secret = expand_with_label(
            provider,
            &joiner_secret,
            "epoch",
            group_context_hash,
            provider.hash_len(),
        )?;
        Self::from_epoch_secret(provider, epoch_secret)
    }

    /// Derive every epoch secret from the epoch secret alone
    ///
    /// Used by joiners, who receive the epoch secret in a welcome.
    pub fn from_epoch_secret(
        provider: &dyn CiphersuiteProvider,
        epoch_secret: Vec<u8>,
    ) -> MlsResult<Self> {
        let len = provider.hash_len();
        if epoch_secret.len() != len {
            return Err(MlsError::CryptoError("Invalid epoch secret length".to_string()));
        }
        let derive = |label: &str| expand_with_label(provider, &epoch_secret, label, &[], len);

        Ok(Self {
            sender_data_secret: derive("sender data")?,
            encryption_secret: derive("encryption")?,
            exporter_secret: derive("exporter")?,
            confirmation_key: derive("confirm")?,
            init_secret: derive("init")?,
            epoch_secret,
        })
    }

    /// MAC over the group context proving knowledge of the epoch secrets
    pub fn confirmation_tag(
        &self,
        provider: &dyn CiphersuiteProvider,
        group_context_hash: &[u8],
    ) -> MlsResult<Vec<u8>> {
        expand_with_label(
            provider,
            &self.confirmation_key,
            "confirmation tag",
            group_context_hash,
            provider.hash_len(),
        )
    }

    /// The epoch's exporter secret
    pub fn exporter_secret(&self) -> &[u8] {
        &self.exporter_secret
    }

    /// Derive an application-specific secret from the exporter secret
    pub fn export(
        &self,
        provider: &dyn CiphersuiteProvider,
        label: &str,
        context: &[u8],
        len: usize,
    ) -> MlsResult<Vec<u8>> {
        expand_with_label(provider, &self.exporter_secret, label, context, len)
    }

    fn message_key(
        &self,
        provider: &dyn CiphersuiteProvider,
        sender: &SenderData,
    ) -> MlsResult<Zeroizing<Vec<u8>>> {
        expand_with_label(
            provider,
            &self.encryption_secret,
            "message key",
            &sender.to_bytes(),
            provider.aead_key_len(),
        )
        .map(Zeroizing::new)
    }

    fn sender_data_key(
        &self,
        provider: &dyn CiphersuiteProvider,
        nonce: &[u8],
    ) -> MlsResult<Zeroizing<Vec<u8>>> {
        expand_with_label(
            provider,
            &self.sender_data_secret,
            "sender data key",
            nonce,
            provider.aead_key_len(),
        )
        .map(Zeroizing::new)
    }
}

/// Sender authentication data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderData {
    /// Sender's leaf index
    pub leaf_index: LeafIndex,
    /// Per-sender message counter, starting at 1
    pub counter: u64,
}

impl SenderData {
    /// Serialize to bytes for encryption
    pub fn to_bytes(&self) -> [u8; SENDER_DATA_SIZE] {
        let mut bytes = [0u8; SENDER_DATA_SIZE];
        bytes[..4].copy_from_slice(&self.leaf_index.to_be_bytes());
        bytes[4..].copy_from_slice(&self.counter.to_be_bytes());
        bytes
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> MlsResult<Self> {
        let bytes: [u8; SENDER_DATA_SIZE] = bytes
            .try_into()
            .map_err(|_| MlsError::DecryptionFailed("Invalid sender data length".to_string()))?;

        let mut leaf = [0u8; 4];
        leaf.copy_from_slice(&bytes[..4]);
        let mut counter = [0u8; 8];
        counter.copy_from_slice(&bytes[4..]);

        Ok(Self { leaf_index: u32::from_be_bytes(leaf), counter: u64::from_be_bytes(counter) })
    }
}

/// Associated data fixed by the message header
#[derive(Debug, Clone, Copy)]
pub struct MessageContext<'a> {
    pub group_id: &'a GroupId,
    pub epoch: u64,
    pub content_type: u8,
}

impl MessageContext<'_> {
    fn sender_data_aad(&self) -> Vec<u8> {
        concat_prefixed(&[self.group_id.as_bytes(), &self.epoch.to_be_bytes(), &[self.content_type]])
    }

    fn content_aad(&self, sender: &SenderData) -> Vec<u8> {
        concat_prefixed(&[
            self.group_id.as_bytes(),
            &self.epoch.to_be_bytes(),
            &[self.content_type],
            &sender.to_bytes(),
        ])
    }
}

/// Output of [`seal_message`]
#[derive(Debug, Clone)]
pub struct ProtectedContent {
    pub nonce: Vec<u8>,
    pub encrypted_sender_data: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Encrypt a payload and its sender data under the epoch secrets
pub fn seal_message(
    provider: &dyn CiphersuiteProvider,
    secrets: &EpochSecrets,
    context: MessageContext<'_>,
    sender: SenderData,
    plaintext: &[u8],
) -> MlsResult<ProtectedContent> {
    let nonce = provider.random_bytes(provider.aead_nonce_len());

    let message_key = secrets.message_key(provider, &sender)?;
    let ciphertext =
        provider.aead_seal(&message_key, &nonce, &context.content_aad(&sender), plaintext)?;

    let sender_data_key = secrets.sender_data_key(provider, &nonce)?;
    let encrypted_sender_data = provider.aead_seal(
        &sender_data_key,
        &nonce,
        &context.sender_data_aad(),
        &sender.to_bytes(),
    )?;

    Ok(ProtectedContent { nonce, encrypted_sender_data, ciphertext })
}

/// Recover the sender of a message
///
/// Any failure is reported as `DecryptionFailed`.
pub fn open_sender_data(
    provider: &dyn CiphersuiteProvider,
    secrets: &EpochSecrets,
    context: MessageContext<'_>,
    nonce: &[u8],
    encrypted_sender_data: &[u8],
) -> MlsResult<SenderData> {
    let sender_data_key = secrets.sender_data_key(provider, nonce)?;
    let bytes = provider
        .aead_open(&sender_data_key, nonce, &context.sender_data_aad(), encrypted_sender_data)
        .map_err(|_| MlsError::DecryptionFailed("Sender data integrity check failed".to_string()))?;
    SenderData::from_bytes(&bytes)
}

/// Decrypt the payload sent by `sender`
///
/// Any failure is reported as `DecryptionFailed`.
pub fn open_message(
    provider: &dyn CiphersuiteProvider,
    secrets: &EpochSecrets,
    context: MessageContext<'_>,
    sender: SenderData,
    nonce: &[u8],
    ciphertext: &[u8],
) -> MlsResult<Vec<u8>> {
    let message_key = secrets.message_key(provider, &sender)?;
    provider
        .aead_open(&message_key, nonce, &context.content_aad(&sender), ciphertext)
        .map_err(|_| MlsError::DecryptionFailed("Message integrity check failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_mls::providers::RustCryptoProvider;

    fn secrets(provider: &RustCryptoProvider) -> EpochSecrets {
        EpochSecrets::derive(provider, &[1u8; 32], &[0u8; 32], b"context").unwrap()
    }

    #[test]
    fn test_key_schedule_deterministic() {
        let provider = RustCryptoProvider::new();
        let a = secrets(&provider);
        let b = secrets(&provider);
        assert_eq!(a.exporter_secret(), b.exporter_secret());

        let rebuilt = EpochSecrets::from_epoch_secret(&provider, a.epoch_secret.clone()).unwrap();
        assert_eq!(rebuilt.encryption_secret, a.encryption_secret);
        assert_eq!(rebuilt.init_secret, a.init_secret);
    }

    #[test]
    fn test_export_length_bounds() {
        let provider = RustCryptoProvider::new();
        let secrets = secrets(&provider);

        assert_eq!(secrets.export(&provider, "nostr", b"", 32).unwrap().len(), 32);
        assert!(matches!(
            secrets.export(&provider, "nostr", b"", usize::from(u16::MAX) + 1),
            Err(MlsError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_key_schedule_depends_on_every_input() {
        let provider = RustCryptoProvider::new();
        let base = secrets(&provider);

        let other_context = EpochSecrets::derive(&provider, &[1u8; 32], &[0u8; 32], b"other").unwrap();
        let other_commit = EpochSecrets::derive(&provider, &[1u8; 32], &[9u8; 32], b"context").unwrap();
        let other_init = EpochSecrets::derive(&provider, &[2u8; 32], &[0u8; 32], b"context").unwrap();

        assert_ne!(base.epoch_secret, other_context.epoch_secret);
        assert_ne!(base.epoch_secret, other_commit.epoch_secret);
        assert_ne!(base.epoch_secret, other_init.epoch_secret);
    }

    #[test]
    fn test_next_epoch_differs() {
        let provider = RustCryptoProvider::new();
        let epoch0 = secrets(&provider);
        let epoch1 =
            EpochSecrets::derive(&provider, &epoch0.init_secret, &[7u8; 32], b"context").unwrap();

        assert_ne!(epoch0.encryption_secret, epoch1.encryption_secret);
        assert_ne!(epoch0.exporter_secret, epoch1.exporter_secret);
    }

    #[test]
    fn test_confirmation_tag_binds_context() {
        let provider = RustCryptoProvider::new();
        let s = secrets(&provider);
        assert_ne!(
            s.confirmation_tag(&provider, b"a").unwrap(),
            s.confirmation_tag(&provider, b"b").unwrap()
        );
    }

    #[test]
    fn test_seal_open_message() {
        let provider = RustCryptoProvider::new();
        let s = secrets(&provider);
        let group_id = GroupId::new(vec![7; 32]);
        let ctx = MessageContext { group_id: &group_id, epoch: 3, content_type: 1 };
        let sender = SenderData { leaf_index: 2, counter: 5 };

        let sealed = seal_message(&provider, &s, ctx, sender, b"hello").unwrap();
        let opened_sender =
            open_sender_data(&provider, &s, ctx, &sealed.nonce, &sealed.encrypted_sender_data)
                .unwrap();
        assert_eq!(opened_sender, sender);

        let plaintext =
            open_message(&provider, &s, ctx, opened_sender, &sealed.nonce, &sealed.ciphertext)
                .unwrap();
        assert_eq!(plaintext, b"hello");
    }

    #[test]
    fn test_open_rejects_wrong_context() {
        let provider = RustCryptoProvider::new();
        let s = secrets(&provider);
        let group_id = GroupId::new(vec![7; 32]);
        let ctx = MessageContext { group_id: &group_id, epoch: 3, content_type: 1 };
        let sender = SenderData { leaf_index: 0, counter: 1 };
        let sealed = seal_message(&provider, &s, ctx, sender, b"hello").unwrap();

        let wrong_epoch = MessageContext { epoch: 4, ..ctx };
        assert!(matches!(
            open_sender_data(&provider, &s, wrong_epoch, &sealed.nonce, &sealed.encrypted_sender_data),
            Err(MlsError::DecryptionFailed(_))
        ));

        let wrong_sender = SenderData { leaf_index: 1, counter: 1 };
        assert!(matches!(
            open_message(&provider, &s, ctx, wrong_sender, &sealed.nonce, &sealed.ciphertext),
            Err(MlsError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_sender_data_bytes() {
        let sender = SenderData { leaf_index: 0x01020304, counter: 9 };
        assert_eq!(SenderData::from_bytes(&sender.to_bytes()).unwrap(), sender);
        assert!(SenderData::from_bytes(&[0u8; 11]).is_err());
    }
}

//! Property tests for the message and welcome paths

mod common;

use common::{group_of, memory_session, params};
use proptest::prelude::*;
use relaymls_core::{GroupId, MlsError, MlsSession, ProcessedMessage};
use tokio::runtime::Runtime;

/// Offset of the epoch field in an encoded message with a 32-byte group id:
/// magic, version, content type, group id length and bytes
const EPOCH_OFFSET: usize = 4 + 1 + 4 + 8 + 32;
const EPOCH_LEN: usize = 8;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

async fn pair() -> (MlsSession, MlsSession, GroupId) {
    let alice = memory_session("alice").await;
    let bob = memory_session("bob").await;
    let created = group_of(&alice, &[&bob]).await;
    let group_id = created.group_id().clone();
    (alice, bob, group_id)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_roundtrip_preserves_payload(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..512), 1..4)
    ) {
        let rt = runtime();
        rt.block_on(async {
            let (alice, bob, group_id) = pair().await;
            for payload in &payloads {
                let bytes = alice.encrypt_message(&group_id, payload).await.unwrap().to_bytes().unwrap();
                let processed = bob.process_message(&group_id, &bytes).await.unwrap();
                prop_assert_eq!(
                    processed,
                    ProcessedMessage::Application {
                        sender_identity: "alice".to_string(),
                        sender_leaf: 0,
                        payload: payload.clone(),
                    }
                );
            }
            prop_assert_eq!(alice.group(&group_id).await.unwrap().epoch(), 0);
            prop_assert_eq!(bob.group(&group_id).await.unwrap().epoch(), 0);
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_flipped_byte_is_rejected(
        payload in prop::collection::vec(any::<u8>(), 0..256),
        position in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let rt = runtime();
        rt.block_on(async {
            let (alice, bob, group_id) = pair().await;
            let mut bytes = alice.encrypt_message(&group_id, &payload).await.unwrap().to_bytes().unwrap();

            let index = position.index(bytes.len());
            bytes[index] ^= mask;
            let result = bob.process_message(&group_id, &bytes).await;

            if (EPOCH_OFFSET..EPOCH_OFFSET + EPOCH_LEN).contains(&index) {
                let is_epoch_mismatch = matches!(result, Err(MlsError::EpochMismatch { .. }));
                prop_assert!(is_epoch_mismatch, "epoch flip gave {:?}", result);
            } else {
                let is_decryption_failure = matches!(result, Err(MlsError::DecryptionFailed(_)));
                prop_assert!(is_decryption_failure, "flip at {} gave {:?}", index, result);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_flipped_welcome_is_rejected(
        position in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let rt = runtime();
        rt.block_on(async {
            let alice = memory_session("alice").await;
            let bob = memory_session("bob").await;
            let (_, kp) = bob.issue_key_package("bob").await.unwrap();
            let created = alice.create_group(params("alice", vec![kp.0])).await.unwrap();

            let mut welcome = created.welcomes[0].to_bytes().unwrap();
            let index = position.index(welcome.len());
            welcome[index] ^= mask;

            let result = bob.join_from_welcome(&welcome).await;
            let rejected = matches!(
                result,
                Err(MlsError::WelcomeDecryptFailed(_)) | Err(MlsError::NoMatchingKeyPackage(_))
            );
            prop_assert!(rejected, "flip at {} gave {:?}", index, result.map(|j| j.group_id().clone()));
            prop_assert!(bob.groups().await.unwrap().is_empty());
            prop_assert_eq!(bob.list_key_packages().await.unwrap().len(), 1);
            Ok::<(), TestCaseError>(())
        })?;
    }
}

//! Group lifecycle across several sessions: create, join, exchange,
//! commit, removal and deletion.

mod common;

use common::{group_of, memory_session, params};
use relaymls_core::{MlsError, ProcessedMessage};
use std::collections::HashSet;
use std::sync::Arc;

fn application(sender: &str, leaf: u32, payload: &[u8]) -> ProcessedMessage {
    ProcessedMessage::Application {
        sender_identity: sender.to_string(),
        sender_leaf: leaf,
        payload: payload.to_vec(),
    }
}

#[tokio::test]
async fn test_hello_scenario() {
    let alice = memory_session("alice").await;
    let bob = memory_session("bob").await;
    let (_, kp) = bob.issue_key_package("bob").await.unwrap();

    let created = alice.create_group(params("alice", vec![kp.0])).await.unwrap();
    assert_eq!(created.welcomes.len(), 1);

    let joined = bob.join_from_welcome(&created.welcomes[0].to_bytes().unwrap()).await.unwrap();
    assert_eq!(joined.group_id(), created.group_id());

    let group_id = created.group_id();
    let message = alice.encrypt_message(group_id, b"hello").await.unwrap();
    let processed = bob.process_message(group_id, &message.to_bytes().unwrap()).await.unwrap();
    assert_eq!(processed, application("alice", 0, b"hello"));
    assert_eq!(bob.group(group_id).await.unwrap().epoch(), 0);
}

#[tokio::test]
async fn test_members_share_epoch_state() {
    let alice = memory_session("alice").await;
    let bob = memory_session("bob").await;
    let carol = memory_session("carol").await;
    let created = group_of(&alice, &[&bob, &carol]).await;
    let group_id = created.group_id();

    let expected = alice.exporter_secret(group_id).await.unwrap();
    for member in [&bob, &carol] {
        assert_eq!(member.exporter_secret(group_id).await.unwrap(), expected);
    }

    let roster: Vec<_> = bob
        .members(group_id)
        .await
        .unwrap()
        .into_iter()
        .map(|m| (m.leaf_index, m.identity))
        .collect();
    assert_eq!(
        roster,
        vec![(0, "alice".to_string()), (1, "bob".to_string()), (2, "carol".to_string())]
    );
    assert_eq!(carol.group(group_id).await.unwrap().own_leaf_index(), 2);
}

#[tokio::test]
async fn test_replay_and_failed_process_leave_state() {
    let alice = memory_session("alice").await;
    let bob = memory_session("bob").await;
    let created = group_of(&alice, &[&bob]).await;
    let group_id = created.group_id();

    let bytes = alice.encrypt_message(group_id, b"ping").await.unwrap().to_bytes().unwrap();

    let mut tampered = bytes.clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x40;
    assert!(matches!(
        bob.process_message(group_id, &tampered).await,
        Err(MlsError::DecryptionFailed(_))
    ));

    assert_eq!(bob.process_message(group_id, &bytes).await.unwrap(), application("alice", 0, b"ping"));
    assert!(matches!(
        bob.process_message(group_id, &bytes).await,
        Err(MlsError::ReplayedCounter { sender: 0, counter: 1 })
    ));
}

#[tokio::test]
async fn test_message_for_other_group_rejected() {
    let alice = memory_session("alice").await;
    let bob = memory_session("bob").await;
    let first = group_of(&alice, &[&bob]).await;
    let second = group_of(&alice, &[&bob]).await;

    let bytes = alice.encrypt_message(first.group_id(), b"x").await.unwrap().to_bytes().unwrap();
    assert!(matches!(
        bob.process_message(second.group_id(), &bytes).await,
        Err(MlsError::DecryptionFailed(_))
    ));
}

#[tokio::test]
async fn test_add_member_by_commit() {
    let alice = memory_session("alice").await;
    let bob = memory_session("bob").await;
    let carol = memory_session("carol").await;
    let created = group_of(&alice, &[&bob]).await;
    let group_id = created.group_id();

    let (_, kp) = carol.issue_key_package("carol").await.unwrap();
    let output = alice.add_members(group_id, &[kp.0.clone()]).await.unwrap();
    assert_eq!(output.epoch, 1);
    assert_eq!(output.welcomes.len(), 1);

    let processed = bob.process_message(group_id, &output.commit.to_bytes().unwrap()).await.unwrap();
    assert_eq!(processed, ProcessedMessage::Commit { epoch: 1 });

    let joined = carol.join_from_welcome(&output.welcomes[0].to_bytes().unwrap()).await.unwrap();
    assert_eq!(joined.state.epoch(), 1);
    assert_eq!(joined.state.own_leaf_index(), 2);

    let expected = alice.exporter_secret(group_id).await.unwrap();
    assert_eq!(bob.exporter_secret(group_id).await.unwrap(), expected);
    assert_eq!(carol.exporter_secret(group_id).await.unwrap(), expected);

    let bytes = carol.encrypt_message(group_id, b"hi all").await.unwrap().to_bytes().unwrap();
    for member in [&alice, &bob] {
        assert_eq!(
            member.process_message(group_id, &bytes).await.unwrap(),
            application("carol", 2, b"hi all")
        );
    }

    let other = group_of(&alice, &[&bob]).await;
    assert!(matches!(
        alice.add_members(other.group_id(), &[kp.0]).await,
        Err(MlsError::UnspentPackageRequired(_))
    ));
}

#[tokio::test]
async fn test_remove_member_by_commit() {
    let alice = memory_session("alice").await;
    let bob = memory_session("bob").await;
    let carol = memory_session("carol").await;
    let created = group_of(&alice, &[&bob, &carol]).await;
    let group_id = created.group_id();

    let output = alice.remove_members(group_id, &["carol".to_string()]).await.unwrap();
    let commit = output.commit.to_bytes().unwrap();
    assert_eq!(bob.process_message(group_id, &commit).await.unwrap(), ProcessedMessage::Commit { epoch: 1 });

    let after = alice.encrypt_message(group_id, b"carol is gone").await.unwrap().to_bytes().unwrap();
    assert_eq!(
        bob.process_message(group_id, &after).await.unwrap(),
        application("alice", 0, b"carol is gone")
    );
    assert!(matches!(
        carol.process_message(group_id, &after).await,
        Err(MlsError::EpochMismatch { expected: 0, actual: 1 })
    ));

    assert_eq!(carol.process_message(group_id, &commit).await.unwrap(), ProcessedMessage::Removed);
    assert!(matches!(
        carol.process_message(group_id, &after).await,
        Err(MlsError::UnknownGroup(_))
    ));

    let expected = alice.exporter_secret(group_id).await.unwrap();
    assert_eq!(bob.exporter_secret(group_id).await.unwrap(), expected);
}

#[tokio::test]
async fn test_membership_changes_need_admin() {
    let alice = memory_session("alice").await;
    let bob = memory_session("bob").await;
    let created = group_of(&alice, &[&bob]).await;
    let group_id = created.group_id();

    assert!(matches!(
        bob.remove_members(group_id, &["alice".to_string()]).await,
        Err(MlsError::Unauthorized(_))
    ));
    assert!(matches!(
        alice.remove_members(group_id, &["mallory".to_string()]).await,
        Err(MlsError::InvalidInput(_))
    ));

    let output = bob.self_update(group_id).await.unwrap();
    assert_eq!(
        alice.process_message(group_id, &output.commit.to_bytes().unwrap()).await.unwrap(),
        ProcessedMessage::Commit { epoch: 1 }
    );
}

#[tokio::test]
async fn test_admin_set_from_params() {
    let alice = memory_session("alice").await;
    let bob = memory_session("bob").await;
    let carol = memory_session("carol").await;
    let (_, bob_kp) = bob.issue_key_package("bob").await.unwrap();

    let mut p = params("alice", vec![bob_kp.0]);
    p.admin_identities = vec!["bob".to_string()];
    let created = alice.create_group(p).await.unwrap();
    let group_id = created.group_id();
    bob.join_from_welcome(&created.welcomes[0].to_bytes().unwrap()).await.unwrap();

    let data = bob.group(group_id).await.unwrap().group_data().clone();
    assert!(data.is_admin("alice"));
    assert!(data.is_admin("bob"));

    let (_, carol_kp) = carol.issue_key_package("carol").await.unwrap();
    let output = bob.add_members(group_id, &[carol_kp.0]).await.unwrap();
    assert_eq!(output.epoch, 1);
}

#[tokio::test]
async fn test_committer_does_not_reprocess_own_commit() {
    let alice = memory_session("alice").await;
    let bob = memory_session("bob").await;
    let created = group_of(&alice, &[&bob]).await;
    let group_id = created.group_id();

    let output = alice.self_update(group_id).await.unwrap();
    assert!(matches!(
        alice.process_message(group_id, &output.commit.to_bytes().unwrap()).await,
        Err(MlsError::EpochMismatch { expected: 1, actual: 0 })
    ));
}

#[tokio::test]
async fn test_preview_leaves_key_package_usable() {
    let alice = memory_session("alice").await;
    let bob = memory_session("bob").await;
    let (_, kp) = bob.issue_key_package("bob").await.unwrap();
    let created = alice.create_group(params("alice", vec![kp.0])).await.unwrap();
    let welcome = created.welcomes[0].to_bytes().unwrap();

    for _ in 0..2 {
        let preview = bob.preview_welcome(&welcome).await.unwrap();
        assert_eq!(preview.group_data.name, "Test Group");
        assert_eq!(preview.member_count, 2);
    }
    assert_eq!(bob.list_key_packages().await.unwrap().len(), 1);

    bob.join_from_welcome(&welcome).await.unwrap();
    assert!(bob.list_key_packages().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_welcome_for_someone_else() {
    let alice = memory_session("alice").await;
    let bob = memory_session("bob").await;
    let carol = memory_session("carol").await;
    let (_, kp) = bob.issue_key_package("bob").await.unwrap();
    let created = alice.create_group(params("alice", vec![kp.0])).await.unwrap();

    assert!(matches!(
        carol.join_from_welcome(&created.welcomes[0].to_bytes().unwrap()).await,
        Err(MlsError::NoMatchingKeyPackage(_))
    ));
    assert!(matches!(
        carol.preview_welcome(&[1, 2, 3]).await,
        Err(MlsError::WelcomeDecryptFailed(_))
    ));
}

#[tokio::test]
async fn test_delete_group() {
    let alice = memory_session("alice").await;
    let bob = memory_session("bob").await;
    let created = group_of(&alice, &[&bob]).await;
    let group_id = created.group_id().clone();

    let bytes = bob.encrypt_message(&group_id, b"late").await.unwrap().to_bytes().unwrap();
    alice.delete_group(&group_id).await.unwrap();

    assert!(alice.groups().await.unwrap().is_empty());
    assert!(matches!(alice.encrypt_message(&group_id, b"x").await, Err(MlsError::UnknownGroup(_))));
    assert!(matches!(alice.process_message(&group_id, &bytes).await, Err(MlsError::UnknownGroup(_))));
    assert!(matches!(alice.exporter_secret(&group_id).await, Err(MlsError::UnknownGroup(_))));
}

#[tokio::test]
async fn test_concurrent_encrypts_use_distinct_counters() {
    let alice = Arc::new(memory_session("alice").await);
    let bob = memory_session("bob").await;
    let created = group_of(&alice, &[&bob]).await;
    let group_id = created.group_id().clone();

    let mut handles = Vec::new();
    for i in 0..16u8 {
        let alice = alice.clone();
        let group_id = group_id.clone();
        handles.push(tokio::spawn(async move {
            alice.encrypt_message(&group_id, &[i]).await.unwrap().to_bytes().unwrap()
        }));
    }

    let mut messages = HashSet::new();
    for handle in handles {
        messages.insert(handle.await.unwrap());
    }
    assert_eq!(messages.len(), 16);
    assert_eq!(alice.group(&group_id).await.unwrap().send_counter(), 16);
}

#[tokio::test]
async fn test_distinct_groups_progress_in_parallel() {
    let alice = Arc::new(memory_session("alice").await);
    let bob = memory_session("bob").await;
    let first = group_of(&alice, &[&bob]).await.group_id().clone();
    let second = group_of(&alice, &[&bob]).await.group_id().clone();

    let (a, b) = tokio::join!(
        alice.encrypt_message(&first, b"one"),
        alice.encrypt_message(&second, b"two")
    );
    let (a, b) = (a.unwrap().to_bytes().unwrap(), b.unwrap().to_bytes().unwrap());

    assert_eq!(bob.process_message(&first, &a).await.unwrap(), application("alice", 0, b"one"));
    assert_eq!(bob.process_message(&second, &b).await.unwrap(), application("alice", 0, b"two"));
}

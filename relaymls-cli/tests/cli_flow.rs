//! End-to-end tests driving the `relaymls` binary
//!
//! Each actor gets its own data directory and a fixed identity seed, so
//! state and signing keys survive between invocations.

use serde_json::Value;
use std::process::Command;
use tempfile::TempDir;

struct Actor {
    identity: &'static str,
    seed: String,
    dir: TempDir,
}

impl Actor {
    fn new(identity: &'static str, seed_byte: u8) -> Self {
        Self { identity, seed: hex::encode([seed_byte; 32]), dir: TempDir::new().unwrap() }
    }

    fn run(&self, args: &[&str]) -> Result<Value, String> {
        let output = Command::new(env!("CARGO_BIN_EXE_relaymls"))
            .env_remove("RUST_LOG")
            .args(["--data-dir", self.dir.path().to_str().unwrap()])
            .args(["--identity", self.identity])
            .args(["--identity-seed", &self.seed])
            .args(["--log-level", "error"])
            .args(args)
            .output()
            .unwrap();

        if output.status.success() {
            Ok(serde_json::from_slice(&output.stdout).unwrap())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).into_owned())
        }
    }

    fn ok(&self, args: &[&str]) -> Value {
        self.run(args).unwrap_or_else(|e| panic!("{} {:?} failed: {}", self.identity, args, e))
    }
}

fn str_field<'a>(value: &'a Value, field: &str) -> &'a str {
    value[field].as_str().unwrap()
}

#[test]
fn test_info() {
    let alice = Actor::new("alice", 1);
    let info = alice.ok(&["info"]);
    assert_eq!(info["ciphersuite"], "0x0001");
    assert_eq!(info["identity"], "alice");
}

#[test]
fn test_create_join_and_message() {
    let alice = Actor::new("alice", 1);
    let bob = Actor::new("bob", 2);

    let kp = bob.ok(&["key-package", "issue"]);
    let kp_hex = str_field(&kp, "key_package").to_string();

    let parsed = alice.ok(&["key-package", "parse", &kp_hex]);
    assert_eq!(parsed["identity"], "bob");

    let created = alice.ok(&[
        "group",
        "create",
        "--name",
        "Test Group",
        "--member",
        &kp_hex,
        "--relay",
        "wss://relay.example",
    ]);
    let group_id = str_field(&created, "group_id").to_string();
    let welcome = created["welcomes"][0].as_str().unwrap().to_string();
    assert_eq!(created["members"], serde_json::json!(["alice", "bob"]));
    assert_eq!(created["group_data"]["name"], "Test Group");

    let preview = bob.ok(&["welcome", "preview", &welcome]);
    assert_eq!(preview["group_id"], group_id.as_str());
    assert_eq!(preview["member_count"], 2);

    let joined = bob.ok(&["welcome", "join", &welcome]);
    assert_eq!(joined["group_id"], group_id.as_str());

    let message = alice.ok(&["message", "encrypt", &group_id, "hello"]);
    let message_hex = str_field(&message, "message").to_string();

    let processed = bob.ok(&["message", "process", &group_id, &message_hex]);
    assert_eq!(processed["type"], "application");
    assert_eq!(processed["payload"], "hello");
    assert_eq!(processed["sender"], "alice");

    let replay = bob.run(&["message", "process", &group_id, &message_hex]);
    assert!(replay.unwrap_err().contains("Replayed counter"));

    let a_secret = alice.ok(&["group", "export-secret", &group_id]);
    let b_secret = bob.ok(&["group", "export-secret", &group_id]);
    assert_eq!(a_secret, b_secret);
}

#[test]
fn test_spent_key_package_rejected() {
    let alice = Actor::new("alice", 1);
    let bob = Actor::new("bob", 2);
    let kp = bob.ok(&["key-package", "issue"]);
    let kp_hex = str_field(&kp, "key_package");

    alice.ok(&["group", "create", "--name", "one", "--member", kp_hex]);
    let second = alice.run(&["group", "create", "--name", "two", "--member", kp_hex]);
    assert!(second.unwrap_err().contains("already consumed"));
}

#[test]
fn test_unknown_group() {
    let alice = Actor::new("alice", 1);
    let result = alice.run(&["message", "encrypt", &"ab".repeat(32), "hi"]);
    assert!(result.unwrap_err().contains("Unknown group"));
}

#[test]
fn test_binary_payload_prints_as_hex() {
    let alice = Actor::new("alice", 1);
    let bob = Actor::new("bob", 2);

    let kp = bob.ok(&["key-package", "issue"]);
    let created = alice.ok(&["group", "create", "--name", "bin", "--member", str_field(&kp, "key_package")]);
    let group_id = str_field(&created, "group_id").to_string();
    bob.ok(&["welcome", "join", created["welcomes"][0].as_str().unwrap()]);

    let message = alice.ok(&["message", "encrypt", "--hex", &group_id, "ff00fe"]);
    let processed = bob.ok(&["message", "process", &group_id, str_field(&message, "message")]);
    assert_eq!(processed["payload_hex"], "ff00fe");
    assert!(processed.get("payload").is_none());
}

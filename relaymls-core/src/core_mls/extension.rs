//! Nostr group data extension
//!
//! Transport metadata carried in the group context. It is encoded as its own
//! versioned record so it can be previewed and exported without touching
//! roster or secret material.

use super::codec;
use super::errors::{MlsError, MlsResult};
use super::types::NostrGroupId;
use serde::{Deserialize, Serialize};

const GROUP_DATA_MAGIC: &[u8; 4] = b"RMGD";
const GROUP_DATA_VERSION: u8 = 1;

/// Group name, description, admins and relays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NostrGroupData {
    /// Transport-layer address of the group
    pub nostr_group_id: NostrGroupId,
    pub name: String,
    pub description: String,
    /// Identities allowed to commit membership changes
    pub admin_identities: Vec<String>,
    pub relays: Vec<String>,
}

impl NostrGroupData {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        admin_identities: Vec<String>,
        relays: Vec<String>,
    ) -> Self {
        Self {
            nostr_group_id: NostrGroupId::random(),
            name: name.into(),
            description: description.into(),
            admin_identities,
            relays,
        }
    }

    pub fn is_admin(&self, identity: &str) -> bool {
        self.admin_identities.iter().any(|admin| admin == identity)
    }

    pub fn encode(&self) -> MlsResult<Vec<u8>> {
        codec::encode_framed(GROUP_DATA_MAGIC, GROUP_DATA_VERSION, self)
    }

    pub fn decode(bytes: &[u8]) -> MlsResult<Self> {
        codec::decode_framed(GROUP_DATA_MAGIC, GROUP_DATA_VERSION, bytes)
            .map_err(|e| MlsError::Serialization(format!("Invalid group data: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_data_encoding() {
        let data = NostrGroupData::new(
            "Test Group",
            "A test group",
            vec!["alice".to_string()],
            vec!["wss://relay.example".to_string()],
        );

        let decoded = NostrGroupData::decode(&data.encode().unwrap()).unwrap();
        assert_eq!(decoded, data);
        assert!(decoded.is_admin("alice"));
        assert!(!decoded.is_admin("bob"));
    }

    #[test]
    fn test_group_data_rejects_foreign_record() {
        assert!(NostrGroupData::decode(b"RMKP\x01garbage").is_err());
        assert!(NostrGroupData::decode(&[]).is_err());
    }
}

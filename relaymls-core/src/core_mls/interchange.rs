//! Text interchange records for handing results to a relay client
//!
//! Each record has a fixed set of fields and rejects unknown ones. Byte
//! fields are lowercase hex.

use super::errors::{MlsError, MlsResult};
use super::extension::NostrGroupData;
use super::session::{GroupCreated, GroupJoined};
use super::types::{GroupId, NostrGroupId};
use super::welcome::WelcomePreview;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

fn to_json<T: Serialize>(record: &T) -> MlsResult<String> {
    Ok(serde_json::to_string(record)?)
}

fn from_json<T: DeserializeOwned>(json: &str) -> MlsResult<T> {
    serde_json::from_str(json).map_err(|e| MlsError::InvalidInput(format!("Invalid record: {}", e)))
}

/// Transport metadata of a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NostrGroupDataRecord {
    pub nostr_group_id: String,
    pub name: String,
    pub description: String,
    pub admin_identities: Vec<String>,
    pub relays: Vec<String>,
}

impl From<&NostrGroupData> for NostrGroupDataRecord {
    fn from(data: &NostrGroupData) -> Self {
        Self {
            nostr_group_id: hex::encode(data.nostr_group_id.0),
            name: data.name.clone(),
            description: data.description.clone(),
            admin_identities: data.admin_identities.clone(),
            relays: data.relays.clone(),
        }
    }
}

impl TryFrom<&NostrGroupDataRecord> for NostrGroupData {
    type Error = MlsError;

    fn try_from(record: &NostrGroupDataRecord) -> MlsResult<Self> {
        let bytes: [u8; 32] = hex::decode(&record.nostr_group_id)?
            .try_into()
            .map_err(|_| MlsError::InvalidInput("nostr_group_id must be 32 bytes".to_string()))?;
        Ok(Self {
            nostr_group_id: NostrGroupId(bytes),
            name: record.name.clone(),
            description: record.description.clone(),
            admin_identities: record.admin_identities.clone(),
            relays: record.relays.clone(),
        })
    }
}

impl NostrGroupDataRecord {
    pub fn to_json(&self) -> MlsResult<String> {
        to_json(self)
    }

    pub fn from_json(json: &str) -> MlsResult<Self> {
        from_json(json)
    }
}

/// Result of creating a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupCreatedRecord {
    pub group_id: String,
    /// Identities in leaf order, creator first
    pub members: Vec<String>,
    /// Serialized welcomes in invited-member order
    pub welcomes: Vec<String>,
    pub group_data: NostrGroupDataRecord,
}

impl GroupCreatedRecord {
    pub fn from_created(created: &GroupCreated) -> MlsResult<Self> {
        let welcomes = created
            .welcomes
            .iter()
            .map(|w| w.to_bytes().map(hex::encode))
            .collect::<MlsResult<Vec<_>>>()?;

        Ok(Self {
            group_id: created.group_id().to_hex(),
            members: created.state.members().iter().map(|m| m.identity.clone()).collect(),
            welcomes,
            group_data: NostrGroupDataRecord::from(created.state.group_data()),
        })
    }

    pub fn group_id(&self) -> MlsResult<GroupId> {
        Ok(GroupId::from_hex(&self.group_id)?)
    }

    /// Welcome bytes in invited-member order
    pub fn welcome_bytes(&self) -> MlsResult<Vec<Vec<u8>>> {
        self.welcomes.iter().map(|w| Ok(hex::decode(w)?)).collect()
    }

    pub fn to_json(&self) -> MlsResult<String> {
        to_json(self)
    }

    pub fn from_json(json: &str) -> MlsResult<Self> {
        from_json(json)
    }
}

/// Result of joining a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupJoinedRecord {
    pub group_id: String,
    pub epoch: u64,
    pub members: Vec<String>,
    pub group_data: NostrGroupDataRecord,
}

impl From<&GroupJoined> for GroupJoinedRecord {
    fn from(joined: &GroupJoined) -> Self {
        Self {
            group_id: joined.group_id().to_hex(),
            epoch: joined.state.epoch(),
            members: joined.state.members().iter().map(|m| m.identity.clone()).collect(),
            group_data: NostrGroupDataRecord::from(joined.state.group_data()),
        }
    }
}

impl GroupJoinedRecord {
    pub fn to_json(&self) -> MlsResult<String> {
        to_json(self)
    }

    pub fn from_json(json: &str) -> MlsResult<Self> {
        from_json(json)
    }
}

/// What a welcome reveals before it is accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WelcomePreviewRecord {
    pub group_id: String,
    pub epoch: u64,
    pub member_count: usize,
    pub group_data: NostrGroupDataRecord,
}

impl From<&WelcomePreview> for WelcomePreviewRecord {
    fn from(preview: &WelcomePreview) -> Self {
        Self {
            group_id: preview.group_id.to_hex(),
            epoch: preview.epoch,
            member_count: preview.member_count,
            group_data: NostrGroupDataRecord::from(&preview.group_data),
        }
    }
}

impl WelcomePreviewRecord {
    pub fn to_json(&self) -> MlsResult<String> {
        to_json(self)
    }

    pub fn from_json(json: &str) -> MlsResult<Self> {
        from_json(json)
    }
}

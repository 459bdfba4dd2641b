//! # Credential Status Binding
//!
//! Binds a credential to a (list, index) slot and emits the
//! `BitstringStatusListEntry` embedded in the credential's
//! `credentialStatus` property.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bitstring::StatusSize;
use crate::core::generate;
use crate::error::StatusError;
use crate::provider::{Provider, StatusEntryStore, StatusListStore};
use crate::status::engine::{RetryOutcome, StatusListEngine};
use crate::status::list::{StatusList, StatusPurpose};

/// Persistent binding of one credential to one status list slot. Unique on
/// (credential id, purpose).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatusEntry {
    /// Entry identifier.
    pub entry_id: String,

    /// The bound credential.
    pub credential_id: String,

    /// The owning list.
    pub status_list_id: String,

    /// The slot within the list.
    pub status_list_index: usize,

    /// Cell width of the owning list.
    pub status_size: StatusSize,

    /// Purpose of the owning list.
    pub purpose: StatusPurpose,

    /// The credential's current status value.
    pub current_status: u8,

    /// Reason recorded with the last status change.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,

    /// Creation instant.
    pub created_at: DateTime<Utc>,

    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,
}

/// The `credentialStatus` object embedded in an issued credential, per
/// Bitstring Status List v1.0.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BitstringStatusListEntry {
    /// Always `BitstringStatusListEntry`.
    #[serde(rename = "type")]
    pub type_: String,

    /// Purpose of the referenced list.
    pub status_purpose: StatusPurpose,

    /// The credential's slot, serialized as a string per the spec.
    pub status_list_index: String,

    /// URL of the list credential, `<base>/v3/status-lists/<listId>`.
    pub status_list_credential: String,

    /// Cell width, present only for multi-bit lists.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status_size: Option<u8>,
}

impl BitstringStatusListEntry {
    /// The `type` of every status entry.
    pub const TYPE: &'static str = "BitstringStatusListEntry";

    /// The wire form of a persisted entry.
    #[must_use]
    pub fn from_entry(entry: &CredentialStatusEntry, base_url: &str) -> Self {
        Self {
            type_: Self::TYPE.to_string(),
            status_purpose: entry.purpose,
            status_list_index: entry.status_list_index.to_string(),
            status_list_credential: format!(
                "{base_url}/v3/status-lists/{}",
                entry.status_list_id
            ),
            status_size: (entry.status_size.bits() > 1).then(|| entry.status_size.into()),
        }
    }
}

/// Request to bind a credential to a status list slot.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AssignStatusRequest {
    /// The credential to bind.
    pub credential_id: String,

    /// The issuer whose lists are used.
    pub issuer_id: String,

    /// List purpose.
    pub purpose: StatusPurpose,

    /// Cell width for a newly created list.
    pub status_size: StatusSize,

    /// Initial status value for the slot.
    pub initial_status: u8,
}

impl Default for AssignStatusRequest {
    fn default() -> Self {
        Self {
            credential_id: String::new(),
            issuer_id: String::new(),
            purpose: StatusPurpose::Revocation,
            status_size: StatusSize::One,
            initial_status: 0,
        }
    }
}

impl<P: Provider> StatusListEngine<P> {
    /// Bind a credential to the next free slot of the issuer's open list
    /// for the requested purpose, returning the `credentialStatus` object
    /// to embed.
    ///
    /// Idempotent on (credential id, purpose): a repeated assignment
    /// returns the existing binding untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::ListFull`] if the slot reservation loses every
    /// retry to concurrent writers filling the list, or a repository error.
    pub async fn assign_credential_status(
        &self, request: &AssignStatusRequest,
    ) -> Result<BitstringStatusListEntry, StatusError> {
        if let Some(existing) = self
            .provider()
            .entry_for_credential(&request.credential_id, request.purpose)
            .await?
        {
            tracing::debug!(
                "credential {} already bound for {}", request.credential_id, request.purpose
            );
            return Ok(BitstringStatusListEntry::from_entry(&existing, self.base_url()));
        }

        let list = self
            .find_or_create_status_list(&request.issuer_id, request.purpose, request.status_size)
            .await?;
        let entry = self
            .create_status_entry(&list, &request.credential_id, request.initial_status)
            .await?;

        tracing::debug!(
            "assigned {} slot {} of list {}", request.credential_id, entry.status_list_index, list.id
        );
        Ok(BitstringStatusListEntry::from_entry(&entry, self.base_url()))
    }

    /// Persist a new status entry at the list's next free index,
    /// incrementing `used_entries` through a versioned update so the two
    /// writes appear atomic to concurrent readers.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::ListFull`] when no index is free, or a
    /// repository error.
    pub async fn create_status_entry(
        &self, list: &StatusList, credential_id: &str, initial_status: u8,
    ) -> Result<CredentialStatusEntry, StatusError> {
        let (list, index) = self.reserve_index(list, initial_status).await?;

        let now = Utc::now();
        let entry = CredentialStatusEntry {
            entry_id: generate::entry_id(),
            credential_id: credential_id.to_string(),
            status_list_id: list.id.clone(),
            status_list_index: index,
            status_size: list.status_size,
            purpose: list.purpose,
            current_status: initial_status,
            reason: None,
            created_at: now,
            updated_at: now,
        };
        self.provider().create_entry(&entry).await?;
        Ok(entry)
    }

    // Reserve the next index via a versioned list update, writing the
    // initial status into the bitstring in the same update when non-zero.
    async fn reserve_index(
        &self, list: &StatusList, initial_status: u8,
    ) -> Result<(StatusList, usize), StatusError> {
        let list_id = list.id.clone();
        self.with_retry(|| {
            let list_id = list_id.clone();
            async move {
                let Some(current) = self.provider().get_list(&list_id).await? else {
                    return Err(RetryOutcome::Fatal(StatusError::ListNotFound(list_id)));
                };
                if !current.has_capacity() {
                    return Err(RetryOutcome::Fatal(StatusError::ListFull(list_id)));
                }
                let index = current.used_entries;

                let mut updated = current.clone();
                updated.used_entries += 1;
                if initial_status != 0 {
                    updated.encoded_list = self
                        .write_cell(&current, index, initial_status)
                        .map_err(RetryOutcome::Fatal)?;
                }
                updated.updated_at = Utc::now();
                updated.version += 1;

                if self.provider().update_list(&updated, current.version).await? {
                    Ok((updated, index))
                } else {
                    Err(RetryOutcome::Conflict)
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wire_form() {
        let entry = CredentialStatusEntry {
            entry_id: "urn:uuid:e1".to_string(),
            credential_id: "cred-A".to_string(),
            status_list_id: "L1".to_string(),
            status_list_index: 42,
            status_size: StatusSize::One,
            purpose: StatusPurpose::Revocation,
            current_status: 0,
            reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let wire = BitstringStatusListEntry::from_entry(&entry, "https://issuer.example.org");
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["type"], "BitstringStatusListEntry");
        assert_eq!(json["statusPurpose"], "revocation");
        assert_eq!(json["statusListIndex"], "42");
        assert_eq!(
            json["statusListCredential"],
            "https://issuer.example.org/v3/status-lists/L1"
        );
        // single-bit lists omit statusSize
        assert!(json.get("statusSize").is_none());
    }

    #[test]
    fn multi_bit_wire_form() {
        let entry = CredentialStatusEntry {
            entry_id: "urn:uuid:e2".to_string(),
            credential_id: "cred-B".to_string(),
            status_list_id: "L2".to_string(),
            status_list_index: 7,
            status_size: StatusSize::Two,
            purpose: StatusPurpose::Message,
            current_status: 0,
            reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let wire = BitstringStatusListEntry::from_entry(&entry, "https://issuer.example.org");
        assert_eq!(wire.status_size, Some(2));
    }
}

//! # Status List Credential
//!
//! Materializes a status list as the `BitstringStatusListCredential` served
//! to verifiers at `<base>/v3/status-lists/<listId>`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::bitstring::StatusSize;
use crate::proof::DataIntegrityProof;
use crate::status::list::{StatusList, StatusPurpose};

const CREDENTIAL_TYPE: &str = "BitstringStatusListCredential";
const SUBJECT_TYPE: &str = "BitstringStatusList";

/// One row of a multi-bit list's status message table.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct StatusMessage {
    /// The cell value as lowercase hex, e.g. `0x1`.
    pub status: String,

    /// Meaning of the value.
    pub message: String,
}

/// The `credentialSubject` of a status list credential.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusListSubject {
    /// Subject id, `<credential id>#list`.
    pub id: String,

    /// Always `BitstringStatusList`.
    #[serde(rename = "type")]
    pub type_: String,

    /// Meaning of set cells.
    pub status_purpose: StatusPurpose,

    /// The compressed, encoded bit buffer.
    pub encoded_list: String,

    /// Cell width, present only for multi-bit lists.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status_size: Option<u8>,

    /// Value table, present only for multi-bit lists.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status_messages: Option<Vec<StatusMessage>>,

    /// Cache lifetime hint in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ttl: Option<u64>,
}

/// A verifiable credential wrapping one status list.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusListCredential {
    /// VC-DM v2 context.
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// Credential id, `<base>/v3/status-lists/<listId>`.
    pub id: String,

    /// `["VerifiableCredential", "BitstringStatusListCredential"]`.
    #[serde(rename = "type")]
    pub type_: Vec<String>,

    /// Issuer id.
    pub issuer: String,

    /// The list's creation instant.
    pub valid_from: DateTime<Utc>,

    /// `valid_from + ttl`, present only when the list carries a ttl.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub valid_until: Option<DateTime<Utc>>,

    /// The list itself.
    pub credential_subject: StatusListSubject,

    /// Embedded proof, attached before serving.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub proof: Option<DataIntegrityProof>,
}

impl StatusListCredential {
    /// Build the unsigned credential for a list.
    #[must_use]
    pub fn new(list: &StatusList, base_url: &str) -> Self {
        let id = format!("{base_url}/v3/status-lists/{}", list.id);
        let multi_bit = list.status_size.bits() > 1;

        Self {
            context: vec!["https://www.w3.org/ns/credentials/v2".to_string()],
            id: id.clone(),
            type_: vec!["VerifiableCredential".to_string(), CREDENTIAL_TYPE.to_string()],
            issuer: list.issuer_id.clone(),
            valid_from: list.created_at,
            valid_until: list
                .ttl
                .map(|ttl| list.created_at + Duration::milliseconds(ttl as i64)),
            credential_subject: StatusListSubject {
                id: format!("{id}#list"),
                type_: SUBJECT_TYPE.to_string(),
                status_purpose: list.purpose,
                encoded_list: list.encoded_list.clone(),
                status_size: multi_bit.then(|| list.status_size.into()),
                status_messages: multi_bit
                    .then(|| default_messages(list.purpose, list.status_size)),
                ttl: list.ttl,
            },
            proof: None,
        }
    }
}

/// The default value table for a multi-bit list: every cell value
/// `0..2^statusSize` labeled for the list's purpose.
#[must_use]
pub fn default_messages(purpose: StatusPurpose, size: StatusSize) -> Vec<StatusMessage> {
    (0..size.status_count())
        .map(|value| StatusMessage {
            status: format!("{value:#x}"),
            message: message_for(purpose, value),
        })
        .collect()
}

fn message_for(purpose: StatusPurpose, value: usize) -> String {
    match (purpose, value) {
        (StatusPurpose::Revocation, 0) => "not revoked".to_string(),
        (StatusPurpose::Revocation, _) => "revoked".to_string(),
        (StatusPurpose::Suspension, 0) => "not suspended".to_string(),
        (StatusPurpose::Suspension, _) => "suspended".to_string(),
        (_, value) => format!("status {value}"),
    }
}

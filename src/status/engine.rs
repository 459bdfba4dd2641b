//! # Status List Engine
//!
//! Allocation of status lists per (issuer, purpose, cell width), sequential
//! index allocation within a list, and status mutation. Mutations go
//! through a versioned repository update: the engine re-reads the list,
//! applies the change, and persists against the version it read. A losing
//! writer backs off and retries a bounded number of times.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::bitstring::{Bitstring, MIN_ENTRIES, StatusSize};
use crate::codec;
use crate::core::generate;
use crate::error::StatusError;
use crate::provider::{ListFilter, Provider, StatusEntryStore, StatusListStore};
use crate::status::entry::CredentialStatusEntry;
use crate::status::list::{StatusList, StatusPurpose};

/// Retries after a losing versioned update, with backoff 100·2^k ms.
const MAX_RETRIES: u32 = 3;

/// Request to change a credential's status.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    /// The bound credential.
    pub credential_id: String,

    /// New status value; must fit the list's cell width.
    pub status: u8,

    /// Optional reason recorded on the entry.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,

    /// Which binding of the credential to change.
    #[serde(default)]
    pub purpose: StatusPurpose,
}

/// The outcome of one attempt inside the retry loop.
pub(super) enum RetryOutcome {
    /// The versioned update lost; back off and try again.
    Conflict,

    /// Retrying cannot help.
    Fatal(StatusError),
}

impl From<anyhow::Error> for RetryOutcome {
    fn from(e: anyhow::Error) -> Self {
        Self::Fatal(StatusError::Repository(e))
    }
}

/// Engine over a status list repository. The sole writer of
/// `encoded_list` and `used_entries`.
#[derive(Clone, Debug)]
pub struct StatusListEngine<P> {
    provider: P,
    base_url: String,
}

impl<P: Provider> StatusListEngine<P> {
    /// Build an engine over a repository.
    pub fn new(provider: P, base_url: impl Into<String>) -> Self {
        Self {
            provider,
            base_url: base_url.into(),
        }
    }

    /// An OPEN list for (issuer, purpose, cell width), creating one at the
    /// default capacity when every existing list is full.
    ///
    /// # Errors
    ///
    /// Returns an error if list creation or the repository fails.
    pub async fn find_or_create_status_list(
        &self, issuer_id: &str, purpose: StatusPurpose, status_size: StatusSize,
    ) -> Result<StatusList, StatusError> {
        if let Some(list) = self.provider.find_open_list(issuer_id, purpose, status_size).await? {
            return Ok(list);
        }
        self.create_status_list(issuer_id, purpose, status_size, None, None).await
    }

    /// Create and persist a status list with a zero-filled bitstring.
    ///
    /// # Errors
    ///
    /// Returns an error if `total_entries` is below the privacy floor or
    /// persistence fails.
    pub async fn create_status_list(
        &self, issuer_id: &str, purpose: StatusPurpose, status_size: StatusSize,
        total_entries: Option<usize>, ttl: Option<u64>,
    ) -> Result<StatusList, StatusError> {
        let total_entries = total_entries.unwrap_or(MIN_ENTRIES);
        let bits = Bitstring::new(total_entries, status_size)?;
        let encoded_list = codec::encode(bits.as_bytes())?;

        let now = Utc::now();
        let list = StatusList {
            id: generate::status_list_id(),
            issuer_id: issuer_id.to_string(),
            purpose,
            status_size,
            total_entries,
            used_entries: 0,
            encoded_list,
            ttl,
            created_at: now,
            updated_at: now,
            metadata: None,
            version: 0,
        };
        self.provider.create_list(&list).await?;

        tracing::debug!("created {purpose} status list {} for {issuer_id}", list.id);
        Ok(list)
    }

    /// The list under `list_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::ListNotFound`] for unknown ids.
    pub async fn get_status_list(&self, list_id: &str) -> Result<StatusList, StatusError> {
        self.provider
            .get_list(list_id)
            .await?
            .ok_or_else(|| StatusError::ListNotFound(list_id.to_string()))
    }

    /// All lists matching the filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn list_status_lists(
        &self, filter: &ListFilter,
    ) -> Result<Vec<StatusList>, StatusError> {
        Ok(self.provider.list_lists(filter).await?)
    }

    /// The next free index of a list, or `None` when the list is full.
    ///
    /// Allocation is sequential and never reclaims: a wasted slot costs one
    /// cell.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::ListNotFound`] for unknown ids.
    pub async fn next_available_index(&self, list_id: &str) -> Result<Option<usize>, StatusError> {
        let list = self.get_status_list(list_id).await?;
        Ok(list.has_capacity().then_some(list.used_entries))
    }

    /// Change a credential's status: write the new value at the entry's
    /// index in the owning list's bitstring and record it on the entry.
    ///
    /// A reader that observes the updated entry also observes the updated
    /// bitstring: the list (with the new bit) is persisted through a
    /// versioned update before the entry, and losing writers retry.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::EntryNotFound`] for an unbound credential,
    /// [`StatusError::UpdateConflict`] when retries are exhausted, or a
    /// value/bounds error from the bitstring.
    pub async fn update_credential_status(
        &self, request: &UpdateStatusRequest,
    ) -> Result<CredentialStatusEntry, StatusError> {
        let entry = self
            .provider
            .entry_for_credential(&request.credential_id, request.purpose)
            .await?
            .ok_or_else(|| StatusError::EntryNotFound(request.credential_id.clone()))?;

        let updated = self
            .with_retry(|| {
                let entry = entry.clone();
                let request = request.clone();
                async move {
                    let Some(list) = self.provider.get_list(&entry.status_list_id).await? else {
                        return Err(RetryOutcome::Fatal(StatusError::ListNotFound(
                            entry.status_list_id.clone(),
                        )));
                    };

                    let encoded = self
                        .write_cell(&list, entry.status_list_index, request.status)
                        .map_err(RetryOutcome::Fatal)?;

                    let mut updated_list = list.clone();
                    updated_list.encoded_list = encoded;
                    updated_list.updated_at = Utc::now();
                    updated_list.version += 1;

                    if !self.provider.update_list(&updated_list, list.version).await? {
                        return Err(RetryOutcome::Conflict);
                    }

                    let mut updated_entry = entry;
                    updated_entry.current_status = request.status;
                    updated_entry.reason = request.reason.clone();
                    updated_entry.updated_at = Utc::now();
                    self.provider.update_entry(&updated_entry).await?;
                    Ok(updated_entry)
                }
            })
            .await?;

        tracing::debug!(
            "status of {} ({}) set to {}", request.credential_id, request.purpose, request.status
        );
        Ok(updated)
    }

    /// The current status value of a credential, read from the owning
    /// list's bitstring.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::EntryNotFound`] for an unbound credential.
    pub async fn credential_status_value(
        &self, credential_id: &str, purpose: StatusPurpose,
    ) -> Result<u8, StatusError> {
        let entry = self
            .provider
            .entry_for_credential(credential_id, purpose)
            .await?
            .ok_or_else(|| StatusError::EntryNotFound(credential_id.to_string()))?;
        let list = self.get_status_list(&entry.status_list_id).await?;

        let bits = Bitstring::from_bytes(
            codec::decode(&list.encoded_list)?,
            list.total_entries,
            list.status_size,
        )?;
        Ok(bits.get(entry.status_list_index)?)
    }

    pub(super) fn provider(&self) -> &P {
        &self.provider
    }

    pub(super) fn base_url(&self) -> &str {
        &self.base_url
    }

    // Decode the list's bitstring, write one cell, re-encode.
    pub(super) fn write_cell(
        &self, list: &StatusList, index: usize, value: u8,
    ) -> Result<String, StatusError> {
        let mut bits = Bitstring::from_bytes(
            codec::decode(&list.encoded_list)?,
            list.total_entries,
            list.status_size,
        )?;
        bits.set(index, value)?;
        Ok(codec::encode(bits.as_bytes())?)
    }

    // Run `op` until it succeeds or fails fatally, backing off 200, 400,
    // 800 ms after losing attempts.
    pub(super) async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T, StatusError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RetryOutcome>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(RetryOutcome::Fatal(e)) => return Err(e),
                Err(RetryOutcome::Conflict) => {
                    attempt += 1;
                    if attempt > MAX_RETRIES {
                        return Err(StatusError::UpdateConflict(MAX_RETRIES));
                    }
                    let backoff = Duration::from_millis(100 * (1 << attempt));
                    tracing::debug!("status update conflict, retrying in {backoff:?}");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

//! # Providers
//!
//! Repository traits the core consumes. Implementations own persistence of
//! status lists, status entries and assertions; the engines never touch a
//! backend directly. The bundled [`InMemoryProvider`] is the reference
//! implementation and the backend used by the test suite.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::{Result, bail};
use tokio::sync::RwLock;

use crate::bitstring::StatusSize;
use crate::credential::Assertion;
use crate::status::{CredentialStatusEntry, StatusList, StatusPurpose};

/// Filter for listing status lists.
#[derive(Clone, Debug, Default)]
pub struct ListFilter {
    /// Restrict to one issuer.
    pub issuer_id: Option<String>,

    /// Restrict to one purpose.
    pub purpose: Option<StatusPurpose>,

    /// Restrict by remaining capacity.
    pub has_capacity: Option<bool>,
}

/// Persistence of status lists.
pub trait StatusListStore: Send + Sync {
    /// The list under `list_id`, if any.
    fn get_list(&self, list_id: &str) -> impl Future<Output = Result<Option<StatusList>>> + Send;

    /// An OPEN list (spare capacity) matching issuer, purpose and cell
    /// width, if any.
    fn find_open_list(
        &self, issuer_id: &str, purpose: StatusPurpose, status_size: StatusSize,
    ) -> impl Future<Output = Result<Option<StatusList>>> + Send;

    /// Persist a new list.
    fn create_list(&self, list: &StatusList) -> impl Future<Output = Result<()>> + Send;

    /// Persist a mutated list if its stored version still equals
    /// `expected_version`. Returns `false` on a version conflict; the
    /// caller retries.
    fn update_list(
        &self, list: &StatusList, expected_version: u64,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// All lists matching the filter.
    fn list_lists(&self, filter: &ListFilter)
    -> impl Future<Output = Result<Vec<StatusList>>> + Send;
}

/// Persistence of credential status entries.
pub trait StatusEntryStore: Send + Sync {
    /// The entry under `entry_id`, if any.
    fn get_entry(
        &self, entry_id: &str,
    ) -> impl Future<Output = Result<Option<CredentialStatusEntry>>> + Send;

    /// The entry binding `credential_id` for `purpose`, if any. At most one
    /// exists per (credential, purpose).
    fn entry_for_credential(
        &self, credential_id: &str, purpose: StatusPurpose,
    ) -> impl Future<Output = Result<Option<CredentialStatusEntry>>> + Send;

    /// Persist a new entry. Fails if the (credential, purpose) pair is
    /// already bound.
    fn create_entry(
        &self, entry: &CredentialStatusEntry,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Persist a mutated entry.
    fn update_entry(
        &self, entry: &CredentialStatusEntry,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Persistence of issued assertions.
pub trait AssertionStore: Send + Sync {
    /// The assertion under `assertion_id`, if any.
    fn get_assertion(
        &self, assertion_id: &str,
    ) -> impl Future<Output = Result<Option<Assertion>>> + Send;

    /// Persist an assertion, replacing any previous version.
    fn put_assertion(&self, assertion: &Assertion) -> impl Future<Output = Result<()>> + Send;
}

/// Everything the core needs from a backend.
pub trait Provider: StatusListStore + StatusEntryStore + AssertionStore + Clone {}

/// A blanket implementation for `Provider` so that any type implementing
/// the required super traits is considered a `Provider`.
impl<T> Provider for T where T: StatusListStore + StatusEntryStore + AssertionStore + Clone {}

#[derive(Debug, Default)]
struct Store {
    lists: HashMap<String, StatusList>,
    entries: HashMap<String, CredentialStatusEntry>,
    // (credential id, purpose) -> entry id
    bindings: HashMap<(String, StatusPurpose), String>,
    assertions: HashMap<String, Assertion>,
}

/// In-memory provider. All maps sit behind one read-write lock, so the
/// versioned list update is checked and applied atomically.
#[derive(Clone, Debug, Default)]
pub struct InMemoryProvider {
    store: Arc<RwLock<Store>>,
}

impl InMemoryProvider {
    /// An empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusListStore for InMemoryProvider {
    async fn get_list(&self, list_id: &str) -> Result<Option<StatusList>> {
        Ok(self.store.read().await.lists.get(list_id).cloned())
    }

    async fn find_open_list(
        &self, issuer_id: &str, purpose: StatusPurpose, status_size: StatusSize,
    ) -> Result<Option<StatusList>> {
        let store = self.store.read().await;
        let mut open: Vec<&StatusList> = store
            .lists
            .values()
            .filter(|list| {
                list.issuer_id == issuer_id
                    && list.purpose == purpose
                    && list.status_size == status_size
                    && list.has_capacity()
            })
            .collect();
        open.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(open.first().map(|list| (*list).clone()))
    }

    async fn create_list(&self, list: &StatusList) -> Result<()> {
        let mut store = self.store.write().await;
        if store.lists.contains_key(&list.id) {
            bail!("status list already exists: {}", list.id);
        }
        store.lists.insert(list.id.clone(), list.clone());
        Ok(())
    }

    async fn update_list(&self, list: &StatusList, expected_version: u64) -> Result<bool> {
        let mut store = self.store.write().await;
        let Some(stored) = store.lists.get_mut(&list.id) else {
            bail!("status list not found: {}", list.id);
        };
        if stored.version != expected_version {
            return Ok(false);
        }
        *stored = list.clone();
        Ok(true)
    }

    async fn list_lists(&self, filter: &ListFilter) -> Result<Vec<StatusList>> {
        let store = self.store.read().await;
        let mut lists: Vec<StatusList> = store
            .lists
            .values()
            .filter(|list| {
                filter.issuer_id.as_ref().is_none_or(|id| &list.issuer_id == id)
                    && filter.purpose.is_none_or(|p| list.purpose == p)
                    && filter.has_capacity.is_none_or(|wanted| list.has_capacity() == wanted)
            })
            .cloned()
            .collect();
        lists.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(lists)
    }
}

impl StatusEntryStore for InMemoryProvider {
    async fn get_entry(&self, entry_id: &str) -> Result<Option<CredentialStatusEntry>> {
        Ok(self.store.read().await.entries.get(entry_id).cloned())
    }

    async fn entry_for_credential(
        &self, credential_id: &str, purpose: StatusPurpose,
    ) -> Result<Option<CredentialStatusEntry>> {
        let store = self.store.read().await;
        let Some(entry_id) = store.bindings.get(&(credential_id.to_string(), purpose)) else {
            return Ok(None);
        };
        Ok(store.entries.get(entry_id).cloned())
    }

    async fn create_entry(&self, entry: &CredentialStatusEntry) -> Result<()> {
        let mut store = self.store.write().await;
        let binding = (entry.credential_id.clone(), entry.purpose);
        if store.bindings.contains_key(&binding) {
            bail!("credential {} already bound for {}", entry.credential_id, entry.purpose);
        }
        store.bindings.insert(binding, entry.entry_id.clone());
        store.entries.insert(entry.entry_id.clone(), entry.clone());
        Ok(())
    }

    async fn update_entry(&self, entry: &CredentialStatusEntry) -> Result<()> {
        let mut store = self.store.write().await;
        if !store.entries.contains_key(&entry.entry_id) {
            bail!("status entry not found: {}", entry.entry_id);
        }
        store.entries.insert(entry.entry_id.clone(), entry.clone());
        Ok(())
    }
}

impl AssertionStore for InMemoryProvider {
    async fn get_assertion(&self, assertion_id: &str) -> Result<Option<Assertion>> {
        Ok(self.store.read().await.assertions.get(assertion_id).cloned())
    }

    async fn put_assertion(&self, assertion: &Assertion) -> Result<()> {
        let mut store = self.store.write().await;
        store.assertions.insert(assertion.id.clone(), assertion.clone());
        Ok(())
    }
}

//! # Bitstring Status List
//!
//! Types and engine for credential status backed by a compressed bitstring,
//! following [Bitstring Status List v1.0](https://www.w3.org/TR/vc-bitstring-status-list/):
//! per-issuer/per-purpose list allocation, sequential index allocation,
//! concurrency-safe status mutation, and materialization of the
//! `BitstringStatusListCredential` served to verifiers.

pub mod credential;
pub mod engine;
pub mod entry;
pub mod list;

pub use credential::{StatusListCredential, StatusListSubject, StatusMessage};
pub use engine::StatusListEngine;
pub use entry::{AssignStatusRequest, BitstringStatusListEntry, CredentialStatusEntry};
pub use list::{StatusList, StatusPurpose};

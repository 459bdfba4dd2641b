//! # Identifier Generation

use uuid::Uuid;

/// Generate an opaque identifier for a status list.
#[must_use]
pub fn status_list_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate an opaque identifier for a credential status entry.
#[must_use]
pub fn entry_id() -> String {
    format!("urn:uuid:{}", Uuid::new_v4())
}

/// Generate an opaque identifier for a credential.
#[must_use]
pub fn credential_id(base_url: &str) -> String {
    format!("{base_url}/v3/assertions/{}", Uuid::new_v4())
}

//! # Error Taxonomy
//!
//! Failures fall into two families. Verification failures are *values*: the
//! pipeline returns a [`crate::credential::VerificationStatus`] carrying a
//! [`VerifyErrorCode`], never an `Err`. Everything else propagates as a typed
//! error from the owning component.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the status list codec.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The encoded form is not valid multibase base64url.
    #[error("cannot decode encoded list: {0}")]
    Decode(String),

    /// The GZIP stream is malformed, or compression failed.
    #[error("cannot compress or decompress list data: {0}")]
    Compression(String),
}

/// Errors raised by the packed bit array.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BitstringError {
    /// Status size must be 1, 2, 4 or 8 bits.
    #[error("status size must be 1, 2, 4 or 8 bits, got {0}")]
    InvalidStatusSize(u8),

    /// The privacy floor on list length was not met.
    #[error("status list must hold at least {min} entries, got {got}")]
    TooFewEntries {
        /// Minimum entry count.
        min: usize,
        /// Requested entry count.
        got: usize,
    },

    /// Cell index past the end of the list, on read or write.
    #[error("index {index} out of bounds for {capacity} entries")]
    IndexOutOfBounds {
        /// Requested cell index.
        index: usize,
        /// Number of cells the buffer holds.
        capacity: usize,
    },

    /// Status value wider than the cell.
    #[error("status value {value} does not fit in {bits} bits")]
    ValueOutOfRange {
        /// Rejected value.
        value: u8,
        /// Cell width in bits.
        bits: u8,
    },

    /// A decoded buffer was not the expected size for the list.
    #[error("buffer is {got} bytes, expected {expected}")]
    LengthMismatch {
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        got: usize,
    },
}

/// Errors raised by the key store.
#[derive(Error, Debug)]
pub enum KeyError {
    /// No key pair under the requested id, in memory or on disk.
    #[error("key not found: {0}")]
    NotFound(String),

    /// The reserved `"default"` key pair cannot be deleted.
    #[error("the default key pair cannot be deleted")]
    DefaultUndeletable,

    /// Key material could not be parsed or converted.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// Underlying filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by the status list engine and binder.
#[derive(Error, Debug)]
pub enum StatusError {
    /// Every index in the list has been allocated.
    #[error("status list {0} is full")]
    ListFull(String),

    /// Optimistic-concurrency retries were exhausted.
    #[error("status update conflicted with concurrent writers after {0} attempts")]
    UpdateConflict(u32),

    /// No status list under the requested id.
    #[error("status list not found: {0}")]
    ListNotFound(String),

    /// No status entry for the requested credential and purpose.
    #[error("status entry not found for credential {0}")]
    EntryNotFound(String),

    /// Bit-level failure while mutating the list.
    #[error(transparent)]
    Bitstring(#[from] BitstringError),

    /// Encode/decode failure on the packed list.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Failure surfaced by the backing repository.
    #[error("repository error: {0}")]
    Repository(#[from] anyhow::Error),
}

/// Errors raised by the schema validator.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The schema could not be retrieved.
    #[error("failed to fetch schema {url}: {reason}")]
    Fetch {
        /// Schema URL.
        url: String,
        /// Transport-level reason.
        reason: String,
    },

    /// The fetched document is not a usable JSON Schema.
    #[error("schema {0} is not a usable JSON Schema")]
    InvalidSchema(String),

    /// The credential failed validation against the schema.
    #[error("credential failed schema validation: {0}")]
    Validation(String),

    /// The schema reference type is not one this validator supports.
    #[error("unsupported schema type: {0}")]
    UnsupportedType(String),

    /// The overall fetch-and-validate deadline elapsed.
    #[error("schema validation timed out after {0} ms")]
    Timeout(u64),
}

/// Machine-readable code carried by a failed
/// [`crate::credential::VerificationStatus`].
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerifyErrorCode {
    /// No assertion under the requested id.
    AssertionNotFound,
    /// The assertion's `expires` instant has passed.
    AssertionExpired,
    /// The assertion is revoked, by flag or by status list bit.
    AssertionRevoked,
    /// The proof carries no signature material.
    SignatureMissing,
    /// The signature material is structurally invalid.
    SignatureInvalid,
    /// The signature did not verify against the resolved key.
    SignatureVerificationFailed,
    /// The proof references a key the store does not hold.
    KeyNotFound,
    /// The resolved key's type contradicts the proof's cryptosuite.
    KeyTypeMismatch,
    /// The credential carries no proof at all.
    ProofMissing,
    /// The proof matches neither supported proof shape.
    ProofInvalid,
    /// The proof type is recognized but not supported.
    ProofTypeUnsupported,
    /// The proof names a cryptosuite outside the supported set.
    CryptosuiteUnsupported,
    /// An unexpected fault inside a verification component.
    InternalError,
}

/// A structured verification failure: one code plus human-readable details.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{details}")]
pub struct VerifyFailure {
    /// Machine-readable code.
    pub code: VerifyErrorCode,
    /// Human-readable details.
    pub details: String,
}

impl VerifyFailure {
    /// Build a failure from a code and details.
    pub fn new(code: VerifyErrorCode, details: impl Into<String>) -> Self {
        Self {
            code,
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // Error codes serialize to the wire-format SCREAMING_SNAKE_CASE strings.
    #[test]
    fn code_wire_form() {
        let ser = serde_json::to_value(VerifyErrorCode::CryptosuiteUnsupported).unwrap();
        assert_eq!(ser, serde_json::json!("CRYPTOSUITE_UNSUPPORTED"));

        let code: VerifyErrorCode = serde_json::from_value(serde_json::json!("KEY_NOT_FOUND")).unwrap();
        assert_eq!(code, VerifyErrorCode::KeyNotFound);
    }
}

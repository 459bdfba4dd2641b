//! # Credentials
//!
//! The assertion (credential) model and the verification status it resolves
//! to. The assertion is treated as a structured object with the fields the
//! core needs; JSON-LD context resolution is out of scope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{Kind, OneMany};
use crate::error::{VerifyErrorCode, VerifyFailure};
use crate::status::BitstringStatusListEntry;

/// Issuer profile referenced by a credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Issuer {
    /// Issuer identifier (IRI).
    pub id: String,

    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
}

/// The subject of an achievement credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSubject {
    /// Subject identifier.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,

    /// Recipient identity object.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub recipient: Option<Value>,

    /// The achievement being asserted.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub achievement: Option<Value>,

    /// Any additional subject claims.
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

/// An Open Badges assertion: a signed claim that a recipient holds an
/// achievement.
///
/// Carries both the legacy top-level fields (`badgeClass`, `recipient`,
/// `issuedOn`, `expires`) that participate in the signing payload and the
/// VC-DM fields (`credentialSubject`, `credentialStatus`). The proof is
/// held as raw JSON and parsed into a typed
/// [`crate::proof::Proof`] at verification time so a malformed proof is a
/// verification outcome, not a parse failure.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Assertion {
    /// JSON-LD contexts (uninterpreted).
    #[serde(rename = "@context", skip_serializing_if = "Vec::is_empty", default)]
    pub context: Vec<String>,

    /// Credential identifier (IRI).
    pub id: String,

    /// Credential types; includes `VerifiableCredential` and
    /// `OpenBadgeCredential`.
    #[serde(rename = "type")]
    pub type_: OneMany<String>,

    /// Issuer id or embedded profile.
    pub issuer: Kind<Issuer>,

    /// Issuance instant.
    #[serde(skip_serializing_if = "Option::is_none", default, alias = "issuanceDate")]
    pub issued_on: Option<DateTime<Utc>>,

    /// Referenced badge class (IRI or embedded object).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub badge_class: Option<Value>,

    /// Recipient identity object.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub recipient: Option<Value>,

    /// VC-DM credential subject.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub credential_subject: Option<CredentialSubject>,

    /// Expiry instant.
    #[serde(skip_serializing_if = "Option::is_none", default, alias = "expirationDate")]
    pub expires: Option<DateTime<Utc>>,

    /// Denormalized revocation flag.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub revoked: Option<bool>,

    /// Reason recorded at revocation.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub revocation_reason: Option<String>,

    /// Reference into a bitstring status list.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub credential_status: Option<BitstringStatusListEntry>,

    /// Attached proof, Data Integrity or JWT. Accepted under the legacy
    /// `verification` name as well.
    #[serde(skip_serializing_if = "Option::is_none", default, alias = "verification")]
    pub proof: Option<Value>,
}

impl Assertion {
    /// The assertion as a JSON value (for canonicalization).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> anyhow::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Outcome of verifying an assertion. Failures are values: `is_valid` is
/// `false` and `error_code`/`details` say why.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStatus {
    /// Overall outcome.
    pub is_valid: bool,

    /// The assertion's expiry has passed.
    pub is_expired: bool,

    /// The assertion is revoked.
    pub is_revoked: bool,

    /// The attached proof verified against the resolved key.
    pub has_valid_signature: bool,

    /// Failure code, absent on success.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_code: Option<VerifyErrorCode>,

    /// Human-readable failure details.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub details: Option<String>,

    /// When verification ran.
    pub verified_at: DateTime<Utc>,

    /// The verification method of the proof, when resolved.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub verification_method: Option<String>,

    /// The cryptosuite of the proof, when known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cryptosuite: Option<String>,
}

impl VerificationStatus {
    /// A successful verification.
    #[must_use]
    pub fn success(verification_method: Option<String>, cryptosuite: Option<String>) -> Self {
        Self {
            is_valid: true,
            is_expired: false,
            is_revoked: false,
            has_valid_signature: true,
            error_code: None,
            details: None,
            verified_at: Utc::now(),
            verification_method,
            cryptosuite,
        }
    }

    /// A failed verification carrying the failure's code and details.
    #[must_use]
    pub fn failure(failure: &VerifyFailure) -> Self {
        Self {
            is_valid: false,
            is_expired: failure.code == VerifyErrorCode::AssertionExpired,
            is_revoked: failure.code == VerifyErrorCode::AssertionRevoked,
            has_valid_signature: false,
            error_code: Some(failure.code),
            details: Some(failure.details.clone()),
            verified_at: Utc::now(),
            verification_method: None,
            cryptosuite: None,
        }
    }
}

//! # Data Integrity Proofs
//!
//! Embedded proofs per [Verifiable Credential Data Integrity 1.0]
//! (https://www.w3.org/TR/vc-data-integrity): the proof object sits inside
//! the credential, and the signature covers the canonical form of the
//! credential with the proof removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The `type` of every embedded proof this engine produces.
pub const PROOF_TYPE: &str = "DataIntegrityProof";

/// The purpose every assertion proof is created under.
pub const PROOF_PURPOSE: &str = "assertionMethod";

/// An embedded Data Integrity proof.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataIntegrityProof {
    /// Always `DataIntegrityProof`.
    #[serde(rename = "type")]
    pub type_: String,

    /// Named cryptosuite. Kept as a raw string so unsupported suites can be
    /// parsed and rejected with a precise error.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cryptosuite: Option<String>,

    /// Proof creation instant.
    pub created: DateTime<Utc>,

    /// Always `assertionMethod`.
    pub proof_purpose: String,

    /// IRI of the public key, `<base>/public-keys/<keyId>`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub verification_method: Option<String>,

    /// Standard base64 signature over the canonical credential bytes.
    pub proof_value: String,
}

//! # JOSE Proofs
//!
//! Enveloping proofs for credentials based on JWT [RFC7519], JWS [RFC7515]
//! and JWK [RFC7517], bridged to the credential model per
//! [VC-JOSE-COSE](https://w3c.github.io/vc-jose-cose): the credential rides
//! in the `vc` claim of a compact-serialized, signed JWT.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::serde::{ts_seconds, ts_seconds_option};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{VerifyErrorCode, VerifyFailure};
use crate::signature::{self, KeyType};

/// Clock tolerance applied to `exp` and `nbf` checks.
pub const CLOCK_LEEWAY_SECS: i64 = 60;

/// The recommended JWS algorithm for a key type.
#[must_use]
pub const fn recommended_algorithm(key_type: KeyType) -> &'static str {
    match key_type {
        KeyType::Rsa => "RS256",
        KeyType::Ed25519 => "EdDSA",
    }
}

/// JOSE header of a credential JWT.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Header {
    /// JWS algorithm.
    pub alg: String,

    /// Always `JWT`.
    pub typ: String,

    /// Key id, conventionally the proof's `verificationMethod` IRI.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub kid: Option<String>,
}

/// The credential claims carried under `vc`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VcPayload {
    /// JSON-LD contexts (uninterpreted).
    #[serde(rename = "@context", skip_serializing_if = "Vec::is_empty", default)]
    pub context: Vec<String>,

    /// Credential id.
    pub id: String,

    /// Credential types.
    #[serde(rename = "type")]
    pub type_: Vec<String>,

    /// Credential subject.
    pub credential_subject: Value,

    /// Start of validity.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub valid_from: Option<DateTime<Utc>>,

    /// End of validity.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub valid_until: Option<DateTime<Utc>>,

    /// Status list reference.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub credential_status: Option<Value>,
}

/// Claims of a credential JWT.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct JwtClaims {
    /// The credential issuer.
    pub iss: String,

    /// The subject the credential is about.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sub: Option<String>,

    /// Intended audience.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub aud: Option<String>,

    /// Signature expiry, distinct from the credential's own expiry.
    #[serde(with = "ts_seconds_option", skip_serializing_if = "Option::is_none", default)]
    pub exp: Option<DateTime<Utc>>,

    /// Not-before instant.
    #[serde(with = "ts_seconds_option", skip_serializing_if = "Option::is_none", default)]
    pub nbf: Option<DateTime<Utc>>,

    /// Issued-at instant.
    #[serde(with = "ts_seconds")]
    pub iat: DateTime<Utc>,

    /// JWT id, the credential id.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub jti: Option<String>,

    /// The credential itself.
    pub vc: VcPayload,
}

/// Compact-serialize and sign a credential JWT.
///
/// # Errors
///
/// Returns an error if serialization or signing fails.
pub fn encode(
    header: &Header, claims: &JwtClaims, private_pem: &str, key_type: KeyType,
) -> anyhow::Result<String> {
    let header_b64 = Base64UrlUnpadded::encode_string(&serde_json::to_vec(header)?);
    let claims_b64 = Base64UrlUnpadded::encode_string(&serde_json::to_vec(claims)?);
    let signing_input = format!("{header_b64}.{claims_b64}");

    let sig = signature::sign(signing_input.as_bytes(), private_pem, key_type)?;
    Ok(format!("{signing_input}.{}", Base64UrlUnpadded::encode_string(&sig)))
}

/// Verify a compact JWS against a public key, enforcing the algorithm/key
/// match and the `exp`/`nbf` window with [`CLOCK_LEEWAY_SECS`] tolerance.
///
/// # Errors
///
/// Returns a [`VerifyFailure`] describing the first check that failed.
pub fn verify(jws: &str, public_pem: &str, key_type: KeyType) -> Result<JwtClaims, VerifyFailure> {
    let parts: Vec<&str> = jws.split('.').collect();
    let [header_b64, claims_b64, sig_b64] = parts.as_slice() else {
        return Err(VerifyFailure::new(
            VerifyErrorCode::SignatureInvalid,
            "proof is not a compact JWS",
        ));
    };

    let header: Header = decode_part(header_b64, "JWS header")?;
    let alg_key_type = match header.alg.as_str() {
        "RS256" => KeyType::Rsa,
        "EdDSA" => KeyType::Ed25519,
        other => {
            return Err(VerifyFailure::new(
                VerifyErrorCode::ProofTypeUnsupported,
                format!("unsupported JWS algorithm: {other}"),
            ));
        }
    };
    if alg_key_type != key_type {
        return Err(VerifyFailure::new(
            VerifyErrorCode::KeyTypeMismatch,
            format!("JWS algorithm {} does not match a {key_type} key", header.alg),
        ));
    }

    let signing_input = format!("{header_b64}.{claims_b64}");
    let sig = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| {
        VerifyFailure::new(VerifyErrorCode::SignatureInvalid, "JWS signature is not base64url")
    })?;

    match signature::verify(signing_input.as_bytes(), &sig, public_pem, key_type) {
        Ok(true) => {}
        Ok(false) => {
            return Err(VerifyFailure::new(
                VerifyErrorCode::SignatureVerificationFailed,
                "JWS signature verification failed",
            ));
        }
        Err(e) => {
            return Err(VerifyFailure::new(VerifyErrorCode::InternalError, e.to_string()));
        }
    }

    let claims: JwtClaims = decode_part(claims_b64, "JWT claims")?;

    let now = Utc::now();
    let leeway = Duration::seconds(CLOCK_LEEWAY_SECS);
    if claims.exp.is_some_and(|exp| exp + leeway < now) {
        return Err(VerifyFailure::new(VerifyErrorCode::SignatureInvalid, "token has expired"));
    }
    if claims.nbf.is_some_and(|nbf| nbf - leeway > now) {
        return Err(VerifyFailure::new(VerifyErrorCode::SignatureInvalid, "token not yet valid"));
    }

    Ok(claims)
}

fn decode_part<T: serde::de::DeserializeOwned>(b64: &str, what: &str) -> Result<T, VerifyFailure> {
    let bytes = Base64UrlUnpadded::decode_vec(b64).map_err(|_| {
        VerifyFailure::new(VerifyErrorCode::SignatureInvalid, format!("{what} is not base64url"))
    })?;
    serde_json::from_slice(&bytes).map_err(|_| {
        VerifyFailure::new(VerifyErrorCode::SignatureInvalid, format!("{what} is malformed"))
    })
}

//! # Securing Credentials
//!
//! Credentials are secured by one of two mechanisms: an embedded
//! [`DataIntegrityProof`] inside the credential, or an enveloping JWT proof
//! whose `jws` carries the credential claims. Received proofs are parsed
//! into the tagged [`Proof`] sum before dispatch; anything matching neither
//! shape is rejected as `ProofInvalid`.

pub mod integrity;
pub mod jose;

use std::sync::{Arc, LazyLock};

use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use self::integrity::DataIntegrityProof;
use crate::credential::Assertion;
use crate::error::{VerifyErrorCode, VerifyFailure};
use crate::keystore::{DEFAULT_KEY_ID, KeyStore};
use crate::signature::{self, Cryptosuite};

/// Recognized `type` values for an enveloping JWT proof.
const JWT_PROOF_TYPES: [&str; 2] = ["JwtProof2020", "JsonWebSignature2020"];

/// An enveloping JWT proof.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JwtProof {
    /// `JwtProof2020` or `JsonWebSignature2020`.
    #[serde(rename = "type")]
    pub type_: String,

    /// Proof creation instant.
    pub created: DateTime<Utc>,

    /// IRI of the public key.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub verification_method: Option<String>,

    /// Always `assertionMethod`.
    pub proof_purpose: String,

    /// Compact JWS, `header.payload.signature`.
    pub jws: String,
}

/// A proof attached to a credential.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Proof {
    /// Embedded Data Integrity proof.
    DataIntegrity(DataIntegrityProof),

    /// Enveloping JWT proof.
    Jwt(JwtProof),
}

impl TryFrom<&Value> for Proof {
    type Error = VerifyFailure;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let Value::Object(fields) = value else {
            return Err(VerifyFailure::new(
                VerifyErrorCode::ProofInvalid,
                "proof is not a JSON object",
            ));
        };
        let type_ = fields.get("type").and_then(Value::as_str).unwrap_or_default();

        if fields.contains_key("jws") {
            if !JWT_PROOF_TYPES.contains(&type_) {
                return Err(VerifyFailure::new(
                    VerifyErrorCode::ProofTypeUnsupported,
                    format!("unsupported JWT proof type: {type_}"),
                ));
            }
            let proof = serde_json::from_value(value.clone()).map_err(|e| {
                VerifyFailure::new(VerifyErrorCode::ProofInvalid, format!("malformed JWT proof: {e}"))
            })?;
            return Ok(Self::Jwt(proof));
        }

        if fields.contains_key("proofValue") {
            if type_ != integrity::PROOF_TYPE {
                return Err(VerifyFailure::new(
                    VerifyErrorCode::ProofTypeUnsupported,
                    format!("unsupported embedded proof type: {type_}"),
                ));
            }
            let proof = serde_json::from_value(value.clone()).map_err(|e| {
                VerifyFailure::new(
                    VerifyErrorCode::ProofInvalid,
                    format!("malformed Data Integrity proof: {e}"),
                )
            })?;
            return Ok(Self::DataIntegrity(proof));
        }

        Err(VerifyFailure::new(
            VerifyErrorCode::ProofInvalid,
            "proof matches neither a JWT nor a Data Integrity shape",
        ))
    }
}

/// Which proof format to attach when signing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProofFormat {
    /// Embed a [`DataIntegrityProof`].
    #[default]
    DataIntegrity,

    /// Envelop the claims in a JWT proof.
    Jwt,
}

/// Successful proof verification, carrying what was resolved along the way.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifiedProof {
    /// The proof's verification method.
    pub verification_method: Option<String>,

    /// The cryptosuite the signature was checked under, when applicable.
    pub cryptosuite: Option<String>,
}

/// Generates and verifies proofs against the key store. Holds no mutable
/// state of its own.
#[derive(Clone, Debug)]
pub struct ProofEngine {
    keystore: Arc<KeyStore>,
    base_url: String,
}

impl ProofEngine {
    /// Build an engine over an initialized key store.
    pub fn new(keystore: Arc<KeyStore>, base_url: impl Into<String>) -> Self {
        Self {
            keystore,
            base_url: base_url.into(),
        }
    }

    /// Sign an assertion, attaching a proof in the requested format.
    ///
    /// Any existing proof is discarded before signing.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing key cannot be resolved or signing
    /// fails.
    pub async fn sign_assertion(
        &self, assertion: &Assertion, key_id: &str, format: ProofFormat,
    ) -> anyhow::Result<Assertion> {
        let mut signed = assertion.clone();
        signed.proof = None;

        let proof = match format {
            ProofFormat::DataIntegrity => {
                let unsigned = signed.to_json()?;
                serde_json::to_value(self.data_integrity_proof(&unsigned, key_id).await?)?
            }
            ProofFormat::Jwt => serde_json::to_value(self.jwt_proof(&signed, key_id).await?)?,
        };
        signed.proof = Some(proof);
        Ok(signed)
    }

    /// Generate an embedded Data Integrity proof over a credential's JSON
    /// form.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing key cannot be resolved or signing
    /// fails.
    pub async fn data_integrity_proof(
        &self, credential: &Value, key_id: &str,
    ) -> anyhow::Result<DataIntegrityProof> {
        let (concrete_id, pair) = self.keystore.signing_key(key_id).await?;

        let canonical = signature::canonicalize(credential);
        let sig = signature::sign(canonical.as_bytes(), &pair.private_pem, pair.metadata.key_type)?;

        Ok(DataIntegrityProof {
            type_: integrity::PROOF_TYPE.to_string(),
            cryptosuite: Some(pair.metadata.cryptosuite.to_string()),
            created: Utc::now(),
            proof_purpose: integrity::PROOF_PURPOSE.to_string(),
            verification_method: Some(self.verification_method(&concrete_id)),
            proof_value: Base64::encode_string(&sig),
        })
    }

    /// Generate an enveloping JWT proof for an assertion.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing key cannot be resolved or signing
    /// fails.
    pub async fn jwt_proof(&self, assertion: &Assertion, key_id: &str) -> anyhow::Result<JwtProof> {
        let (concrete_id, pair) = self.keystore.signing_key(key_id).await?;
        let verification_method = self.verification_method(&concrete_id);

        let issuer_id = match &assertion.issuer {
            crate::core::Kind::String(id) => id.clone(),
            crate::core::Kind::Object(issuer) => issuer.id.clone(),
        };

        let claims = jose::JwtClaims {
            iss: issuer_id,
            sub: assertion.credential_subject.as_ref().and_then(|cs| cs.id.clone()),
            aud: None,
            exp: assertion.expires,
            nbf: None,
            iat: Utc::now(),
            jti: Some(assertion.id.clone()),
            vc: jose::VcPayload {
                context: assertion.context.clone(),
                id: assertion.id.clone(),
                type_: assertion.type_.to_vec(),
                credential_subject: serde_json::to_value(&assertion.credential_subject)?,
                valid_from: assertion.issued_on,
                valid_until: assertion.expires,
                credential_status: assertion
                    .credential_status
                    .as_ref()
                    .map(serde_json::to_value)
                    .transpose()?,
            },
        };
        let header = jose::Header {
            alg: jose::recommended_algorithm(pair.metadata.key_type).to_string(),
            typ: "JWT".to_string(),
            kid: Some(verification_method.clone()),
        };

        let jws = jose::encode(&header, &claims, &pair.private_pem, pair.metadata.key_type)?;

        Ok(JwtProof {
            type_: "JwtProof2020".to_string(),
            created: Utc::now(),
            verification_method: Some(verification_method),
            proof_purpose: integrity::PROOF_PURPOSE.to_string(),
            jws,
        })
    }

    /// Verify the proof attached to an assertion.
    ///
    /// # Errors
    ///
    /// Returns a [`VerifyFailure`] naming the first check that failed:
    /// `ProofMissing`, `ProofInvalid`, `ProofTypeUnsupported`,
    /// `KeyNotFound`, `KeyTypeMismatch`, `CryptosuiteUnsupported`,
    /// `SignatureMissing`, `SignatureInvalid`,
    /// `SignatureVerificationFailed` or `InternalError`.
    pub async fn verify_assertion_proof(
        &self, assertion: &Assertion,
    ) -> Result<VerifiedProof, VerifyFailure> {
        let Some(proof_value) = &assertion.proof else {
            return Err(VerifyFailure::new(
                VerifyErrorCode::ProofMissing,
                "assertion carries no proof",
            ));
        };
        let proof = Proof::try_from(proof_value)?;

        match proof {
            Proof::Jwt(jwt) => self.verify_jwt(&jwt).await,
            Proof::DataIntegrity(di) => {
                // the signature covers the credential with the proof removed
                let mut unsigned = assertion.clone();
                unsigned.proof = None;
                let credential = unsigned.to_json().map_err(|e| {
                    VerifyFailure::new(VerifyErrorCode::InternalError, e.to_string())
                })?;
                self.verify_data_integrity(&credential, &di).await
            }
        }
    }

    async fn verify_jwt(&self, proof: &JwtProof) -> Result<VerifiedProof, VerifyFailure> {
        let key_id = resolve_key_id(proof.verification_method.as_deref())?;

        let pair = self.keystore.load(&key_id).await.map_err(|_| {
            VerifyFailure::new(VerifyErrorCode::KeyNotFound, format!("key not found: {key_id}"))
        })?;

        jose::verify(&proof.jws, &pair.public_pem, pair.metadata.key_type)?;

        Ok(VerifiedProof {
            verification_method: proof.verification_method.clone(),
            cryptosuite: None,
        })
    }

    async fn verify_data_integrity(
        &self, credential: &Value, proof: &DataIntegrityProof,
    ) -> Result<VerifiedProof, VerifyFailure> {
        let key_id = resolve_key_id(proof.verification_method.as_deref())?;

        if key_id != DEFAULT_KEY_ID && !self.keystore.key_exists(&key_id).await {
            return Err(VerifyFailure::new(
                VerifyErrorCode::KeyNotFound,
                format!("key not found: {key_id}"),
            ));
        }
        let pair = self.keystore.load(&key_id).await.map_err(|_| {
            VerifyFailure::new(VerifyErrorCode::KeyNotFound, format!("key not found: {key_id}"))
        })?;

        // the cryptosuite map is fixed; auto-detection from the stored key
        // applies only when the proof omits the suite entirely
        let cryptosuite = match &proof.cryptosuite {
            Some(named) => named.parse::<Cryptosuite>().map_err(|_| {
                VerifyFailure::new(
                    VerifyErrorCode::CryptosuiteUnsupported,
                    format!("unsupported cryptosuite: {named}"),
                )
            })?,
            None => pair.metadata.cryptosuite,
        };
        let key_type = cryptosuite.key_type();
        if key_type != pair.metadata.key_type {
            return Err(VerifyFailure::new(
                VerifyErrorCode::KeyTypeMismatch,
                format!("cryptosuite {cryptosuite} does not match a {} key", pair.metadata.key_type),
            ));
        }

        if proof.proof_value.is_empty() {
            return Err(VerifyFailure::new(
                VerifyErrorCode::SignatureMissing,
                "proof carries no signature value",
            ));
        }
        let sig = Base64::decode_vec(&proof.proof_value).map_err(|_| {
            VerifyFailure::new(VerifyErrorCode::SignatureInvalid, "proofValue is not base64")
        })?;

        let canonical = signature::canonicalize(credential);
        match signature::verify(canonical.as_bytes(), &sig, &pair.public_pem, key_type) {
            Ok(true) => Ok(VerifiedProof {
                verification_method: proof
                    .verification_method
                    .clone()
                    .or_else(|| Some(self.verification_method(&key_id))),
                cryptosuite: Some(cryptosuite.to_string()),
            }),
            Ok(false) => Err(VerifyFailure::new(
                VerifyErrorCode::SignatureVerificationFailed,
                "signature does not verify against the resolved key",
            )),
            Err(e) => Err(VerifyFailure::new(VerifyErrorCode::InternalError, e.to_string())),
        }
    }

    fn verification_method(&self, key_id: &str) -> String {
        format!("{}/public-keys/{key_id}", self.base_url)
    }
}

/// Extract the key id from a `verificationMethod` IRI of the shape
/// `<base>/public-keys/<keyId>`, stopping at `#`, `/` or `?`.
#[must_use]
pub fn extract_key_id(verification_method: &str) -> Option<String> {
    static KEY_ID: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"/public-keys/([^/#?]+)").expect("valid key id pattern"));

    KEY_ID
        .captures(verification_method)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

// A proof without a verificationMethod falls back to the default key; a
// verificationMethod that does not name a key is invalid.
fn resolve_key_id(verification_method: Option<&str>) -> Result<String, VerifyFailure> {
    match verification_method {
        None => Ok(DEFAULT_KEY_ID.to_string()),
        Some(vm) => extract_key_id(vm).ok_or_else(|| {
            VerifyFailure::new(
                VerifyErrorCode::ProofInvalid,
                format!("verificationMethod does not reference a key: {vm}"),
            )
        }),
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::config::Config;
    use crate::core::{Kind, OneMany};
    use crate::credential::Issuer;

    fn assertion() -> Assertion {
        Assertion {
            id: "https://issuer.example.org/v3/assertions/42".to_string(),
            type_: OneMany::Many(vec![
                "VerifiableCredential".to_string(),
                "OpenBadgeCredential".to_string(),
            ]),
            issuer: Kind::Object(Issuer {
                id: "https://issuer.example.org".to_string(),
                name: Some("Example Issuer".to_string()),
            }),
            issued_on: Some(Utc::now()),
            badge_class: Some(json!("https://issuer.example.org/badges/7")),
            recipient: Some(json!({"identity": "alice@example.org", "type": "email"})),
            ..Assertion::default()
        }
    }

    async fn engine() -> (ProofEngine, Config) {
        let dir = std::env::temp_dir().join(format!("obvc-proof-{}", uuid::Uuid::new_v4()));
        let config = Config::new(dir, "https://issuer.example.org");
        let keystore = KeyStore::initialize(&config).await.unwrap();
        (ProofEngine::new(Arc::new(keystore), config.base_url.clone()), config)
    }

    #[test]
    fn key_id_extraction() {
        assert_eq!(
            extract_key_id("https://x.example/public-keys/default").as_deref(),
            Some("default")
        );
        assert_eq!(
            extract_key_id("https://x.example/public-keys/default-1700000000000#key").as_deref(),
            Some("default-1700000000000")
        );
        assert_eq!(
            extract_key_id("https://x.example/public-keys/k1/extra").as_deref(),
            Some("k1")
        );
        assert_eq!(extract_key_id("https://x.example/keys/k1"), None);
    }

    #[test]
    fn discrimination() {
        let jwt = json!({"type": "JwtProof2020", "created": "2024-01-01T00:00:00Z",
            "proofPurpose": "assertionMethod", "jws": "a.b.c"});
        assert!(matches!(Proof::try_from(&jwt).unwrap(), Proof::Jwt(_)));

        let di = json!({"type": "DataIntegrityProof", "cryptosuite": "rsa-sha256",
            "created": "2024-01-01T00:00:00Z", "proofPurpose": "assertionMethod",
            "proofValue": "abc="});
        assert!(matches!(Proof::try_from(&di).unwrap(), Proof::DataIntegrity(_)));

        let neither = json!({"type": "LinkedDataSignature2015"});
        assert_eq!(
            Proof::try_from(&neither).unwrap_err().code,
            VerifyErrorCode::ProofInvalid
        );

        assert_eq!(
            Proof::try_from(&json!("not an object")).unwrap_err().code,
            VerifyErrorCode::ProofInvalid
        );
    }

    #[tokio::test]
    async fn data_integrity_round_trip() {
        let (engine, config) = engine().await;

        let signed = engine
            .sign_assertion(&assertion(), DEFAULT_KEY_ID, ProofFormat::DataIntegrity)
            .await
            .unwrap();
        let verified = engine.verify_assertion_proof(&signed).await.unwrap();
        assert_eq!(verified.cryptosuite.as_deref(), Some("rsa-sha256"));
        assert!(
            verified
                .verification_method
                .unwrap()
                .ends_with("/public-keys/default")
        );

        // tampering with an essential field breaks the signature
        let mut tampered = signed;
        tampered.recipient = Some(json!({"identity": "mallory@example.org", "type": "email"}));
        let err = engine.verify_assertion_proof(&tampered).await.unwrap_err();
        assert_eq!(err.code, VerifyErrorCode::SignatureVerificationFailed);

        tokio::fs::remove_dir_all(&config.keys_dir).await.unwrap();
    }

    #[tokio::test]
    async fn jwt_round_trip() {
        let (engine, config) = engine().await;

        let signed =
            engine.sign_assertion(&assertion(), DEFAULT_KEY_ID, ProofFormat::Jwt).await.unwrap();
        let verified = engine.verify_assertion_proof(&signed).await.unwrap();
        assert!(verified.verification_method.is_some());
        assert!(verified.cryptosuite.is_none());

        tokio::fs::remove_dir_all(&config.keys_dir).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_cryptosuite_rejected() {
        let (engine, config) = engine().await;

        let mut signed = engine
            .sign_assertion(&assertion(), DEFAULT_KEY_ID, ProofFormat::DataIntegrity)
            .await
            .unwrap();
        if let Some(Value::Object(proof)) = signed.proof.as_mut() {
            proof.insert("cryptosuite".to_string(), json!("made-up-2024"));
        }

        let err = engine.verify_assertion_proof(&signed).await.unwrap_err();
        assert_eq!(err.code, VerifyErrorCode::CryptosuiteUnsupported);

        tokio::fs::remove_dir_all(&config.keys_dir).await.unwrap();
    }

    #[tokio::test]
    async fn missing_key_reported() {
        let (engine, config) = engine().await;

        let mut signed = engine
            .sign_assertion(&assertion(), DEFAULT_KEY_ID, ProofFormat::DataIntegrity)
            .await
            .unwrap();
        if let Some(Value::Object(proof)) = signed.proof.as_mut() {
            proof.insert(
                "verificationMethod".to_string(),
                json!("https://issuer.example.org/public-keys/no-such-key"),
            );
        }

        let err = engine.verify_assertion_proof(&signed).await.unwrap_err();
        assert_eq!(err.code, VerifyErrorCode::KeyNotFound);

        tokio::fs::remove_dir_all(&config.keys_dir).await.unwrap();
    }

    #[tokio::test]
    async fn proof_missing_reported() {
        let (engine, config) = engine().await;

        let err = engine.verify_assertion_proof(&assertion()).await.unwrap_err();
        assert_eq!(err.code, VerifyErrorCode::ProofMissing);

        tokio::fs::remove_dir_all(&config.keys_dir).await.unwrap();
    }
}

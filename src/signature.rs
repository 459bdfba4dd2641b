//! # Signature Engine
//!
//! Canonicalization and raw signing/verification primitives shared by both
//! proof formats. Two algorithms are supported: RSA with SHA-256 (PKCS#1
//! v1.5) and pure Ed25519.

use std::fmt::Display;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use ed25519_dalek::pkcs8::{DecodePrivateKey as _, DecodePublicKey as _};
use rand_core::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

/// Supported key pair types.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// RSA-2048.
    #[default]
    Rsa,
    /// Ed25519.
    Ed25519,
}

impl Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rsa => write!(f, "rsa"),
            Self::Ed25519 => write!(f, "ed25519"),
        }
    }
}

/// Named canonicalization + signing suites accepted in proofs.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum Cryptosuite {
    /// SHA-256 digest, PKCS#1 v1.5 RSA signature.
    #[default]
    #[serde(rename = "rsa-sha256")]
    RsaSha256,

    /// Ed25519 signature, 2020 suite name.
    #[serde(rename = "ed25519-2020")]
    Ed25519_2020,

    /// Ed25519 signature, RDF-canonicalization suite name.
    #[serde(rename = "eddsa-rdfc-2022")]
    EddsaRdfc2022,
}

impl Cryptosuite {
    /// The key type this suite signs with. The mapping is fixed; any suite
    /// outside this enum is rejected upstream as unsupported.
    #[must_use]
    pub const fn key_type(self) -> KeyType {
        match self {
            Self::RsaSha256 => KeyType::Rsa,
            Self::Ed25519_2020 | Self::EddsaRdfc2022 => KeyType::Ed25519,
        }
    }

    /// The suite used when generating a proof for a key of `key_type`.
    #[must_use]
    pub const fn default_for(key_type: KeyType) -> Self {
        match key_type {
            KeyType::Rsa => Self::RsaSha256,
            KeyType::Ed25519 => Self::Ed25519_2020,
        }
    }
}

impl Display for Cryptosuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RsaSha256 => write!(f, "rsa-sha256"),
            Self::Ed25519_2020 => write!(f, "ed25519-2020"),
            Self::EddsaRdfc2022 => write!(f, "eddsa-rdfc-2022"),
        }
    }
}

impl FromStr for Cryptosuite {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rsa-sha256" => Ok(Self::RsaSha256),
            "ed25519-2020" => Ok(Self::Ed25519_2020),
            "eddsa-rdfc-2022" => Ok(Self::EddsaRdfc2022),
            other => Err(anyhow!("unsupported cryptosuite: {other}")),
        }
    }
}

/// Top-level credential fields included in the signing payload.
const ESSENTIAL_FIELDS: [&str; 6] = ["id", "type", "badgeClass", "recipient", "issuedOn", "expires"];

/// Produce the canonical signing payload for a credential.
///
/// Selects the essential top-level fields and serializes them with keys in
/// lexicographic order (serde_json's default map is ordered). Nested object
/// key order is NOT normalized; this reproduces the behavior existing
/// signatures were produced under.
//
// TODO: migrate to JCS (RFC 8785) canonicalization once a cutover plan for
// already-issued credentials exists.
#[must_use]
pub fn canonicalize(credential: &Value) -> String {
    let mut selected = serde_json::Map::new();
    if let Value::Object(fields) = credential {
        for field in ESSENTIAL_FIELDS {
            if let Some(value) = fields.get(field) {
                selected.insert(field.to_string(), value.clone());
            }
        }
    }
    Value::Object(selected).to_string()
}

/// Sign `data` with a PEM-encoded private key.
///
/// # Errors
///
/// Returns an error if the PEM cannot be parsed as a key of `key_type`.
pub fn sign(data: &[u8], private_pem: &str, key_type: KeyType) -> anyhow::Result<Vec<u8>> {
    match key_type {
        KeyType::Rsa => {
            let key = RsaPrivateKey::from_pkcs8_pem(private_pem)
                .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_pem))
                .context("parsing RSA private key")?;
            let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new(key);
            Ok(signing_key.sign(data).to_vec())
        }
        KeyType::Ed25519 => {
            let key = ed25519_dalek::SigningKey::from_pkcs8_pem(private_pem)
                .context("parsing Ed25519 private key")?;
            Ok(key.sign(data).to_vec())
        }
    }
}

/// Verify `signature` over `data` with a PEM-encoded public key.
///
/// A structurally invalid signature (wrong length, not a valid encoding)
/// verifies as `false` rather than erroring.
///
/// # Errors
///
/// Returns an error if the PEM cannot be parsed as a key of `key_type`.
pub fn verify(
    data: &[u8], signature: &[u8], public_pem: &str, key_type: KeyType,
) -> anyhow::Result<bool> {
    match key_type {
        KeyType::Rsa => {
            let key = RsaPublicKey::from_public_key_pem(public_pem)
                .or_else(|_| RsaPublicKey::from_pkcs1_pem(public_pem))
                .context("parsing RSA public key")?;
            let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key);
            let Ok(signature) = rsa::pkcs1v15::Signature::try_from(signature) else {
                return Ok(false);
            };
            Ok(verifying_key.verify(data, &signature).is_ok())
        }
        KeyType::Ed25519 => {
            let key = ed25519_dalek::VerifyingKey::from_public_key_pem(public_pem)
                .context("parsing Ed25519 public key")?;
            let Ok(signature) = ed25519_dalek::Signature::from_slice(signature) else {
                return Ok(false);
            };
            Ok(key.verify(data, &signature).is_ok())
        }
    }
}

/// Generate a fresh key pair, returning `(public_pem, private_pem)`.
///
/// # Errors
///
/// Returns an error if key generation or PEM encoding fails.
pub fn generate_pem_pair(key_type: KeyType) -> anyhow::Result<(String, String)> {
    match key_type {
        KeyType::Rsa => {
            let key = RsaPrivateKey::new(&mut OsRng, 2048).context("generating RSA key")?;
            let private = key.to_pkcs8_pem(LineEnding::LF)?.to_string();
            let public = key.to_public_key().to_public_key_pem(LineEnding::LF)?;
            Ok((public, private))
        }
        KeyType::Ed25519 => {
            let key = ed25519_dalek::SigningKey::generate(&mut OsRng);
            let private = key.to_pkcs8_pem(LineEnding::LF)?.to_string();
            let public = key.verifying_key().to_public_key_pem(LineEnding::LF)?;
            Ok((public, private))
        }
    }
}

/// Best-effort key type detection from PEM contents. Used only when a key
/// pair is found on disk without its metadata file; metadata remains the
/// source of truth otherwise.
#[must_use]
pub fn detect_key_type(pem: &str) -> KeyType {
    if pem.contains("BEGIN RSA PUBLIC KEY") || pem.contains("BEGIN RSA PRIVATE KEY") {
        return KeyType::Rsa;
    }
    if RsaPublicKey::from_public_key_pem(pem).is_ok() {
        return KeyType::Rsa;
    }
    if ed25519_dalek::VerifyingKey::from_public_key_pem(pem).is_ok() {
        return KeyType::Ed25519;
    }
    // unparseable: an Ed25519 SPKI is tiny compared to any RSA encoding
    if pem.len() < 200 { KeyType::Ed25519 } else { KeyType::Rsa }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn canonical_form_is_sorted_subset() {
        let credential = json!({
            "type": ["VerifiableCredential", "OpenBadgeCredential"],
            "recipient": {"identity": "alice@example.org"},
            "id": "https://example.org/assertions/1",
            "issuedOn": "2024-01-15T00:00:00Z",
            "proof": {"type": "DataIntegrityProof"},
            "narrative": "not part of the signing payload",
        });

        let canonical = canonicalize(&credential);
        assert_eq!(
            canonical,
            r#"{"id":"https://example.org/assertions/1","issuedOn":"2024-01-15T00:00:00Z","recipient":{"identity":"alice@example.org"},"type":["VerifiableCredential","OpenBadgeCredential"]}"#
        );
    }

    #[test]
    fn ed25519_round_trip() {
        let (public_pem, private_pem) = generate_pem_pair(KeyType::Ed25519).unwrap();
        let data = b"credential bytes";

        let signature = sign(data, &private_pem, KeyType::Ed25519).unwrap();
        assert!(verify(data, &signature, &public_pem, KeyType::Ed25519).unwrap());
        assert!(!verify(b"tampered bytes", &signature, &public_pem, KeyType::Ed25519).unwrap());
    }

    #[test]
    fn rsa_round_trip() {
        let (public_pem, private_pem) = generate_pem_pair(KeyType::Rsa).unwrap();
        let data = b"credential bytes";

        let signature = sign(data, &private_pem, KeyType::Rsa).unwrap();
        assert!(verify(data, &signature, &public_pem, KeyType::Rsa).unwrap());

        let mut tampered = signature.clone();
        tampered[0] ^= 0x01;
        assert!(!verify(data, &tampered, &public_pem, KeyType::Rsa).unwrap());
    }

    #[test]
    fn swapped_keys_fail() {
        let (public_a, _) = generate_pem_pair(KeyType::Ed25519).unwrap();
        let (_, private_b) = generate_pem_pair(KeyType::Ed25519).unwrap();

        let signature = sign(b"data", &private_b, KeyType::Ed25519).unwrap();
        assert!(!verify(b"data", &signature, &public_a, KeyType::Ed25519).unwrap());
    }

    #[test]
    fn cryptosuite_mapping() {
        assert_eq!(Cryptosuite::RsaSha256.key_type(), KeyType::Rsa);
        assert_eq!(Cryptosuite::Ed25519_2020.key_type(), KeyType::Ed25519);
        assert_eq!(Cryptosuite::EddsaRdfc2022.key_type(), KeyType::Ed25519);
        assert!("made-up-2024".parse::<Cryptosuite>().is_err());
    }

    #[test]
    fn detects_key_types() {
        let (rsa_pem, _) = generate_pem_pair(KeyType::Rsa).unwrap();
        let (ed_pem, _) = generate_pem_pair(KeyType::Ed25519).unwrap();
        assert_eq!(detect_key_type(&rsa_pem), KeyType::Rsa);
        assert_eq!(detect_key_type(&ed_pem), KeyType::Ed25519);
    }
}

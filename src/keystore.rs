//! # Key Store
//!
//! Persistent key pair lifecycle: generation, loading, rotation, status,
//! and JWK/JWKS export. Each key pair is persisted as a
//! `<id>.pub` / `<id>.key` / `<id>.meta.json` triple under the configured
//! keys directory. Metadata is co-persisted with the pair and is the source
//! of truth for key type and cryptosuite; PEM autodetection is a fallback
//! for triples found without their metadata file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use ed25519_dalek::pkcs8::DecodePublicKey as _;
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::KeyError;
use crate::signature::{self, Cryptosuite, KeyType};

/// The reserved key id that always exists after initialization.
pub const DEFAULT_KEY_ID: &str = "default";

/// Lifecycle status of a key pair.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    /// Usable for signing; published in the JWKS.
    #[default]
    Active,
    /// Rotated out or disabled; still usable for verification.
    Inactive,
    /// Compromised; never used.
    Revoked,
}

/// Metadata co-persisted with every key pair.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeyMetadata {
    /// Key pair type.
    pub key_type: KeyType,

    /// Cryptosuite used when signing with this pair.
    pub cryptosuite: Cryptosuite,

    /// Creation instant.
    pub created: DateTime<Utc>,

    /// Lifecycle status.
    pub status: KeyStatus,

    /// Set when the pair is rotated out.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rotated_at: Option<DateTime<Utc>>,

    /// Optional hard expiry.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl KeyMetadata {
    fn new(key_type: KeyType) -> Self {
        Self {
            key_type,
            cryptosuite: Cryptosuite::default_for(key_type),
            created: Utc::now(),
            status: KeyStatus::Active,
            rotated_at: None,
            expires_at: None,
        }
    }
}

/// A loaded key pair.
#[derive(Clone, Debug)]
pub struct KeyPair {
    /// SPKI PEM public key.
    pub public_pem: String,
    /// PKCS#8 PEM private key.
    pub private_pem: String,
    /// Co-persisted metadata.
    pub metadata: KeyMetadata,
}

/// Status report row for one key pair.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatusInfo {
    /// Key id.
    pub key_id: String,
    /// The pair's metadata.
    #[serde(flatten)]
    pub metadata: KeyMetadata,
}

/// RFC 7517 JSON Web Key (public, verify-only).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Jwk {
    /// Key type: `RSA` or `OKP`.
    pub kty: String,
    /// Public key use, always `sig`.
    #[serde(rename = "use")]
    pub use_: String,
    /// Permitted operations, always `["verify"]`.
    pub key_ops: Vec<String>,
    /// JWS algorithm: `RS256` or `EdDSA`.
    pub alg: String,
    /// Key id.
    pub kid: String,
    /// RSA modulus, base64url.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub n: Option<String>,
    /// RSA public exponent, base64url.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub e: Option<String>,
    /// OKP curve, `Ed25519`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub crv: Option<String>,
    /// OKP public key bytes, base64url.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub x: Option<String>,
}

/// RFC 7517 JSON Web Key Set.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct JwkSet {
    /// Published keys.
    pub keys: Vec<Jwk>,
}

/// File-backed key store with an in-memory cache.
///
/// The cache map is guarded by a read-write lock: lookups are the common
/// path, writers are generation, rotation, status changes and deletion.
#[derive(Debug)]
pub struct KeyStore {
    dir: PathBuf,
    keys: RwLock<HashMap<String, Arc<KeyPair>>>,
    // concrete id the "default" name resolves to when signing
    default_alias: RwLock<String>,
}

impl KeyStore {
    /// Load every key pair from the configured directory and guarantee the
    /// `"default"` pair exists.
    ///
    /// Idempotent: initializing over an existing directory reloads it.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or read, or a key
    /// file cannot be parsed.
    pub async fn initialize(config: &Config) -> Result<Self, KeyError> {
        let dir = config.keys_dir.clone();
        tokio::fs::create_dir_all(&dir).await?;

        let store = Self {
            dir,
            keys: RwLock::new(HashMap::new()),
            default_alias: RwLock::new(DEFAULT_KEY_ID.to_string()),
        };

        let mut entries = tokio::fs::read_dir(&store.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("key") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let pair = store.load_from_disk(id).await?;
            store.keys.write().await.insert(id.to_string(), Arc::new(pair));
        }

        if !store.keys.read().await.contains_key(DEFAULT_KEY_ID) {
            tracing::debug!("creating default key pair");
            store.generate_key_pair(DEFAULT_KEY_ID, KeyType::Rsa).await?;
        }

        // the alias is in-memory state: after a restart, point it at the
        // newest active pair in the default lineage
        let alias = {
            let keys = store.keys.read().await;
            keys.iter()
                .filter(|(id, pair)| {
                    (*id == DEFAULT_KEY_ID || id.starts_with("default-"))
                        && pair.metadata.status == KeyStatus::Active
                })
                .max_by_key(|(_, pair)| pair.metadata.created)
                .map_or_else(|| DEFAULT_KEY_ID.to_string(), |(id, _)| id.clone())
        };
        *store.default_alias.write().await = alias;

        Ok(store)
    }

    /// The PEM public key under `key_id`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::NotFound`] if the id is unknown in memory and on
    /// disk.
    pub async fn public_key(&self, key_id: &str) -> Result<String, KeyError> {
        Ok(self.load(key_id).await?.public_pem.clone())
    }

    /// The PEM private key under `key_id`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::NotFound`] if the id is unknown in memory and on
    /// disk.
    pub async fn private_key(&self, key_id: &str) -> Result<String, KeyError> {
        Ok(self.load(key_id).await?.private_pem.clone())
    }

    /// The full pair under `key_id`, loading from disk if it is not cached.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::NotFound`] if the id is unknown in memory and on
    /// disk.
    pub async fn load(&self, key_id: &str) -> Result<Arc<KeyPair>, KeyError> {
        if let Some(pair) = self.keys.read().await.get(key_id) {
            return Ok(Arc::clone(pair));
        }

        let pair = Arc::new(self.load_from_disk(key_id).await?);
        self.keys.write().await.insert(key_id.to_string(), Arc::clone(&pair));
        Ok(pair)
    }

    /// Resolve `key_id` to the concrete pair used for signing.
    ///
    /// The `"default"` name follows the rotation alias, so fresh proofs
    /// embed the concrete id of the current default pair and survive later
    /// rotations. Exact ids are never aliased.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::NotFound`] if the resolved id is unknown.
    pub async fn signing_key(&self, key_id: &str) -> Result<(String, Arc<KeyPair>), KeyError> {
        let concrete = if key_id == DEFAULT_KEY_ID {
            self.default_alias.read().await.clone()
        } else {
            key_id.to_string()
        };
        let pair = self.load(&concrete).await?;
        Ok((concrete, pair))
    }

    /// Whether a pair exists under `key_id`. Always `true` for `"default"`.
    pub async fn key_exists(&self, key_id: &str) -> bool {
        if key_id == DEFAULT_KEY_ID {
            return true;
        }
        if self.keys.read().await.contains_key(key_id) {
            return true;
        }
        self.key_path(key_id).exists() && self.pub_path(key_id).exists()
    }

    /// Generate, persist and cache a new pair under `key_id`, replacing any
    /// existing entry.
    ///
    /// # Errors
    ///
    /// Returns an error if generation or persistence fails.
    pub async fn generate_key_pair(
        &self, key_id: &str, key_type: KeyType,
    ) -> Result<KeyMetadata, KeyError> {
        let (public_pem, private_pem) =
            signature::generate_pem_pair(key_type).map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        let pair = KeyPair {
            public_pem,
            private_pem,
            metadata: KeyMetadata::new(key_type),
        };

        self.persist(key_id, &pair).await?;
        let metadata = pair.metadata.clone();
        self.keys.write().await.insert(key_id.to_string(), Arc::new(pair));

        if key_id == DEFAULT_KEY_ID {
            *self.default_alias.write().await = DEFAULT_KEY_ID.to_string();
        }

        tracing::debug!("generated {key_type} key pair: {key_id}");
        Ok(metadata)
    }

    /// Delete the pair under `key_id` from disk and cache.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::DefaultUndeletable`] for `"default"` and
    /// [`KeyError::NotFound`] for unknown ids.
    pub async fn delete_key_pair(&self, key_id: &str) -> Result<(), KeyError> {
        if key_id == DEFAULT_KEY_ID {
            return Err(KeyError::DefaultUndeletable);
        }
        if !self.key_exists(key_id).await {
            return Err(KeyError::NotFound(key_id.to_string()));
        }

        for path in [self.pub_path(key_id), self.key_path(key_id), self.meta_path(key_id)] {
            if path.exists() {
                tokio::fs::remove_file(path).await?;
            }
        }
        self.keys.write().await.remove(key_id);

        let mut alias = self.default_alias.write().await;
        if *alias == key_id {
            *alias = DEFAULT_KEY_ID.to_string();
        }

        Ok(())
    }

    /// Rotate the pair under `key_id`: the current pair is marked inactive
    /// (keeping its id, so proofs that reference it keep verifying) and a
    /// fresh pair is created under `<key_id>-<unix-millis>`. Rotating
    /// `"default"` repoints the in-memory alias at the new pair; nothing is
    /// copied on disk.
    ///
    /// Returns the new pair's id.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::NotFound`] if `key_id` is unknown.
    pub async fn rotate_key(
        &self, key_id: &str, new_key_type: Option<KeyType>,
    ) -> Result<String, KeyError> {
        let current = self.load(key_id).await?;

        let mut rotated = (*current).clone();
        rotated.metadata.status = KeyStatus::Inactive;
        rotated.metadata.rotated_at = Some(Utc::now());
        self.persist(key_id, &rotated).await?;
        self.keys.write().await.insert(key_id.to_string(), Arc::new(rotated));

        let new_id = format!("{key_id}-{}", Utc::now().timestamp_millis());
        let key_type = new_key_type.unwrap_or(current.metadata.key_type);
        self.generate_key_pair(&new_id, key_type).await?;

        if key_id == DEFAULT_KEY_ID {
            *self.default_alias.write().await = new_id.clone();
        }

        tracing::debug!("rotated key {key_id} -> {new_id}");
        Ok(new_id)
    }

    /// Set the lifecycle status of the pair under `key_id`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::NotFound`] if `key_id` is unknown.
    pub async fn set_key_status(&self, key_id: &str, status: KeyStatus) -> Result<(), KeyError> {
        let current = self.load(key_id).await?;

        let mut updated = (*current).clone();
        updated.metadata.status = status;
        self.persist(key_id, &updated).await?;
        self.keys.write().await.insert(key_id.to_string(), Arc::new(updated));
        Ok(())
    }

    /// Metadata for every loaded pair, sorted by id.
    pub async fn status_info(&self) -> Vec<KeyStatusInfo> {
        let keys = self.keys.read().await;
        let mut info: Vec<KeyStatusInfo> = keys
            .iter()
            .map(|(id, pair)| KeyStatusInfo {
                key_id: id.clone(),
                metadata: pair.metadata.clone(),
            })
            .collect();
        info.sort_by(|a, b| a.key_id.cmp(&b.key_id));
        info
    }

    /// The JWKS of all active pairs. Pairs whose public key cannot be
    /// converted are skipped with a warning; the set itself never fails.
    pub async fn jwk_set(&self) -> JwkSet {
        let keys = self.keys.read().await;
        let mut jwks: Vec<Jwk> = Vec::new();

        for (id, pair) in keys.iter() {
            if pair.metadata.status != KeyStatus::Active {
                continue;
            }
            match pem_to_jwk(&pair.public_pem, pair.metadata.key_type, id) {
                Ok(jwk) => jwks.push(jwk),
                Err(e) => tracing::warn!("skipping key {id} in JWKS: {e}"),
            }
        }

        jwks.sort_by(|a, b| a.kid.cmp(&b.kid));
        JwkSet { keys: jwks }
    }

    async fn load_from_disk(&self, key_id: &str) -> Result<KeyPair, KeyError> {
        let pub_path = self.pub_path(key_id);
        let key_path = self.key_path(key_id);
        if !pub_path.exists() || !key_path.exists() {
            return Err(KeyError::NotFound(key_id.to_string()));
        }

        let public_pem = tokio::fs::read_to_string(&pub_path).await?;
        let private_pem = tokio::fs::read_to_string(&key_path).await?;

        let meta_path = self.meta_path(key_id);
        let metadata = if meta_path.exists() {
            let raw = tokio::fs::read_to_string(&meta_path).await?;
            serde_json::from_str(&raw).map_err(|e| KeyError::InvalidKey(e.to_string()))?
        } else {
            // metadata lost: synthesize from the PEM and re-persist so the
            // triple is complete again
            let key_type = signature::detect_key_type(&public_pem);
            tracing::warn!("synthesizing metadata for key {key_id} (detected {key_type})");
            let metadata = KeyMetadata::new(key_type);
            self.write_metadata(key_id, &metadata).await?;
            metadata
        };

        Ok(KeyPair {
            public_pem,
            private_pem,
            metadata,
        })
    }

    async fn persist(&self, key_id: &str, pair: &KeyPair) -> Result<(), KeyError> {
        write_file(&self.pub_path(key_id), pair.public_pem.as_bytes(), 0o644).await?;
        write_file(&self.key_path(key_id), pair.private_pem.as_bytes(), 0o600).await?;
        self.write_metadata(key_id, &pair.metadata).await
    }

    async fn write_metadata(&self, key_id: &str, metadata: &KeyMetadata) -> Result<(), KeyError> {
        let raw = serde_json::to_vec_pretty(metadata)
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        write_file(&self.meta_path(key_id), &raw, 0o644).await
    }

    fn pub_path(&self, key_id: &str) -> PathBuf {
        self.dir.join(format!("{key_id}.pub"))
    }

    fn key_path(&self, key_id: &str) -> PathBuf {
        self.dir.join(format!("{key_id}.key"))
    }

    fn meta_path(&self, key_id: &str) -> PathBuf {
        self.dir.join(format!("{key_id}.meta.json"))
    }
}

async fn write_file(path: &Path, contents: &[u8], mode: u32) -> Result<(), KeyError> {
    tokio::fs::write(path, contents).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    }
    #[cfg(not(unix))]
    let _ = mode;
    Ok(())
}

/// Convert a PEM public key to its RFC 7517 JWK form.
///
/// # Errors
///
/// Returns an error if the PEM cannot be parsed as a key of `key_type`.
pub fn pem_to_jwk(public_pem: &str, key_type: KeyType, key_id: &str) -> Result<Jwk, KeyError> {
    match key_type {
        KeyType::Rsa => {
            let key = RsaPublicKey::from_public_key_pem(public_pem)
                .or_else(|_| RsaPublicKey::from_pkcs1_pem(public_pem))
                .map_err(|e| KeyError::InvalidKey(e.to_string()))?;
            Ok(Jwk {
                kty: "RSA".to_string(),
                use_: "sig".to_string(),
                key_ops: vec!["verify".to_string()],
                alg: "RS256".to_string(),
                kid: key_id.to_string(),
                n: Some(Base64UrlUnpadded::encode_string(&key.n().to_bytes_be())),
                e: Some(Base64UrlUnpadded::encode_string(&key.e().to_bytes_be())),
                crv: None,
                x: None,
            })
        }
        KeyType::Ed25519 => {
            let key = ed25519_dalek::VerifyingKey::from_public_key_pem(public_pem)
                .map_err(|e| KeyError::InvalidKey(e.to_string()))?;
            Ok(Jwk {
                kty: "OKP".to_string(),
                use_: "sig".to_string(),
                key_ops: vec!["verify".to_string()],
                alg: "EdDSA".to_string(),
                kid: key_id.to_string(),
                n: None,
                e: None,
                crv: Some("Ed25519".to_string()),
                x: Some(Base64UrlUnpadded::encode_string(key.as_bytes())),
            })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn test_config() -> Config {
        let dir = std::env::temp_dir().join(format!("obvc-keys-{}", uuid::Uuid::new_v4()));
        Config::new(dir, "http://localhost:3000")
    }

    #[tokio::test]
    async fn initialize_creates_default() {
        let config = test_config();
        let store = KeyStore::initialize(&config).await.unwrap();

        assert!(store.key_exists(DEFAULT_KEY_ID).await);
        let pair = store.load(DEFAULT_KEY_ID).await.unwrap();
        assert_eq!(pair.metadata.key_type, KeyType::Rsa);
        assert_eq!(pair.metadata.cryptosuite, Cryptosuite::RsaSha256);
        assert_eq!(pair.metadata.status, KeyStatus::Active);

        // triple on disk
        assert!(config.keys_dir.join("default.pub").exists());
        assert!(config.keys_dir.join("default.key").exists());
        assert!(config.keys_dir.join("default.meta.json").exists());

        tokio::fs::remove_dir_all(&config.keys_dir).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn private_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let config = test_config();
        let _store = KeyStore::initialize(&config).await.unwrap();

        let key_mode =
            std::fs::metadata(config.keys_dir.join("default.key")).unwrap().permissions().mode();
        assert_eq!(key_mode & 0o777, 0o600);

        let pub_mode =
            std::fs::metadata(config.keys_dir.join("default.pub")).unwrap().permissions().mode();
        assert_eq!(pub_mode & 0o777, 0o644);

        tokio::fs::remove_dir_all(&config.keys_dir).await.unwrap();
    }

    #[tokio::test]
    async fn rotation_keeps_predecessor_verifiable() {
        let config = test_config();
        let store = KeyStore::initialize(&config).await.unwrap();

        let (pre_id, pre_pair) = store.signing_key(DEFAULT_KEY_ID).await.unwrap();
        assert_eq!(pre_id, DEFAULT_KEY_ID);

        let new_id = store.rotate_key(DEFAULT_KEY_ID, None).await.unwrap();
        assert!(new_id.starts_with("default-"));

        // the alias now signs with the new pair
        let (post_id, _) = store.signing_key(DEFAULT_KEY_ID).await.unwrap();
        assert_eq!(post_id, new_id);

        // the predecessor keeps its id, inactive, and still resolves by
        // exact lookup with its original public key
        let old = store.load(DEFAULT_KEY_ID).await.unwrap();
        assert_eq!(old.metadata.status, KeyStatus::Inactive);
        assert!(old.metadata.rotated_at.is_some());
        assert_eq!(old.public_pem, pre_pair.public_pem);

        tokio::fs::remove_dir_all(&config.keys_dir).await.unwrap();
    }

    #[tokio::test]
    async fn jwks_lists_only_active_keys() {
        let config = test_config();
        let store = KeyStore::initialize(&config).await.unwrap();
        store.generate_key_pair("signing-ed", KeyType::Ed25519).await.unwrap();

        let jwks = store.jwk_set().await;
        assert_eq!(jwks.keys.len(), 2);

        store.set_key_status("signing-ed", KeyStatus::Inactive).await.unwrap();
        let jwks = store.jwk_set().await;
        assert_eq!(jwks.keys.len(), 1);
        assert_eq!(jwks.keys[0].kid, DEFAULT_KEY_ID);
        assert_eq!(jwks.keys[0].kty, "RSA");
        assert_eq!(jwks.keys[0].alg, "RS256");
        assert!(jwks.keys[0].n.is_some());

        tokio::fs::remove_dir_all(&config.keys_dir).await.unwrap();
    }

    #[tokio::test]
    async fn default_cannot_be_deleted() {
        let config = test_config();
        let store = KeyStore::initialize(&config).await.unwrap();

        assert!(matches!(
            store.delete_key_pair(DEFAULT_KEY_ID).await,
            Err(KeyError::DefaultUndeletable)
        ));

        store.generate_key_pair("ephemeral", KeyType::Ed25519).await.unwrap();
        store.delete_key_pair("ephemeral").await.unwrap();
        assert!(!store.key_exists("ephemeral").await);

        tokio::fs::remove_dir_all(&config.keys_dir).await.unwrap();
    }

    #[tokio::test]
    async fn ed25519_jwk_shape() {
        let (public_pem, _) = signature::generate_pem_pair(KeyType::Ed25519).unwrap();
        let jwk = pem_to_jwk(&public_pem, KeyType::Ed25519, "k1").unwrap();
        assert_eq!(jwk.kty, "OKP");
        assert_eq!(jwk.crv.as_deref(), Some("Ed25519"));
        assert_eq!(jwk.alg, "EdDSA");
        assert!(jwk.x.is_some());
        assert!(jwk.n.is_none());
    }

    #[tokio::test]
    async fn metadata_synthesized_when_missing() {
        let config = test_config();
        {
            let store = KeyStore::initialize(&config).await.unwrap();
            store.generate_key_pair("bare", KeyType::Ed25519).await.unwrap();
        }
        tokio::fs::remove_file(config.keys_dir.join("bare.meta.json")).await.unwrap();

        let store = KeyStore::initialize(&config).await.unwrap();
        let pair = store.load("bare").await.unwrap();
        assert_eq!(pair.metadata.key_type, KeyType::Ed25519);
        assert!(config.keys_dir.join("bare.meta.json").exists());

        tokio::fs::remove_dir_all(&config.keys_dir).await.unwrap();
    }
}

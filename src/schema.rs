//! # Schema Validation
//!
//! Pluggable credential-schema validation: schemas referenced by a
//! credential's `credentialSchema` are fetched over HTTP under a hard
//! deadline, compiled once, cached by URL, and applied together with a set
//! of rules (built-in and caller-supplied).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::SchemaError;

/// Schema reference types this validator understands.
pub const SUPPORTED_TYPES: [&str; 2] = ["1EdTechJsonSchemaValidator2019", "JsonSchemaValidator2020"];

/// Default overall deadline for fetch-and-validate.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A `credentialSchema` reference.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct SchemaRef {
    /// Schema URL.
    pub id: String,

    /// Reference type, one of [`SUPPORTED_TYPES`].
    #[serde(rename = "type")]
    pub type_: String,
}

/// A named rule applied to the credential after schema validation.
pub struct CustomRule {
    name: String,
    check: Box<dyn Fn(&Value) -> Result<(), String> + Send + Sync>,
}

impl CustomRule {
    /// Build a rule from a name and a check function.
    pub fn new(
        name: impl Into<String>, check: impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            check: Box::new(check),
        }
    }

    /// The rule's name, used in failure messages.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, credential: &Value) -> Result<(), SchemaError> {
        (self.check)(credential)
            .map_err(|reason| SchemaError::Validation(format!("{}: {reason}", self.name)))
    }
}

impl std::fmt::Debug for CustomRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomRule").field("name", &self.name).finish_non_exhaustive()
    }
}

/// The built-in rules every validation runs: issuance date, expiration
/// date, and issuer sanity.
#[must_use]
pub fn default_rules() -> Vec<CustomRule> {
    vec![
        CustomRule::new("validateIssuanceDate", validate_issuance_date),
        CustomRule::new("validateExpirationDate", validate_expiration_date),
        CustomRule::new("validateIssuer", validate_issuer),
    ]
}

fn issuance_date(credential: &Value) -> Option<&str> {
    credential
        .get("issuedOn")
        .or_else(|| credential.get("issuanceDate"))
        .and_then(Value::as_str)
}

fn validate_issuance_date(credential: &Value) -> Result<(), String> {
    let Some(raw) = issuance_date(credential) else {
        return Err("missing issuance date".to_string());
    };
    let issued: DateTime<Utc> = raw.parse().map_err(|_| format!("unparseable issuance date: {raw}"))?;
    if issued > Utc::now() {
        return Err("issuance date is in the future".to_string());
    }
    Ok(())
}

fn validate_expiration_date(credential: &Value) -> Result<(), String> {
    let Some(raw) =
        credential.get("expires").or_else(|| credential.get("expirationDate")).and_then(Value::as_str)
    else {
        return Ok(());
    };
    let expires: DateTime<Utc> =
        raw.parse().map_err(|_| format!("unparseable expiration date: {raw}"))?;

    if let Some(issued) = issuance_date(credential).and_then(|s| s.parse::<DateTime<Utc>>().ok()) {
        if expires <= issued {
            return Err("expiration date precedes issuance".to_string());
        }
    }
    Ok(())
}

fn validate_issuer(credential: &Value) -> Result<(), String> {
    match credential.get("issuer") {
        Some(Value::String(id)) if !id.is_empty() => Ok(()),
        Some(Value::Object(issuer))
            if issuer.get("id").and_then(Value::as_str).is_some_and(|id| !id.is_empty()) =>
        {
            Ok(())
        }
        _ => Err("missing or empty issuer".to_string()),
    }
}

/// Fetches, compiles, caches and applies credential schemas.
///
/// Compiled validators are cached by schema URL; reads take a shared lock,
/// inserts an exclusive one. A fetch abandoned by the deadline leaves no
/// cache entry behind.
#[derive(Debug)]
pub struct SchemaValidator {
    client: reqwest::Client,
    cache: RwLock<HashMap<String, Arc<JSONSchema>>>,
    timeout: Duration,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaValidator {
    /// A validator with the default deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// A validator with an explicit overall deadline.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            cache: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Validate a credential against its schema references and the given
    /// rules, under the configured deadline.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] encountered:
    /// `UnsupportedType`, `Fetch`, `InvalidSchema`, `Validation`, or
    /// `Timeout` when the deadline elapses.
    pub async fn validate(
        &self, credential: &Value, schemas: &[SchemaRef], rules: &[CustomRule],
    ) -> Result<(), SchemaError> {
        tokio::time::timeout(self.timeout, self.validate_inner(credential, schemas, rules))
            .await
            .map_err(|_| SchemaError::Timeout(self.timeout.as_millis() as u64))?
    }

    async fn validate_inner(
        &self, credential: &Value, schemas: &[SchemaRef], rules: &[CustomRule],
    ) -> Result<(), SchemaError> {
        for schema_ref in schemas {
            if !SUPPORTED_TYPES.contains(&schema_ref.type_.as_str()) {
                return Err(SchemaError::UnsupportedType(schema_ref.type_.clone()));
            }

            let validator = self.validator_for(&schema_ref.id).await?;
            if let Err(errors) = validator.validate(credential) {
                let reasons =
                    errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
                return Err(SchemaError::Validation(reasons));
            }
        }

        for rule in rules {
            rule.run(credential)?;
        }
        Ok(())
    }

    /// Compile a schema and cache it under `url` without fetching. Useful
    /// for embedding schemas shipped with the deployment.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidSchema`] if the document fails the
    /// sanity check or does not compile.
    pub async fn preload(&self, url: &str, schema: &Value) -> Result<(), SchemaError> {
        let validator = compile(url, schema)?;
        self.cache.write().await.insert(url.to_string(), Arc::new(validator));
        Ok(())
    }

    async fn validator_for(&self, url: &str) -> Result<Arc<JSONSchema>, SchemaError> {
        if let Some(validator) = self.cache.read().await.get(url) {
            return Ok(Arc::clone(validator));
        }

        tracing::debug!("fetching credential schema {url}");
        let response = self.client.get(url).send().await.map_err(|e| SchemaError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !response.status().is_success() {
            return Err(SchemaError::Fetch {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }
        let schema: Value = response.json().await.map_err(|e| SchemaError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let validator = Arc::new(compile(url, &schema)?);
        self.cache.write().await.insert(url.to_string(), Arc::clone(&validator));
        Ok(validator)
    }
}

// Sanity-check and compile a fetched document.
fn compile(url: &str, schema: &Value) -> Result<JSONSchema, SchemaError> {
    let looks_like_schema = schema.as_object().is_some_and(|fields| {
        ["$schema", "type", "properties", "items"].iter().any(|key| fields.contains_key(*key))
    });
    if !looks_like_schema {
        return Err(SchemaError::InvalidSchema(url.to_string()));
    }

    JSONSchema::compile(schema)
        .map_err(|e| SchemaError::InvalidSchema(format!("{url}: {e}")))
}

//! # Verification Pipeline
//!
//! End-to-end verification of presented assertions. The check order is
//! fixed: revocation, then expiration, then proof verification. Every
//! failure is a [`VerificationStatus`] value, never an error.

use chrono::Utc;

use crate::credential::{Assertion, VerificationStatus};
use crate::error::{VerifyErrorCode, VerifyFailure};
use crate::proof::ProofEngine;
use crate::provider::{AssertionStore, Provider};
use crate::status::{StatusListEngine, StatusPurpose};

/// Verifies assertions against the key store and status lists.
#[derive(Clone, Debug)]
pub struct VerificationPipeline<P> {
    proof_engine: ProofEngine,
    status_engine: StatusListEngine<P>,
    provider: P,
}

impl<P: Provider> VerificationPipeline<P> {
    /// Build a pipeline over the proof engine and status list engine.
    pub const fn new(
        proof_engine: ProofEngine, status_engine: StatusListEngine<P>, provider: P,
    ) -> Self {
        Self {
            proof_engine,
            status_engine,
            provider,
        }
    }

    /// Verify an assertion: revocation state, expiry, then the attached
    /// proof.
    pub async fn verify_assertion(&self, assertion: &Assertion) -> VerificationStatus {
        if let Some(failure) = self.revocation_check(assertion).await {
            return VerificationStatus::failure(&failure);
        }

        if assertion.expires.is_some_and(|expires| expires < Utc::now()) {
            return VerificationStatus::failure(&VerifyFailure::new(
                VerifyErrorCode::AssertionExpired,
                "assertion has expired",
            ));
        }

        match self.proof_engine.verify_assertion_proof(assertion).await {
            Ok(verified) => {
                tracing::debug!("assertion {} verified", assertion.id);
                VerificationStatus::success(verified.verification_method, verified.cryptosuite)
            }
            Err(failure) => VerificationStatus::failure(&failure),
        }
    }

    /// Verify a stored assertion by id.
    pub async fn verify_assertion_by_id(&self, assertion_id: &str) -> VerificationStatus {
        let assertion = match self.provider.get_assertion(assertion_id).await {
            Ok(Some(assertion)) => assertion,
            Ok(None) => {
                return VerificationStatus::failure(&VerifyFailure::new(
                    VerifyErrorCode::AssertionNotFound,
                    format!("assertion not found: {assertion_id}"),
                ));
            }
            Err(e) => {
                tracing::error!("loading assertion {assertion_id}: {e}");
                return VerificationStatus::failure(&VerifyFailure::new(
                    VerifyErrorCode::InternalError,
                    "assertion could not be loaded",
                ));
            }
        };
        self.verify_assertion(&assertion).await
    }

    // The denormalized `revoked` flag and the status list bit are equally
    // authoritative; either marks the assertion revoked.
    async fn revocation_check(&self, assertion: &Assertion) -> Option<VerifyFailure> {
        if assertion.revoked == Some(true) {
            let details = assertion
                .revocation_reason
                .clone()
                .unwrap_or_else(|| "assertion has been revoked".to_string());
            return Some(VerifyFailure::new(VerifyErrorCode::AssertionRevoked, details));
        }

        let status = assertion.credential_status.as_ref()?;
        if status.status_purpose != StatusPurpose::Revocation {
            return None;
        }

        match self
            .status_engine
            .credential_status_value(&assertion.id, StatusPurpose::Revocation)
            .await
        {
            Ok(0) => None,
            Ok(_) => Some(VerifyFailure::new(
                VerifyErrorCode::AssertionRevoked,
                "assertion is revoked on its status list",
            )),
            // a status entry this deployment does not hold is not evidence
            // of revocation
            Err(e) => {
                tracing::debug!("status list unavailable for {}: {e}", assertion.id);
                None
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::config::Config;
    use crate::core::{Kind, OneMany};
    use crate::credential::Issuer;
    use crate::keystore::{DEFAULT_KEY_ID, KeyStore};
    use crate::proof::ProofFormat;
    use crate::provider::InMemoryProvider;

    async fn pipeline() -> (VerificationPipeline<InMemoryProvider>, ProofEngine, Config) {
        let dir = std::env::temp_dir().join(format!("obvc-verify-{}", uuid::Uuid::new_v4()));
        let config = Config::new(dir, "https://issuer.example.org");
        let keystore = Arc::new(KeyStore::initialize(&config).await.unwrap());
        let proof_engine = ProofEngine::new(keystore, config.base_url.clone());
        let provider = InMemoryProvider::new();
        let status_engine = StatusListEngine::new(provider.clone(), config.base_url.clone());
        (
            VerificationPipeline::new(proof_engine.clone(), status_engine, provider),
            proof_engine,
            config,
        )
    }

    fn assertion() -> Assertion {
        Assertion {
            id: "https://issuer.example.org/v3/assertions/1".to_string(),
            type_: OneMany::Many(vec![
                "VerifiableCredential".to_string(),
                "OpenBadgeCredential".to_string(),
            ]),
            issuer: Kind::Object(Issuer {
                id: "https://issuer.example.org".to_string(),
                name: None,
            }),
            issued_on: Some(Utc::now()),
            recipient: Some(json!({"identity": "alice@example.org"})),
            ..Assertion::default()
        }
    }

    #[tokio::test]
    async fn revoked_flag_wins_over_everything() {
        let (pipeline, proof_engine, config) = pipeline().await;

        let mut signed = proof_engine
            .sign_assertion(&assertion(), DEFAULT_KEY_ID, ProofFormat::DataIntegrity)
            .await
            .unwrap();
        signed.revoked = Some(true);
        signed.revocation_reason = Some("issued in error".to_string());
        // expired as well: revocation is still reported first
        signed.expires = Some(Utc::now() - Duration::days(1));

        let status = pipeline.verify_assertion(&signed).await;
        assert!(!status.is_valid);
        assert!(status.is_revoked);
        assert_eq!(status.error_code, Some(VerifyErrorCode::AssertionRevoked));
        assert_eq!(status.details.as_deref(), Some("issued in error"));

        tokio::fs::remove_dir_all(&config.keys_dir).await.unwrap();
    }

    #[tokio::test]
    async fn expired_assertion_reported() {
        let (pipeline, proof_engine, config) = pipeline().await;

        let mut expired = assertion();
        expired.expires = Some(Utc::now() - Duration::hours(1));
        let signed = proof_engine
            .sign_assertion(&expired, DEFAULT_KEY_ID, ProofFormat::DataIntegrity)
            .await
            .unwrap();

        let status = pipeline.verify_assertion(&signed).await;
        assert!(!status.is_valid);
        assert!(status.is_expired);
        assert_eq!(status.error_code, Some(VerifyErrorCode::AssertionExpired));

        tokio::fs::remove_dir_all(&config.keys_dir).await.unwrap();
    }

    #[tokio::test]
    async fn valid_assertion_passes() {
        let (pipeline, proof_engine, config) = pipeline().await;

        let signed = proof_engine
            .sign_assertion(&assertion(), DEFAULT_KEY_ID, ProofFormat::DataIntegrity)
            .await
            .unwrap();
        let status = pipeline.verify_assertion(&signed).await;
        assert!(status.is_valid);
        assert!(status.has_valid_signature);
        assert_eq!(status.cryptosuite.as_deref(), Some("rsa-sha256"));

        tokio::fs::remove_dir_all(&config.keys_dir).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_assertion_id() {
        let (pipeline, _, config) = pipeline().await;

        let status = pipeline.verify_assertion_by_id("urn:uuid:nope").await;
        assert_eq!(status.error_code, Some(VerifyErrorCode::AssertionNotFound));

        tokio::fs::remove_dir_all(&config.keys_dir).await.unwrap();
    }
}

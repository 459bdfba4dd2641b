//! # Status List Credential handler
//!
//! `GET /v3/status-lists/:id` — serve a status list as a signed
//! `BitstringStatusListCredential`, with the cache metadata the routing
//! layer turns into `Cache-Control` and `ETag` headers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::endpoint::{Body, Error, Handler, Request, Result, Service};
use crate::keystore::DEFAULT_KEY_ID;
use crate::provider::Provider;
use crate::status::StatusListCredential;

/// Content type of the served credential.
pub const MEDIA_TYPE: &str = "application/vc+ld+json";

/// Default cache lifetime in milliseconds for a status list credential.
pub const DEFAULT_TTL: u64 = 300_000;

/// Request for one status list credential.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusListCredentialRequest {
    /// The list to serve.
    pub list_id: String,
}

/// A signed status list credential plus HTTP cache metadata.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusListCredentialResponse {
    /// The signed credential.
    pub credential: StatusListCredential,

    /// Strong validator over the encoded list.
    pub etag: String,

    /// `Cache-Control: max-age` seconds, from the list's ttl.
    pub max_age_secs: u64,
}

/// Serve a status list as a signed credential.
#[instrument(level = "debug", skip(service))]
async fn status_credential(
    request: StatusListCredentialRequest, service: &Service<impl Provider>,
) -> Result<StatusListCredentialResponse> {
    tracing::debug!("status_credential");

    let list = service.status_engine.get_status_list(&request.list_id).await?;

    let mut credential = StatusListCredential::new(&list, &service.config.base_url);
    let unsigned = serde_json::to_value(&credential)
        .map_err(|e| Error::ServerError(format!("issue serializing credential: {e}")))?;
    let proof = service
        .proof_engine
        .data_integrity_proof(&unsigned, DEFAULT_KEY_ID)
        .await
        .map_err(|e| Error::ServerError(format!("issue signing credential: {e}")))?;
    credential.proof = Some(proof);

    let digest = Sha256::digest(list.encoded_list.as_bytes());
    let etag = format!("\"{}\"", digest.iter().fold(String::new(), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    }));

    Ok(StatusListCredentialResponse {
        credential,
        etag,
        max_age_secs: list.ttl.unwrap_or(DEFAULT_TTL) / 1000,
    })
}

impl<P: Provider> Handler<P> for Request<StatusListCredentialRequest> {
    type Response = StatusListCredentialResponse;

    fn handle(self, service: &Service<P>) -> impl Future<Output = Result<Self::Response>> + Send {
        status_credential(self.body, service)
    }
}

impl Body for StatusListCredentialRequest {}

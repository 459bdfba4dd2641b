//! # Create Status List handler
//!
//! `POST /v3/status-lists` — create a status list for an issuer and
//! purpose.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::bitstring::StatusSize;
use crate::endpoint::{Body, Error, Handler, Request, Result, Service};
use crate::provider::Provider;
use crate::status::{StatusList, StatusPurpose};

/// Request to create a status list.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateListRequest {
    /// Owning issuer.
    pub issuer_id: String,

    /// Meaning of set cells.
    pub purpose: StatusPurpose,

    /// Cell width in bits; defaults to 1.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status_size: Option<u8>,

    /// Capacity; defaults to the privacy floor.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total_entries: Option<usize>,

    /// Cache lifetime hint in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ttl: Option<u64>,
}

/// Create a status list.
#[instrument(level = "debug", skip(service))]
async fn create_list(
    request: CreateListRequest, service: &Service<impl Provider>,
) -> Result<StatusList> {
    tracing::debug!("create_list");

    let status_size = match request.status_size {
        None => StatusSize::One,
        Some(bits) => StatusSize::try_from(bits)
            .map_err(|e| Error::InvalidRequest(e.to_string()))?,
    };

    let list = service
        .status_engine
        .create_status_list(
            &request.issuer_id,
            request.purpose,
            status_size,
            request.total_entries,
            request.ttl,
        )
        .await?;
    Ok(list)
}

impl<P: Provider> Handler<P> for Request<CreateListRequest> {
    type Response = StatusList;

    fn handle(self, service: &Service<P>) -> impl Future<Output = Result<Self::Response>> + Send {
        create_list(self.body, service)
    }

    fn validate(&self, _service: &Service<P>) -> impl Future<Output = Result<()>> + Send {
        async {
            if self.body.issuer_id.is_empty() {
                return Err(Error::InvalidRequest("no `issuerId` specified".to_string()));
            }
            Ok(())
        }
    }
}

impl Body for CreateListRequest {}

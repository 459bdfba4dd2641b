//! # Update Credential Status handler
//!
//! `POST /v3/credentials/:id/status` — change a credential's status on its
//! list.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::endpoint::{Body, Handler, Request, Result, Service};
use crate::provider::Provider;
use crate::status::engine::UpdateStatusRequest;

/// Acknowledgement of a status change.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCredentialStatusResponse {
    /// Always `true`; failures surface as handler errors.
    pub success: bool,

    /// The affected credential.
    pub credential_id: String,

    /// The status value now on the list.
    pub new_status: u8,

    /// Reason recorded with the change.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
}

/// Change a credential's status.
#[instrument(level = "debug", skip(service))]
async fn update_status(
    request: UpdateStatusRequest, service: &Service<impl Provider>,
) -> Result<UpdateCredentialStatusResponse> {
    tracing::debug!("update_status");

    let entry = service.status_engine.update_credential_status(&request).await?;

    Ok(UpdateCredentialStatusResponse {
        success: true,
        credential_id: entry.credential_id,
        new_status: entry.current_status,
        reason: entry.reason,
    })
}

impl<P: Provider> Handler<P> for Request<UpdateStatusRequest> {
    type Response = UpdateCredentialStatusResponse;

    fn handle(self, service: &Service<P>) -> impl Future<Output = Result<Self::Response>> + Send {
        update_status(self.body, service)
    }
}

impl Body for UpdateStatusRequest {}

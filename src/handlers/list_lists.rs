//! # List Status Lists handler
//!
//! `GET /v3/status-lists` — list status lists, filterable by issuer,
//! purpose and remaining capacity.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::endpoint::{Body, Handler, Request, Result, Service};
use crate::provider::{ListFilter, Provider};
use crate::status::{StatusList, StatusPurpose};

/// Query for status lists.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListListsRequest {
    /// Restrict to one issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_id: Option<String>,

    /// Restrict to one purpose.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<StatusPurpose>,

    /// Restrict by remaining capacity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_capacity: Option<bool>,
}

/// List status lists.
#[instrument(level = "debug", skip(service))]
async fn list_lists(
    request: ListListsRequest, service: &Service<impl Provider>,
) -> Result<Vec<StatusList>> {
    tracing::debug!("list_lists");

    let filter = ListFilter {
        issuer_id: request.issuer_id,
        purpose: request.purpose,
        has_capacity: request.has_capacity,
    };
    Ok(service.status_engine.list_status_lists(&filter).await?)
}

impl<P: Provider> Handler<P> for Request<ListListsRequest> {
    type Response = Vec<StatusList>;

    fn handle(self, service: &Service<P>) -> impl Future<Output = Result<Self::Response>> + Send {
        list_lists(self.body, service)
    }
}

impl Body for ListListsRequest {}

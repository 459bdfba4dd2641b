//! # Status List Stats handler
//!
//! `GET /v3/status-lists/:id/stats` — capacity and utilization of one
//! list.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::endpoint::{Body, Handler, Request, Result, Service};
use crate::provider::Provider;

/// Request for one list's stats.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusListStatsRequest {
    /// The list to report on.
    pub list_id: String,
}

/// Capacity report for a status list.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusListStats {
    /// Capacity in cells.
    pub total_entries: usize,

    /// Allocated cells.
    pub used_entries: usize,

    /// Unallocated cells.
    pub available_entries: usize,

    /// `used / total` as a percentage.
    pub utilization_percent: f64,
}

/// Report a status list's utilization.
#[instrument(level = "debug", skip(service))]
async fn list_stats(
    request: StatusListStatsRequest, service: &Service<impl Provider>,
) -> Result<StatusListStats> {
    tracing::debug!("list_stats");

    let list = service.status_engine.get_status_list(&request.list_id).await?;

    #[allow(clippy::cast_precision_loss)]
    let utilization_percent = (list.used_entries as f64 / list.total_entries as f64) * 100.0;

    Ok(StatusListStats {
        total_entries: list.total_entries,
        used_entries: list.used_entries,
        available_entries: list.available_entries(),
        utilization_percent,
    })
}

impl<P: Provider> Handler<P> for Request<StatusListStatsRequest> {
    type Response = StatusListStats;

    fn handle(self, service: &Service<P>) -> impl Future<Output = Result<Self::Response>> + Send {
        list_stats(self.body, service)
    }
}

impl Body for StatusListStatsRequest {}

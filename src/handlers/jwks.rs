//! # JWKS handler
//!
//! `GET /.well-known/jwks.json` — the issuer's active public keys as an
//! RFC 7517 key set.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::endpoint::{Body, Handler, Request, Result, Service};
use crate::keystore::JwkSet;
use crate::provider::Provider;

/// Request for the published key set.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct JwksRequest {}

/// Publish the active keys.
#[instrument(level = "debug", skip(service))]
async fn jwks(_request: JwksRequest, service: &Service<impl Provider>) -> Result<JwkSet> {
    tracing::debug!("jwks");
    Ok(service.keystore.jwk_set().await)
}

impl<P: Provider> Handler<P> for Request<JwksRequest> {
    type Response = JwkSet;

    fn handle(self, service: &Service<P>) -> impl Future<Output = Result<Self::Response>> + Send {
        jwks(self.body, service)
    }
}

impl Body for JwksRequest {}

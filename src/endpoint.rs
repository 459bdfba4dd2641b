//! # Endpoint
//!
//! `Service` wires the core's components together once at startup and is
//! passed to every handler; nothing is initialized on first use. Requests
//! are routed to the handler implementing [`Handler`] for their body type,
//! returning a reply the routing layer serializes.

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::config::Config;
use crate::credential::Assertion;
use crate::error::{BitstringError, KeyError, StatusError};
use crate::keystore::{DEFAULT_KEY_ID, KeyStore};
use crate::proof::{ProofEngine, ProofFormat};
use crate::provider::{AssertionStore, Provider};
use crate::status::{AssignStatusRequest, StatusListEngine, StatusPurpose};
use crate::verify::VerificationPipeline;

/// Handler result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The assembled core: key store, engines and configuration, constructed
/// once and shared.
#[derive(Clone, Debug)]
pub struct Service<P: Provider> {
    /// Initialized key store.
    pub keystore: Arc<KeyStore>,

    /// Proof generation and verification.
    pub proof_engine: ProofEngine,

    /// Status list allocation and mutation.
    pub status_engine: StatusListEngine<P>,

    /// End-to-end assertion verification.
    pub pipeline: VerificationPipeline<P>,

    /// Runtime settings.
    pub config: Config,

    /// The backing repositories.
    pub provider: P,
}

impl<P: Provider> Service<P> {
    /// Initialize the core: load (or create) the key material and wire the
    /// engines. Must complete before any signing or verification.
    ///
    /// # Errors
    ///
    /// Returns an error if the key store cannot be initialized.
    pub async fn new(config: Config, provider: P) -> anyhow::Result<Self> {
        let keystore = Arc::new(KeyStore::initialize(&config).await?);
        let proof_engine = ProofEngine::new(Arc::clone(&keystore), config.base_url.clone());
        let status_engine = StatusListEngine::new(provider.clone(), config.base_url.clone());
        let pipeline = VerificationPipeline::new(
            proof_engine.clone(),
            status_engine.clone(),
            provider.clone(),
        );

        Ok(Self {
            keystore,
            proof_engine,
            status_engine,
            pipeline,
            config,
            provider,
        })
    }

    /// Issue an assertion: bind it to a revocation status list slot, embed
    /// the status entry, sign, and persist.
    ///
    /// # Errors
    ///
    /// Returns an error if status assignment, signing or persistence fails.
    pub async fn issue_assertion(
        &self, draft: &Assertion, format: ProofFormat,
    ) -> anyhow::Result<Assertion> {
        let issuer_id = match &draft.issuer {
            crate::core::Kind::String(id) => id.clone(),
            crate::core::Kind::Object(issuer) => issuer.id.clone(),
        };

        let status = self
            .status_engine
            .assign_credential_status(&AssignStatusRequest {
                credential_id: draft.id.clone(),
                issuer_id,
                purpose: StatusPurpose::Revocation,
                ..AssignStatusRequest::default()
            })
            .await?;

        let mut draft = draft.clone();
        draft.credential_status = Some(status);
        let signed = self.proof_engine.sign_assertion(&draft, DEFAULT_KEY_ID, format).await?;

        self.provider.put_assertion(&signed).await?;
        Ok(signed)
    }
}

/// Errors returned by handlers, serialized as
/// `{"error": ..., "error_description": ...}` with a matching HTTP status.
#[derive(Error, Debug, Deserialize)]
pub enum Error {
    /// The request is malformed or fails validation.
    #[error(r#"{{"error": "invalid_request", "error_description": "{0}"}}"#)]
    InvalidRequest(String),

    /// The caller is not authenticated.
    #[error(r#"{{"error": "unauthorized", "error_description": "{0}"}}"#)]
    Unauthorized(String),

    /// The caller is authenticated but not permitted.
    #[error(r#"{{"error": "forbidden", "error_description": "{0}"}}"#)]
    Forbidden(String),

    /// The referenced resource does not exist.
    #[error(r#"{{"error": "not_found", "error_description": "{0}"}}"#)]
    NotFound(String),

    /// The request lost to a concurrent writer or violates uniqueness.
    #[error(r#"{{"error": "conflict", "error_description": "{0}"}}"#)]
    Conflict(String),

    /// An unexpected failure inside the core.
    #[error(r#"{{"error": "server_error", "error_description": "{0}"}}"#)]
    ServerError(String),
}

impl Error {
    /// The HTTP status this error maps to.
    #[must_use]
    pub const fn status_code(&self) -> http::StatusCode {
        match self {
            Self::InvalidRequest(_) => http::StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => http::StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => http::StatusCode::FORBIDDEN,
            Self::NotFound(_) => http::StatusCode::NOT_FOUND,
            Self::Conflict(_) => http::StatusCode::CONFLICT,
            Self::ServerError(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The error as a wire-format JSON value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.to_string()).unwrap_or_default()
    }
}

/// Error response wire format.
#[derive(Deserialize, Serialize)]
struct ErrorResponse {
    error: String,
    error_description: String,
}

impl Serialize for Error {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::Error as SerdeError;

        let Ok(error) = serde_json::from_str::<ErrorResponse>(&self.to_string()) else {
            return Err(SerdeError::custom("issue deserializing Err"));
        };
        error.serialize(serializer)
    }
}

impl From<StatusError> for Error {
    fn from(e: StatusError) -> Self {
        match e {
            StatusError::ListNotFound(_) | StatusError::EntryNotFound(_) => {
                Self::NotFound(e.to_string())
            }
            StatusError::UpdateConflict(_) | StatusError::ListFull(_) => {
                Self::Conflict(e.to_string())
            }
            StatusError::Bitstring(
                BitstringError::InvalidStatusSize(_)
                | BitstringError::TooFewEntries { .. }
                | BitstringError::ValueOutOfRange { .. }
                | BitstringError::IndexOutOfBounds { .. },
            ) => Self::InvalidRequest(e.to_string()),
            StatusError::Bitstring(_) | StatusError::Codec(_) | StatusError::Repository(_) => {
                Self::ServerError(e.to_string())
            }
        }
    }
}

impl From<KeyError> for Error {
    fn from(e: KeyError) -> Self {
        match e {
            KeyError::NotFound(_) => Self::NotFound(e.to_string()),
            KeyError::DefaultUndeletable => Self::Forbidden(e.to_string()),
            KeyError::InvalidKey(_) | KeyError::Io(_) => Self::ServerError(e.to_string()),
        }
    }
}

/// Handle an incoming request.
///
/// # Errors
///
/// Returns an [`Error`] when validation or the concrete handler fails;
/// the routing layer maps it to an HTTP response via
/// [`Error::status_code`].
pub async fn handle<P, B, U>(request: impl Into<Request<B>>, service: &Service<P>) -> Result<U>
where
    P: Provider,
    B: Body,
    Request<B>: Handler<P, Response = U>,
{
    let request: Request<B> = request.into();
    request.validate(service).await?;
    request.handle(service).await
}

/// A request to process.
#[derive(Clone, Debug)]
pub struct Request<B: Body> {
    /// The request body.
    pub body: B,
}

impl<B: Body> From<B> for Request<B> {
    fn from(body: B) -> Self {
        Self { body }
    }
}

/// Methods common to all requests: validation and routing to the concrete
/// handler.
pub trait Handler<P: Provider>: Clone + Debug + Send + Sync {
    /// The reply type specific to the implementing request.
    type Response;

    /// Routes the request to the concrete handler.
    fn handle(self, service: &Service<P>) -> impl Future<Output = Result<Self::Response>> + Send;

    /// Initial validation, common to all requests of this type.
    fn validate(&self, _service: &Service<P>) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}

pub(crate) use seal::Body;
pub(crate) mod seal {
    use std::fmt::Debug;

    /// The `Body` trait restricts the types able to be a request body. It
    /// is implemented by all `xxxRequest` types.
    pub trait Body: Clone + Debug + Send + Sync {}
}

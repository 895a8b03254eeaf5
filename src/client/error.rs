//! Error taxonomy for Marathon API calls
//!
//! Remote failures are turned into an [`ApiError`] whose [`ApiErrorKind`]
//! comes from the status code and whose message is assembled from the
//! structured detail fields Marathon puts in the body.

use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::cluster::ClusterError;
use crate::events::EventError;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the Marathon client
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid Marathon endpoint specified: {0}")]
    InvalidEndpoint(String),

    #[error("all the Marathon hosts are presently down")]
    MarathonDown,

    #[error("invalid response from Marathon: {0}")]
    InvalidResponse(String),

    #[error("the resource does not exist: {0}")]
    DoesNotExist(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("the operation has timed out")]
    Timeout,

    #[error("the operation was cancelled")]
    Cancelled,

    #[error(transparent)]
    Event(#[from] EventError),

    #[error("unable to get the ip address from the interface {interface}: {reason}")]
    InterfaceAddress { interface: String, reason: String },

    #[error("failed to bind the events listener on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to serialize request body: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<ClusterError> for Error {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::InvalidEndpoint(url) => Error::InvalidEndpoint(url),
            ClusterError::NoMembersAvailable => Error::MarathonDown,
        }
    }
}

impl Error {
    /// Map a non-2xx response into the error taxonomy
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        if status == StatusCode::NOT_FOUND {
            let message = serde_json::from_str::<MessageBody>(body)
                .map(|m| m.message)
                .unwrap_or_default();
            return Error::DoesNotExist(message);
        }

        match ApiError::from_response(status, body.as_bytes()) {
            Ok(api) => Error::Api(api),
            Err(e) => Error::InvalidResponse(format!(
                "HTTP {} with undecodable body: {}",
                status.as_u16(),
                e
            )),
        }
    }

    /// The API error kind, if this is a structured remote error
    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        match self {
            Error::Api(api) => Some(api.kind),
            _ => None,
        }
    }
}

/// Nature of a structured Marathon API error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// 400
    BadRequest,
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 409 on create: the id is already taken
    DuplicateId,
    /// 409 on update: the app is locked by running deployments
    AppLocked,
    /// 422
    InvalidEntity,
    /// 5xx
    Server,
    Unknown,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApiErrorKind::BadRequest => "bad-request",
            ApiErrorKind::Unauthorized => "unauthorized",
            ApiErrorKind::Forbidden => "forbidden",
            ApiErrorKind::NotFound => "not-found",
            ApiErrorKind::DuplicateId => "duplicate-id",
            ApiErrorKind::AppLocked => "app-locked",
            ApiErrorKind::InvalidEntity => "invalid-entity",
            ApiErrorKind::Server => "server-error",
            ApiErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A structured error reported by Marathon
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Marathon API error: {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build an error from a response status and body.
    ///
    /// Fails when the body of a recognised status cannot be decoded; any other
    /// status yields [`ApiErrorKind::Unknown`] and never fails.
    pub fn from_response(status: StatusCode, body: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        let code = status.as_u16();

        match code {
            400 => {
                let def: BadRequestBody = serde_json::from_slice(body)?;
                Ok(Self::new(ApiErrorKind::BadRequest, def.message()))
            }
            401 => simple(ApiErrorKind::Unauthorized, body),
            403 => simple(ApiErrorKind::Forbidden, body),
            404 => simple(ApiErrorKind::NotFound, body),
            409 => {
                let def: ConflictBody = serde_json::from_slice(body)?;
                Ok(Self::new(def.kind(), def.message()))
            }
            422 => {
                let def: UnprocessableEntityBody = serde_json::from_slice(body)?;
                Ok(Self::new(ApiErrorKind::InvalidEntity, def.message()))
            }
            c if c >= 500 => simple(ApiErrorKind::Server, body),
            _ => {
                let message = serde_json::from_slice::<MessageBody>(body)
                    .ok()
                    .map(|m| m.message)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "unknown error".to_string());
                Ok(Self::new(ApiErrorKind::Unknown, message))
            }
        }
    }
}

fn simple(kind: ApiErrorKind, body: &[u8]) -> std::result::Result<ApiError, serde_json::Error> {
    let def: MessageBody = serde_json::from_slice(body)?;
    Ok(ApiError::new(kind, def.message))
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct BadRequestBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<PathErrors>,
}

#[derive(Debug, Deserialize)]
struct PathErrors {
    #[serde(default)]
    path: String,
    #[serde(default)]
    errors: Vec<String>,
}

impl BadRequestBody {
    fn message(&self) -> String {
        let details: Vec<String> = self
            .details
            .iter()
            .map(|d| format!("path: '{}' errors: {}", d.path, d.errors.join(", ")))
            .collect();
        format!("{} ({})", self.message, details.join("; "))
    }
}

#[derive(Debug, Deserialize)]
struct ConflictBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    deployments: Vec<DeploymentRef>,
}

#[derive(Debug, Deserialize)]
struct DeploymentRef {
    id: String,
}

impl ConflictBody {
    // A 409 to a create carries no deployments, a 409 to an update lists the
    // deployments holding the lock.
    fn kind(&self) -> ApiErrorKind {
        if self.deployments.is_empty() {
            ApiErrorKind::DuplicateId
        } else {
            ApiErrorKind::AppLocked
        }
    }

    fn message(&self) -> String {
        if self.deployments.is_empty() {
            return self.message.clone();
        }
        let ids: Vec<&str> = self.deployments.iter().map(|d| d.id.as_str()).collect();
        format!("{} (locking deployment IDs: {})", self.message, ids.join(", "))
    }
}

#[derive(Debug, Deserialize)]
struct AttributeError {
    #[serde(default)]
    attribute: String,
    #[serde(default)]
    error: String,
}

#[derive(Debug, Deserialize)]
struct UnprocessableEntityBody {
    #[serde(default)]
    message: String,
    /// Marathon 0.15.0+
    #[serde(default)]
    details: Vec<AttributeError>,
    /// Marathon < 0.15.0
    #[serde(default)]
    errors: Vec<AttributeError>,
}

impl UnprocessableEntityBody {
    fn message(&self) -> String {
        let details: Vec<String> = self
            .details
            .iter()
            .chain(self.errors.iter())
            .map(|d| format!("attribute '{}': {}", d.attribute, d.error))
            .collect();
        format!("{} ({})", self.message, details.join("; "))
    }
}

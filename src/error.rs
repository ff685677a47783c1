use crate::{
    codec::{DecodeError, EncodeError},
    message::ValidationError,
    net::NetworkError,
    service::DefinitionError,
};
use thiserror::Error;

/// A business-level failure raised on purpose by a remote method.
///
/// Handlers return it through `anyhow`, e.g.
/// `Err(ApplicationError::named("quota exceeded", "QUOTA").into())`; the
/// message and name reach the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApplicationError {
    message: String,
    error_name: Option<String>,
}

impl ApplicationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_name: None,
        }
    }

    pub fn named(message: impl Into<String>, error_name: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_name: Some(error_name.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn error_name(&self) -> Option<&str> {
        self.error_name.as_deref()
    }
}

/// Everything a client-side call can fail with, one variant per error kind.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The server could not parse the request.
    #[error("request error: {0}")]
    Request(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("application error: {0}")]
    Application(#[from] ApplicationError),

    /// The method failed unexpectedly; details stay on the server.
    #[error("server error: {0}")]
    Server(String),

    /// The method returned something other than its declared response type.
    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("method {method} expects a {expected} request, got {actual}")]
    WrongRequestType {
        method: String,
        expected: String,
        actual: String,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(#[from] ValidationError),

    #[error("encoding request: {0}")]
    Encode(#[from] EncodeError),

    #[error("decoding response: {0}")]
    Decode(#[from] DecodeError),
}

/// Mistakes in how services and protocols are wired together.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("protocol name {0:?} is already in use")]
    DuplicateProtocol(String),

    #[error("content type {0:?} is already in use")]
    DuplicateContentType(String),

    #[error("invalid service path {0:?}")]
    InvalidPath(String),

    #[error("service path {0:?} is already mapped")]
    DuplicatePath(String),

    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

// Error types for the Restlight dispatch core

use crate::HttpStatus;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the core can produce.
///
/// Variants fall into three groups: configuration errors raised while routes are
/// deployed (these abort deployment), client errors raised while a request is
/// resolved (4xx), and server errors raised while invoking or serializing (5xx).
#[derive(Error, Debug)]
pub enum Error {
    // Deploy-time
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    // 4xx Client Errors
    #[error("Missing required {source_kind} '{name}'")]
    MissingRequiredValue {
        source_kind: &'static str,
        name: String,
    },

    #[error(
        "Ambiguous matrix variable '{name}': found in path segments {segments:?}, \
         specify the path variable to read it from"
    )]
    AmbiguousMatrixVariable { name: String, segments: Vec<String> },

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Unsupported Media Type: {0}")]
    UnsupportedMediaType(String),

    #[error("Not Acceptable: {0}")]
    NotAcceptable(String),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Any other status a handler wants to surface.
    #[error("{message}")]
    Status { status: u16, message: String },

    // 5xx Server Errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Async handler completed without a value for '{0}'")]
    NullAsyncResult(String),

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::MissingRequiredValue { .. }
            | Error::AmbiguousMatrixVariable { .. }
            | Error::BadRequest(_)
            | Error::Deserialization(_) => HttpStatus::BadRequest.code(),
            Error::UnsupportedMediaType(_) => HttpStatus::UnsupportedMediaType.code(),
            Error::NotAcceptable(_) => HttpStatus::NotAcceptable.code(),
            Error::RouteNotFound(_) => HttpStatus::NotFound.code(),
            Error::MethodNotAllowed(_) => HttpStatus::MethodNotAllowed.code(),
            Error::Status { status, .. } => *status,

            // Configuration errors only escape deployment, a request never sees them
            // unless a handler misbehaves, so they are treated as server faults.
            _ => HttpStatus::InternalServerError.code(),
        }
    }

    /// Get the HttpStatus enum for this error
    pub fn http_status(&self) -> HttpStatus {
        HttpStatus::from_code(self.status_code()).unwrap_or(HttpStatus::InternalServerError)
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status_code())
    }

    /// Check if this error was raised while deploying a route
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}
